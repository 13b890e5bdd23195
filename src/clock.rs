/// Time source for record timestamps (epoch milliseconds)
use std::cell::Cell;

pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock: `Date.now()` in the browser, `SystemTime` elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now(&self) -> f64 {
        js_sys::Date::now()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now(&self) -> f64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> ManualClock {
        ManualClock { now: Cell::new(start) }
    }

    pub fn advance(&self, millis: f64) {
        self.now.set(self.now.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1000.0);
        clock.advance(5.0);
        assert_eq!(clock.now(), 1005.0);
    }

    #[test]
    fn test_system_clock_is_past_2020() {
        assert!(SystemClock.now() > 1_577_836_800_000.0);
    }
}
