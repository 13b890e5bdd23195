/// Marked as done - Chrome extension that remembers which pages you have read
/// Built with Rust + WASM + Yew

pub mod bridge;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod indexer;
pub mod migrate;
pub mod normalize;
pub mod page_data;
pub mod protocol;
pub mod settings;
pub mod storage;
pub mod surface;
pub mod ui;

#[cfg(test)]
mod testing;

use crate::bridge::{to_js, ChromeHost, ChromeStorage, RuntimeTransport, WasmSpawner};
use crate::clock::SystemClock;
use crate::coordinator::{Coordinator, CoordinatorContext, LoadPhase};
use crate::page_data::TabInfo;
use crate::settings::Settings;
use crate::storage::PageStore;
use crate::surface::LinkOverlay;
use js_sys::Promise;
use log::info;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    // max level is narrowed once the settings are loaded
    wasm_logger::init(wasm_logger::Config::new(log::Level::Trace));
    log::set_max_level(log::LevelFilter::Info);
}

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{}", error))
}

fn parse_tab(tab: JsValue) -> Result<TabInfo, JsValue> {
    serde_wasm_bindgen::from_value(tab).map_err(|e| JsValue::from_str(&format!("Failed to parse tab: {:?}", e)))
}

/// Coordinator handle for the background service worker
#[wasm_bindgen]
pub struct BackgroundWorker {
    coordinator: Rc<Coordinator>,
}

#[wasm_bindgen]
impl BackgroundWorker {
    #[wasm_bindgen(constructor)]
    pub fn new() -> BackgroundWorker {
        let clock = Rc::new(SystemClock);
        let store = Rc::new(PageStore::new(Rc::new(ChromeStorage), clock));
        let coordinator = Coordinator::new(CoordinatorContext {
            store,
            host: Rc::new(ChromeHost),
            spawner: Rc::new(WasmSpawner),
            settings: Settings::default(),
        });
        BackgroundWorker {
            coordinator: Rc::new(coordinator),
        }
    }

    pub fn init(&self) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            coordinator.init().await.map_err(js_error)?;
            log::set_max_level(coordinator.settings().log_level().to_level_filter());
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }

    #[wasm_bindgen(js_name = onInstalled)]
    pub fn on_installed(&self) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let report = coordinator.on_installed().await.map_err(js_error)?;
            info!("upgraded {} of {} stored pages", report.upgraded, report.scanned);
            Ok(JsValue::from(report.upgraded as u32))
        })
    }

    /// `complete` is false while the tab is still loading.
    #[wasm_bindgen(js_name = onTabUpdated)]
    pub fn on_tab_updated(&self, tab: JsValue, complete: bool) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let tab = parse_tab(tab)?;
            let phase = if complete { LoadPhase::Complete } else { LoadPhase::Loading };
            coordinator.on_tab_updated(&tab, phase).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabActivated)]
    pub fn on_tab_activated(&self, tab: JsValue) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let tab = parse_tab(tab)?;
            coordinator.on_tab_activated(&tab).await.map_err(js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = onTabRemoved)]
    pub fn on_tab_removed(&self, tab_id: i32) {
        self.coordinator.on_tab_removed(tab_id);
    }

    /// Resolves with the response, or `undefined` for messages that are not ours.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue, sender_tab: Option<i32>) -> Promise {
        let coordinator = self.coordinator.clone();
        future_to_promise(async move {
            let message: serde_json::Value = serde_wasm_bindgen::from_value(message)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse message: {:?}", e)))?;
            match coordinator.handle_message(message, sender_tab).await {
                Some(response) => to_js(&response).map_err(|e| JsValue::from_str(&e)),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }
}

impl Default for BackgroundWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// Link marking for the content script of one page
#[wasm_bindgen]
pub struct ContentOverlay {
    overlay: Rc<LinkOverlay>,
}

#[wasm_bindgen]
impl ContentOverlay {
    #[wasm_bindgen(constructor)]
    pub fn new(page_url: &str) -> ContentOverlay {
        ContentOverlay {
            overlay: Rc::new(LinkOverlay::new(page_url)),
        }
    }

    /// Resolves with one class name (or `null`) per href, in order.
    #[wasm_bindgen(js_name = linkClasses)]
    pub fn link_classes(&self, hrefs: Vec<String>) -> Promise {
        let overlay = self.overlay.clone();
        future_to_promise(async move {
            let statuses = overlay
                .fetch_statuses(&RuntimeTransport, hrefs.iter().map(String::as_str))
                .await
                .map_err(js_error)?;
            let classes: Vec<Option<String>> = hrefs
                .iter()
                .map(|href| overlay.class_for(href, &statuses))
                .collect();
            to_js(&classes).map_err(|e| JsValue::from_str(&e))
        })
    }
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

// Start the Yew app for the marked pages list
#[wasm_bindgen]
pub fn start_list_viewer() {
    yew::Renderer::<ui::list::ListViewer>::new().render();
}
