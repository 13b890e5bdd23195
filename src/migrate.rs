//! Schema migration for stored page values.
//!
//! Stored values went through four shapes:
//!   - v1: `true` (done)
//!   - v2: a bare status string
//!   - v3: `{status, title?, ...}`, possibly with the retired `started` status
//!   - v4: `{status, title?, created?, modified?}` with `status` never `started`
//!
//! [`classify`] maps a raw value onto exactly one of these shapes (or an
//! anomaly); [`upgrade_all`] rewrites everything older than v4 through the
//! store's merge path so timestamps are backfilled.

use crate::error::Result;
use crate::page_data::{PageProperties, PropertiesPatch, Status};
use crate::storage::{PageStore, SETTINGS_KEY};
use log::{info, warn};
use serde_json::Value;

/// Recognized shape of a stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredShape {
    /// v4, written by this crate
    Current(PageProperties),
    /// v1: `true`
    LegacyBoolean,
    /// v2: `"todo"`, `"started"` or `"done"`
    LegacyString(Status),
    /// v3: object carrying the retired `started` status, or fields in a form
    /// the current shape cannot hold (date strings, a non-string title)
    LegacyObject(PageProperties),
    /// Anything else. Left untouched.
    Anomaly(String),
}

impl StoredShape {
    pub fn version(&self) -> Option<u8> {
        match self {
            StoredShape::LegacyBoolean => Some(1),
            StoredShape::LegacyString(_) => Some(2),
            StoredShape::LegacyObject(_) => Some(3),
            StoredShape::Current(_) => Some(4),
            StoredShape::Anomaly(_) => None,
        }
    }

    /// How the value reads today, without rewriting it.
    pub fn current_view(self) -> Option<PageProperties> {
        match self {
            StoredShape::Current(properties) => Some(properties),
            StoredShape::LegacyBoolean => Some(PageProperties::with_status(Status::Done)),
            StoredShape::LegacyString(status) => Some(PageProperties::with_status(status.retire())),
            StoredShape::LegacyObject(mut properties) => {
                properties.status = properties.status.retire();
                Some(properties)
            }
            StoredShape::Anomaly(_) => None,
        }
    }
}

/// Classify a raw stored value. Pure.
pub fn classify(value: &Value) -> StoredShape {
    match value {
        Value::Bool(true) => StoredShape::LegacyBoolean,
        Value::String(s) => match Status::parse(s) {
            Some(status) if status.is_persistable() => StoredShape::LegacyString(status),
            _ => StoredShape::Anomaly(format!("unknown status string {:?}", s)),
        },
        Value::Object(map) => {
            let status = map.get("status").and_then(Value::as_str).and_then(Status::parse);
            if !status.is_some_and(|status| status.is_persistable()) {
                return StoredShape::Anomaly("object without a storable status".to_string());
            }

            // Older records carry date strings where numbers belong; those fields are
            // dropped so the rewrite backfills them.
            let mut fields = map.clone();
            let mut repaired = false;
            for field in ["created", "modified"] {
                if fields.get(field).is_some_and(|v| !v.is_number()) {
                    fields.remove(field);
                    repaired = true;
                }
            }
            if fields.get("title").is_some_and(|v| !v.is_string()) {
                fields.remove("title");
                repaired = true;
            }

            match serde_json::from_value::<PageProperties>(Value::Object(fields)) {
                Ok(properties) if repaired || properties.status == Status::Started => {
                    StoredShape::LegacyObject(properties)
                }
                Ok(properties) => StoredShape::Current(properties),
                Err(e) => StoredShape::Anomaly(e.to_string()),
            }
        }
        other => StoredShape::Anomaly(format!("unexpected value {}", other)),
    }
}

/// Outcome of one [`upgrade_all`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub scanned: usize,
    pub upgraded: usize,
    pub anomalies: Vec<String>,
}

/// Rewrite every pre-v4 entry into v4. Idempotent: a second pass writes nothing.
///
/// The only status change is `started → todo`. Current entries and
/// anomalies are never written.
pub async fn upgrade_all(store: &PageStore) -> Result<MigrationReport> {
    let entries = store.backend().get_all().await?;
    let mut report = MigrationReport::default();

    for (key, value) in entries {
        if key == SETTINGS_KEY {
            continue;
        }
        report.scanned += 1;

        let (base, status) = match classify(&value) {
            StoredShape::Current(_) => continue,
            StoredShape::Anomaly(reason) => {
                warn!("leaving unrecognized entry {} untouched: {}", key, reason);
                report.anomalies.push(key);
                continue;
            }
            StoredShape::LegacyBoolean => (None, Status::Done),
            StoredShape::LegacyString(status) => (None, status.retire()),
            StoredShape::LegacyObject(properties) => {
                let status = properties.status.retire();
                (Some(properties), status)
            }
        };

        store
            .write_merged(&key, base, &PropertiesPatch::status(status))
            .await?;
        report.upgraded += 1;
    }

    info!(
        "migration scanned {} entries, upgraded {}, {} anomalies",
        report.scanned,
        report.upgraded,
        report.anomalies.len()
    );
    Ok(report)
}
