/// User settings, persisted next to the page records under `userSettings`
use crate::error::Result;
use crate::page_data::Status;
use crate::storage::{StorageBackend, SETTINGS_KEY};
use log::{warn, Level};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Status applied when the popup opens on an unmarked page
    pub initial_status: Status,
    pub mark_on_popup_open: bool,
    /// Statuses offered as buttons in the popup
    pub enabled_states: Vec<Status>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            initial_status: Status::Todo,
            mark_on_popup_open: true,
            enabled_states: vec![Status::Todo, Status::Done],
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load from storage. Missing or unreadable settings fall back to defaults.
    pub async fn load(backend: &dyn StorageBackend) -> Result<Settings> {
        let Some(value) = backend.get(SETTINGS_KEY).await? else {
            return Ok(Settings::default());
        };
        match serde_json::from_value::<Settings>(value) {
            Ok(settings) => Ok(settings.sanitized()),
            Err(e) => {
                warn!("ignoring unreadable settings: {}", e);
                Ok(Settings::default())
            }
        }
    }

    pub async fn save(&self, backend: &dyn StorageBackend) -> Result<()> {
        backend.set(SETTINGS_KEY, serde_json::to_value(self)?).await
    }

    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::Info)
    }

    /// Statuses that cannot be stored make no sense here.
    fn sanitized(mut self) -> Settings {
        if !self.initial_status.is_persistable() {
            self.initial_status = Status::Todo;
        }
        self.initial_status = self.initial_status.retire();
        self.enabled_states.retain(|status| status.is_persistable());
        for status in self.enabled_states.iter_mut() {
            *status = status.retire();
        }
        let mut seen = BTreeSet::new();
        self.enabled_states.retain(|status| seen.insert(*status));
        self
    }
}
