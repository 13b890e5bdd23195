/// Messages exchanged between surfaces (popup, content overlay, options) and the coordinator
use crate::page_data::{PropertiesPatch, Status};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const KNOWN_TYPES: [&str; 5] = [
    "change-page-status",
    "remove-page",
    "get-status",
    "batch-get-status",
    "import-data",
];

/// Requests a surface can send to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    /// `none` removes the record, anything else is merged in.
    ChangePageStatus {
        url: String,
        properties: PropertiesPatch,
        /// Tab the change was made for, when the sender is not that tab (popup)
        #[serde(default, rename = "tabId", skip_serializing_if = "Option::is_none")]
        tab_id: Option<i32>,
    },
    RemovePage {
        url: String,
    },
    GetStatus {
        url: String,
    },
    BatchGetStatus {
        urls: Vec<String>,
    },
    ImportData {
        data: Vec<ImportEntry>,
    },
}

impl Request {
    /// Decode a raw message. Unknown message types are ignored (`None`); a known
    /// type with a body that does not decode is an error.
    pub fn from_value(value: Value) -> Option<Result<Request, serde_json::Error>> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            debug!("ignoring message of unknown type {:?}", kind);
            return None;
        }
        let decoded = serde_json::from_value(value);
        if let Err(e) = &decoded {
            warn!("malformed {} message: {}", kind, e);
        }
        Some(decoded)
    }

    pub fn change_status(url: impl Into<String>, status: Status) -> Request {
        Request::ChangePageStatus {
            url: url.into(),
            properties: PropertiesPatch::status(status),
            tab_id: None,
        }
    }
}

/// One entry of an import file: `{url, status, title?, ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub url: String,
    #[serde(flatten)]
    pub properties: PropertiesPatch,
}

/// Coordinator answers. Serialized untagged, the way surfaces expect them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ack(String),
    Failed(String),
    Status(Status),
    Statuses(BTreeMap<String, Status>),
}

impl Response {
    pub fn failed(error: impl std::fmt::Display) -> Response {
        Response::Failed(format!("error: {}", error))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failed(_))
    }
}

/// Pushed from the coordinator into page surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    /// Stored state changed; re-query
    UpdateContent,
}
