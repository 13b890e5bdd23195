/// Data structures for page reading status
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reading status of a page.
///
/// `None` and `Disabled` are never persisted: `None` means "no record" and
/// `Disabled` classifies urls outside http(s). `Started` is a retired state
/// that may still appear in legacy data and is stored as `Todo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    None,
    Todo,
    Started,
    Done,
    Disabled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::None => "none",
            Status::Todo => "todo",
            Status::Started => "started",
            Status::Done => "done",
            Status::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "none" => Some(Status::None),
            "todo" => Some(Status::Todo),
            "started" => Some(Status::Started),
            "done" => Some(Status::Done),
            "disabled" => Some(Status::Disabled),
            _ => None,
        }
    }

    /// Whether a record may be stored with this status.
    pub fn is_persistable(&self) -> bool {
        matches!(self, Status::Todo | Status::Started | Status::Done)
    }

    /// Maps the retired `started` state onto `todo`.
    pub fn retire(self) -> Status {
        match self {
            Status::Started => Status::Todo,
            other => other,
        }
    }

    /// Toolbar indicator asset for this status
    pub fn icon_path(&self) -> String {
        format!("/images/icon-{}.png", self.as_str())
    }

    /// Class the content overlay puts on links with this status
    pub fn link_class(&self) -> Option<String> {
        match self {
            Status::None | Status::Disabled => None,
            status => Some(format!("marked-as-{}", status.retire().as_str())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted properties of a page (current record shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageProperties {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,
    /// Properties this crate does not interpret, kept through merges.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageProperties {
    pub fn with_status(status: Status) -> PageProperties {
        PageProperties {
            status,
            title: None,
            created: None,
            modified: None,
            extra: Map::new(),
        }
    }
}

/// A partial update of `PageProperties`. Present fields overwrite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertiesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Creation time carried by imported entries; only used when the record has none.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Older export files hold date strings here; anything but a number reads as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

/// Keys owned by `PageProperties` itself; never copied into `extra`.
const RESERVED_KEYS: [&str; 4] = ["status", "title", "created", "modified"];

impl PropertiesPatch {
    pub fn status(status: Status) -> PropertiesPatch {
        PropertiesPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> PropertiesPatch {
        PropertiesPatch {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Shallow merge over `base`. Timestamps are left to the caller.
    pub fn apply_to(&self, base: &mut PageProperties) {
        if let Some(status) = self.status {
            base.status = status.retire();
        }
        if let Some(title) = &self.title {
            base.title = Some(title.clone());
        }
        for (key, value) in &self.extra {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                base.extra.insert(key.clone(), value.clone());
            }
        }
    }
}

/// One stored page: normalized url key plus its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub key: String,
    pub properties: PageProperties,
}

impl PageRecord {
    pub fn new(key: String, properties: PageProperties) -> PageRecord {
        PageRecord { key, properties }
    }

    pub fn status(&self) -> Status {
        self.properties.status
    }
}

/// Information about a browser tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i32,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl TabInfo {
    pub fn new(id: i32, url: String, title: String) -> TabInfo {
        TabInfo { id, url, title }
    }
}
