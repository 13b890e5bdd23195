/// Page state storage on top of an async key-value backend (chrome.storage.local)

use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::indexer;
use crate::migrate::classify;
use crate::normalize::{inspect_url, is_origin, UrlKind};
use crate::page_data::{PageProperties, PageRecord, PropertiesPatch, Status};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Storage key holding the user settings. Never a page.
pub const SETTINGS_KEY: &str = "userSettings";

/// Asynchronous key-value primitive the page store is built on.
///
/// Mirrors `chrome.storage.local`: a flat mapping from string keys to JSON values.
#[async_trait(?Send)]
pub trait StorageBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn get_many(&self, keys: &[String]) -> Result<Map<String, Value>>;

    async fn get_all(&self) -> Result<Map<String, Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// In-memory backend with write counting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<Map<String, Value>>,
    writes: Cell<usize>,
    failing: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Map<String, Value>) -> Self {
        MemoryStorage {
            entries: RefCell::new(entries),
            ..Self::default()
        }
    }

    /// Number of `set`/`remove`/`clear` calls that reached the map
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Make every following call fail with `StoreError::Io`
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries.borrow().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.get() {
            Err(StoreError::Io("storage unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn count_write(&self) {
        self.writes.set(self.writes.get() + 1);
    }
}

#[async_trait(?Send)]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Map<String, Value>> {
        self.check()?;
        let entries = self.entries.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        self.check()?;
        Ok(self.entries.borrow().clone())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check()?;
        self.count_write();
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.count_write();
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.count_write();
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// One flat entry of the import/export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub url: String,
    #[serde(flatten)]
    pub properties: PageProperties,
}

/// CRUD over page records keyed by normalized url.
///
/// Every operation suspends on the backend. There is no transactional
/// isolation: two overlapping `upsert`s of the same key can lose one update
/// (the last write to complete wins).
pub struct PageStore {
    backend: Rc<dyn StorageBackend>,
    clock: Rc<dyn Clock>,
}

impl PageStore {
    pub fn new(backend: Rc<dyn StorageBackend>, clock: Rc<dyn Clock>) -> Self {
        PageStore { backend, clock }
    }

    pub fn backend(&self) -> &Rc<dyn StorageBackend> {
        &self.backend
    }

    /// Record for `url`, or `None` for non-http(s), malformed or unknown urls.
    pub async fn get(&self, url: &str) -> Result<Option<PageRecord>> {
        let Some(key) = page_key(url) else {
            return Ok(None);
        };
        let properties = self.read_properties(&key).await?;
        Ok(properties.map(|properties| PageRecord::new(key, properties)))
    }

    /// Status of `url` as seen by a surface: `disabled` outside http(s), `none` when absent.
    pub async fn status_of(&self, url: &str) -> Result<Status> {
        match inspect_url(url) {
            UrlKind::Unsupported => Ok(Status::Disabled),
            UrlKind::Malformed => Ok(Status::None),
            UrlKind::Page { key, .. } => Ok(self
                .read_properties(&key)
                .await?
                .map(|properties| properties.status)
                .unwrap_or(Status::None)),
        }
    }

    /// Merge `patch` over the stored properties of `url` and persist.
    ///
    /// `created` is set once, `modified` on every call. A `none` status is
    /// rejected: deletion goes through [`PageStore::remove`]. Returns
    /// `Ok(None)` when `url` is not a trackable page.
    pub async fn upsert(&self, url: &str, patch: &PropertiesPatch) -> Result<Option<PageRecord>> {
        let Some(key) = page_key(url) else {
            return Ok(None);
        };
        let existing = self.read_properties(&key).await?;
        self.write_merged(&key, existing, patch).await.map(Some)
    }

    /// Delete the record for `url`. Absent records are not an error.
    pub async fn remove(&self, url: &str) -> Result<()> {
        match page_key(url) {
            Some(key) => self.backend.remove(&key).await,
            None => Ok(()),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<PageRecord>> {
        let entries = self.backend.get_all().await?;
        Ok(entries
            .into_iter()
            .filter(|(key, _)| key != SETTINGS_KEY)
            .filter_map(|(key, value)| {
                classify(&value)
                    .current_view()
                    .map(|properties| PageRecord::new(key, properties))
            })
            .collect())
    }

    /// Records whose key belongs to `origin` (`scheme://host[:port]`).
    pub async fn list_for_origin(&self, origin: &str) -> Result<Vec<PageRecord>> {
        if !is_origin(origin) {
            warn!("not a normalized origin: {}", origin);
            return Ok(Vec::new());
        }
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|record| key_in_origin(&record.key, origin))
            .collect())
    }

    pub async fn has_records_for_origin(&self, origin: &str) -> Result<bool> {
        if !is_origin(origin) {
            return Ok(false);
        }
        let entries = self.backend.get_all().await?;
        Ok(entries.iter().any(|(key, value)| {
            key_in_origin(key, origin) && classify(value).current_view().is_some()
        }))
    }

    /// Statuses for a batch of urls, keyed by normalized url. Unknown urls are absent.
    pub async fn statuses_for(&self, urls: &[String]) -> Result<BTreeMap<String, Status>> {
        let mut keys: Vec<String> = urls.iter().filter_map(|url| page_key(url)).collect();
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }

        let found = self.backend.get_many(&keys).await?;
        Ok(found
            .into_iter()
            .filter_map(|(key, value)| {
                classify(&value)
                    .current_view()
                    .map(|properties| (key, properties.status))
            })
            .collect())
    }

    pub async fn group_by_origin(&self) -> Result<BTreeMap<String, Vec<PageRecord>>> {
        Ok(indexer::group_by_origin(self.list_all().await?))
    }

    pub async fn group_by_status(&self) -> Result<BTreeMap<Status, Vec<PageRecord>>> {
        Ok(indexer::group_by_status(self.list_all().await?))
    }

    /// Flat export entries, sorted by url
    pub async fn export(&self) -> Result<Vec<ExportEntry>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(|record| ExportEntry {
                url: record.key,
                properties: record.properties,
            })
            .collect())
    }

    /// Delete every record, keeping the user settings.
    pub async fn clear(&self) -> Result<()> {
        let settings = self.backend.get(SETTINGS_KEY).await?;
        self.backend.clear().await?;
        if let Some(settings) = settings {
            self.backend.set(SETTINGS_KEY, settings).await?;
        }
        Ok(())
    }

    /// Current-shape view of a stored value; legacy shapes are read, not rewritten.
    pub(crate) async fn read_properties(&self, key: &str) -> Result<Option<PageProperties>> {
        Ok(self
            .backend
            .get(key)
            .await?
            .and_then(|value| classify(&value).current_view()))
    }

    /// The single write path shared by `upsert` and the migrator.
    pub(crate) async fn write_merged(
        &self,
        key: &str,
        base: Option<PageProperties>,
        patch: &PropertiesPatch,
    ) -> Result<PageRecord> {
        if let Some(status) = patch.status {
            if !status.is_persistable() {
                return Err(StoreError::UnpersistableStatus(status));
            }
        }

        let mut properties = match (base, patch.status) {
            (Some(base), _) => base,
            (None, Some(status)) => PageProperties::with_status(status),
            (None, None) => return Err(StoreError::MissingStatus(key.to_string())),
        };
        patch.apply_to(&mut properties);

        let now = self.clock.now();
        properties.created = properties.created.or(patch.created).or(Some(now));
        properties.modified = Some(now);

        let value = serde_json::to_value(&properties)?;
        self.backend.set(key, value).await?;
        debug!("stored {} as {}", key, properties.status);

        Ok(PageRecord::new(key.to_string(), properties))
    }
}

fn page_key(url: &str) -> Option<String> {
    match inspect_url(url) {
        UrlKind::Page { key, .. } => Some(key),
        UrlKind::Unsupported => {
            debug!("not storing unsupported url {}", url);
            None
        }
        UrlKind::Malformed => None,
    }
}

/// Prefix match that stops at the origin boundary (`https://a.com` never matches `https://a.com.evil`).
fn key_in_origin(key: &str, origin: &str) -> bool {
    key.strip_prefix(origin)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn create_test_store(entries: Value) -> (PageStore, Rc<MemoryStorage>, Rc<ManualClock>) {
        let map = entries.as_object().cloned().unwrap_or_default();
        let backend = Rc::new(MemoryStorage::with_entries(map));
        let clock = Rc::new(ManualClock::new(1_000.0));
        let store = PageStore::new(backend.clone(), clock.clone());
        (store, backend, clock)
    }

    #[tokio::test]
    async fn test_upsert_then_get_round_trip() {
        let (store, _, _) = create_test_store(json!({}));

        for status in [Status::Todo, Status::Done] {
            store
                .upsert("https://a.com/p", &PropertiesPatch::status(status))
                .await
                .unwrap();
            let record = store.get("https://a.com/p").await.unwrap().unwrap();
            assert_eq!(record.status(), status);
        }
    }

    #[tokio::test]
    async fn test_get_uses_normalized_key() {
        let (store, backend, _) = create_test_store(json!({}));

        store
            .upsert("https://a.com/p?lang=en#intro", &PropertiesPatch::status(Status::Done))
            .await
            .unwrap();

        assert!(backend.snapshot().contains_key("https://a.com/p"));
        let record = store.get("https://a.com/p#other").await.unwrap().unwrap();
        assert_eq!(record.key, "https://a.com/p");
    }

    #[tokio::test]
    async fn test_get_returns_none_for_unsupported_and_malformed() {
        let (store, _, _) = create_test_store(json!({ "chrome://settings/": { "status": "done" } }));

        assert!(store.get("chrome://settings/").await.unwrap().is_none());
        assert!(store.get("not a url").await.unwrap().is_none());
        assert!(store.get("https://a.com/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_of() {
        let (store, _, _) = create_test_store(json!({ "https://a.com/p": { "status": "todo" } }));

        assert_eq!(store.status_of("https://a.com/p").await.unwrap(), Status::Todo);
        assert_eq!(store.status_of("https://a.com/q").await.unwrap(), Status::None);
        assert_eq!(store.status_of("about:blank").await.unwrap(), Status::Disabled);
        assert_eq!(store.status_of("").await.unwrap(), Status::None);
    }

    #[tokio::test]
    async fn test_merge_semantics_and_timestamps() {
        let (store, _, clock) = create_test_store(json!({}));

        let first = store
            .upsert("https://a.com/p", &PropertiesPatch::status(Status::Todo))
            .await
            .unwrap()
            .unwrap();
        clock.advance(500.0);
        let second = store
            .upsert("https://a.com/p", &PropertiesPatch::title("T"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.properties.status, Status::Todo);
        assert_eq!(second.properties.title.as_deref(), Some("T"));
        assert_eq!(second.properties.created, first.properties.created);
        assert!(second.properties.modified > first.properties.modified);

        let stored = store.get("https://a.com/p").await.unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_upsert_rejects_none_and_missing_status() {
        let (store, backend, _) = create_test_store(json!({}));

        let err = store
            .upsert("https://a.com/p", &PropertiesPatch::status(Status::None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnpersistableStatus(Status::None)));

        let err = store
            .upsert("https://a.com/p", &PropertiesPatch::title("only a title"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingStatus(_)));
        assert_eq!(backend.writes(), 0);
    }

    #[tokio::test]
    async fn test_upsert_stores_started_as_todo() {
        let (store, _, _) = create_test_store(json!({}));

        let record = store
            .upsert("https://a.com/p", &PropertiesPatch::status(Status::Started))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.status(), Status::Todo);
    }

    #[tokio::test]
    async fn test_upsert_ignores_untrackable_urls() {
        let (store, backend, _) = create_test_store(json!({}));

        let result = store
            .upsert("file:///etc/hosts", &PropertiesPatch::status(Status::Done))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(backend.writes(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _, _) = create_test_store(json!({ "https://a.com/p": { "status": "done" } }));

        store.remove("https://a.com/p#frag").await.unwrap();
        assert!(store.get("https://a.com/p").await.unwrap().is_none());

        // absent is fine
        store.remove("https://a.com/p").await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let (store, backend, _) = create_test_store(json!({}));
        backend.set_failing(true);

        let err = store
            .upsert("https://a.com/p", &PropertiesPatch::status(Status::Done))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.list_all().await.is_err());
    }

    #[tokio::test]
    async fn test_legacy_values_are_readable() {
        let (store, backend, _) = create_test_store(json!({
            "https://a.com/1": true,
            "https://a.com/2": "todo",
            "https://a.com/3": { "status": "started", "title": "Three" },
        }));

        assert_eq!(store.status_of("https://a.com/1").await.unwrap(), Status::Done);
        assert_eq!(store.status_of("https://a.com/2").await.unwrap(), Status::Todo);
        assert_eq!(store.status_of("https://a.com/3").await.unwrap(), Status::Todo);
        // reading never rewrites
        assert_eq!(backend.writes(), 0);
    }

    #[tokio::test]
    async fn test_list_for_origin_respects_boundary() {
        let (store, _, _) = create_test_store(json!({
            "https://www.google.com/": { "status": "todo", "title": "Google" },
            "https://www.google.com/search": { "status": "done", "title": "Google Search" },
            "https://www.google.com.evil.org/": { "status": "done" },
            "https://www.facebook.com/maps": { "status": "todo", "title": "Facebook Maps" },
        }));

        let entries = store.list_for_origin("https://www.google.com").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "https://www.google.com/");
        assert_eq!(entries[0].status(), Status::Todo);
        assert_eq!(entries[1].key, "https://www.google.com/search");
        assert_eq!(entries[1].status(), Status::Done);

        // a full url is not an origin
        assert!(store.list_for_origin("https://www.google.com/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_has_records_for_origin() {
        let (store, _, _) = create_test_store(json!({ "https://a.com/p": { "status": "done" } }));

        assert!(store.has_records_for_origin("https://a.com").await.unwrap());
        assert!(!store.has_records_for_origin("https://b.com").await.unwrap());
        assert!(!store.has_records_for_origin("https://a.co").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_entries_do_not_activate_an_origin() {
        let (store, _, _) = create_test_store(json!({
            "https://odd.com/p": { "whatever": true },
            "https://odd.com/q": 42,
        }));

        assert!(!store.has_records_for_origin("https://odd.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_statuses_for_only_returns_known_keys() {
        let (store, _, _) = create_test_store(json!({ "https://a.com/x": { "status": "done" } }));

        let statuses = store
            .statuses_for(&[
                "https://a.com/x#top".to_string(),
                "https://a.com/y".to_string(),
                "javascript:void(0)".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses.get("https://a.com/x"), Some(&Status::Done));
    }

    #[tokio::test]
    async fn test_list_all_skips_settings_and_anomalies() {
        let (store, _, _) = create_test_store(json!({
            "userSettings": { "enabledStates": ["todo", "done"] },
            "https://a.com/1": { "status": "done" },
            "https://a.com/2": 42,
        }));

        let records = store.list_all().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "https://a.com/1");
    }

    #[tokio::test]
    async fn test_export_is_flat_and_sorted() {
        let (store, _, _) = create_test_store(json!({
            "https://b.com/": { "status": "todo" },
            "https://a.com/": { "status": "done", "title": "A" },
        }));

        let exported = store.export().await.unwrap();
        let json = serde_json::to_value(&exported).unwrap();

        assert_eq!(json[0]["url"], "https://a.com/");
        assert_eq!(json[0]["status"], "done");
        assert_eq!(json[0]["title"], "A");
        assert_eq!(json[1]["url"], "https://b.com/");
    }

    #[tokio::test]
    async fn test_clear_keeps_settings() {
        let (store, backend, _) = create_test_store(json!({
            "userSettings": { "initialStatus": "done" },
            "https://a.com/1": { "status": "done" },
        }));

        store.clear().await.unwrap();

        let remaining = backend.snapshot();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(SETTINGS_KEY));
    }
}
