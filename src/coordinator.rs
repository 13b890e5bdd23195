/// Background coordinator: owns the write path and fans out change notifications

use crate::error::{CoordinatorError, HostError, StoreError};
use crate::migrate::{upgrade_all, MigrationReport};
use crate::normalize::{inspect_url, is_supported_scheme, normalize, UrlKind};
use crate::page_data::{PropertiesPatch, Status, TabInfo};
use crate::protocol::{ImportEntry, Notification, Request, Response};
use crate::settings::Settings;
use crate::storage::PageStore;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// Browser-side effects the coordinator needs (tabs, toolbar action, scripting).
#[async_trait(?Send)]
pub trait BrowserHost {
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, HostError>;

    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError>;

    /// `HostError::NoReceiver` when no overlay listens in that tab.
    async fn send_to_tab(&self, tab_id: i32, notification: Notification) -> Result<(), HostError>;

    /// Set the toolbar indicator of a tab.
    async fn set_indicator(&self, tab_id: i32, status: Status) -> Result<(), HostError>;

    /// Enable the popup for a tab.
    async fn arm_popup(&self, tab_id: i32) -> Result<(), HostError>;

    /// Inject overlay script and stylesheet, then send `update-content`.
    /// Repeated calls on one document must be harmless.
    async fn inject_overlay(&self, tab_id: i32) -> Result<(), HostError>;
}

pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Runs fire-and-forget work without blocking the caller.
pub trait TaskSpawner {
    fn spawn(&self, task: LocalTask);
}

/// Spawner that queues tasks until `run_pending` drives them.
#[derive(Default)]
pub struct QueuedSpawner {
    queue: RefCell<Vec<LocalTask>>,
}

impl QueuedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run queued tasks, including any they spawn, until the queue is empty.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let tasks: Vec<LocalTask> = self.queue.borrow_mut().drain(..).collect();
            if tasks.is_empty() {
                return ran;
            }
            for task in tasks {
                task.await;
                ran += 1;
            }
        }
    }
}

impl TaskSpawner for QueuedSpawner {
    fn spawn(&self, task: LocalTask) {
        self.queue.borrow_mut().push(task);
    }
}

/// Lifecycle of one browsing tab as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabState {
    #[default]
    Uninitialized,
    Loading,
    /// Overlay injected and live
    ContentActive,
    /// Origin has no records; nothing injected
    Disabled,
}

/// Tab load progress reported by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    Complete,
}

/// Everything the coordinator works with, handed over at construction.
pub struct CoordinatorContext {
    pub store: Rc<PageStore>,
    pub host: Rc<dyn BrowserHost>,
    pub spawner: Rc<dyn TaskSpawner>,
    pub settings: Settings,
}

type TabStates = Rc<RefCell<HashMap<i32, TabState>>>;

pub struct Coordinator {
    store: Rc<PageStore>,
    host: Rc<dyn BrowserHost>,
    spawner: Rc<dyn TaskSpawner>,
    settings: RefCell<Settings>,
    tabs: TabStates,
    running: Cell<bool>,
}

impl Coordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Coordinator {
            store: ctx.store,
            host: ctx.host,
            spawner: ctx.spawner,
            settings: RefCell::new(ctx.settings),
            tabs: Rc::new(RefCell::new(HashMap::new())),
            running: Cell::new(false),
        }
    }

    /// Load persisted settings and start accepting messages.
    pub async fn init(&self) -> Result<(), CoordinatorError> {
        let settings = Settings::load(self.store.backend().as_ref()).await?;
        *self.settings.borrow_mut() = settings;
        self.running.set(true);
        info!("coordinator started");
        Ok(())
    }

    /// Stop accepting messages and forget all tab state.
    pub fn shutdown(&self) {
        self.running.set(false);
        self.tabs.borrow_mut().clear();
        info!("coordinator shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn store(&self) -> &Rc<PageStore> {
        &self.store
    }

    pub fn tab_state(&self, tab_id: i32) -> TabState {
        self.tabs.borrow().get(&tab_id).copied().unwrap_or_default()
    }

    /// Extension installed or updated: bring stored values to the current shape.
    pub async fn on_installed(&self) -> Result<MigrationReport, CoordinatorError> {
        Ok(upgrade_all(&self.store).await?)
    }

    /// Tab started loading a document or finished loading it.
    pub async fn on_tab_updated(&self, tab: &TabInfo, phase: LoadPhase) -> Result<TabState, CoordinatorError> {
        let has_records = match inspect_url(&tab.url) {
            UrlKind::Page { origin, .. } => self.store.has_records_for_origin(&origin).await?,
            _ => false,
        };

        if !has_records {
            debug!("extension is disabled on {}", tab.url);
            self.set_tab_state(tab.id, TabState::Disabled);
            self.host.set_indicator(tab.id, Status::Disabled).await?;
            return Ok(TabState::Disabled);
        }

        let next = match phase {
            LoadPhase::Loading => {
                self.set_tab_state(tab.id, TabState::Loading);
                self.host.arm_popup(tab.id).await?;
                let status = self.store.status_of(&tab.url).await?;
                self.host.set_indicator(tab.id, status).await?;
                TabState::Loading
            }
            LoadPhase::Complete => {
                if self.tab_state(tab.id) == TabState::ContentActive {
                    send_best_effort(self.host.as_ref(), tab.id).await;
                } else {
                    debug!("tab {} loaded {}, injecting overlay", tab.id, tab.url);
                    self.host.inject_overlay(tab.id).await?;
                }
                self.set_tab_state(tab.id, TabState::ContentActive);
                TabState::ContentActive
            }
        };
        Ok(next)
    }

    /// Tab came back to the foreground; a broadcast may have been missed meanwhile.
    pub async fn on_tab_activated(&self, tab: &TabInfo) -> Result<(), CoordinatorError> {
        let status = self.store.status_of(&tab.url).await?;
        let indicator = match self.tab_state(tab.id) {
            TabState::Disabled => Status::Disabled,
            _ => status,
        };
        self.host.set_indicator(tab.id, indicator).await?;

        if self.tab_state(tab.id) == TabState::ContentActive {
            send_best_effort(self.host.as_ref(), tab.id).await;
        }
        Ok(())
    }

    pub fn on_tab_removed(&self, tab_id: i32) {
        self.tabs.borrow_mut().remove(&tab_id);
    }

    /// Decode and handle a raw message. Unknown message types yield `None`;
    /// a known type that does not decode gets a failure ack.
    pub async fn handle_message(&self, message: Value, sender_tab: Option<i32>) -> Option<Response> {
        match Request::from_value(message)? {
            Ok(request) => Some(self.handle(request, sender_tab).await),
            Err(e) => Some(Response::failed(CoordinatorError::from(e))),
        }
    }

    /// Handle one request. Failures become a failure ack, never a crash.
    pub async fn handle(&self, request: Request, sender_tab: Option<i32>) -> Response {
        if !self.running.get() {
            return Response::failed(CoordinatorError::ShutDown);
        }
        match self.dispatch(request, sender_tab).await {
            Ok(response) => response,
            Err(e) => {
                error!("message handling failed: {}", e);
                Response::failed(e)
            }
        }
    }

    async fn dispatch(&self, request: Request, sender_tab: Option<i32>) -> Result<Response, CoordinatorError> {
        match request {
            Request::ChangePageStatus { url, properties, tab_id } => {
                self.change_page_status(&url, &properties, tab_id.or(sender_tab)).await
            }
            Request::RemovePage { url } => self.remove_page(&url).await,
            Request::GetStatus { url } => Ok(Response::Status(self.store.status_of(&url).await?)),
            Request::BatchGetStatus { urls } => Ok(Response::Statuses(self.store.statuses_for(&urls).await?)),
            Request::ImportData { data } => self.import_data(data).await,
        }
    }

    /// Write a status change, notify all tabs, update the originating tab.
    ///
    /// Read-merge-write is not isolated: two overlapping changes of the same
    /// url may lose one of them (last completed write wins).
    async fn change_page_status(
        &self,
        url: &str,
        properties: &PropertiesPatch,
        tab_id: Option<i32>,
    ) -> Result<Response, CoordinatorError> {
        let (key, origin) = page_parts(url)?;
        info!("updating {} to {:?}", key, properties.status);

        let had_records = self.store.has_records_for_origin(&origin).await?;
        let status = if properties.status == Some(Status::None) {
            self.store.remove(&key).await?;
            Status::None
        } else {
            self.store
                .upsert(&key, properties)
                .await?
                .map(|record| record.status())
                .unwrap_or(Status::None)
        };

        self.broadcast();

        if let Some(tab_id) = tab_id {
            self.host.set_indicator(tab_id, status).await?;
            if !had_records && status != Status::None {
                self.spawn_injection(tab_id);
            }
        }

        Ok(Response::Ack("change-page-status done".to_string()))
    }

    async fn remove_page(&self, url: &str) -> Result<Response, CoordinatorError> {
        let (key, _) = page_parts(url)?;
        self.store.remove(&key).await?;
        self.broadcast();

        if let Some(active) = self.host.active_tab().await? {
            if normalize(&active.url).as_deref() == Some(key.as_str()) {
                self.host.set_indicator(active.id, Status::None).await?;
            }
        }

        Ok(Response::Ack("remove-page done".to_string()))
    }

    async fn import_data(&self, data: Vec<ImportEntry>) -> Result<Response, CoordinatorError> {
        let total = data.len();
        let mut imported = 0;

        for entry in data {
            if entry.properties.status == Some(Status::None) {
                continue;
            }
            match self.store.upsert(&entry.url, &entry.properties).await {
                Ok(Some(_)) => imported += 1,
                Ok(None) => debug!("skipping import of untrackable url {}", entry.url),
                Err(e @ (StoreError::MissingStatus(_) | StoreError::UnpersistableStatus(_))) => {
                    warn!("skipping import entry {}: {}", entry.url, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        upgrade_all(&self.store).await?;
        self.broadcast();
        info!("imported {} of {} entries", imported, total);

        Ok(Response::Ack("success".to_string()))
    }

    /// Tell every http(s) tab to re-query. Best effort, not awaited.
    pub fn broadcast(&self) {
        let host = Rc::clone(&self.host);
        let spawner = Rc::clone(&self.spawner);

        self.spawner.spawn(Box::pin(async move {
            let tabs = match host.query_tabs().await {
                Ok(tabs) => tabs,
                Err(e) => {
                    warn!("could not list tabs for update: {}", e);
                    return;
                }
            };
            debug!("storage changed, updating {} tabs", tabs.len());

            for tab in tabs.into_iter().filter(|tab| is_supported_scheme(&tab.url)) {
                let host = Rc::clone(&host);
                spawner.spawn(Box::pin(async move {
                    send_best_effort(host.as_ref(), tab.id).await;
                }));
            }
        }));
    }

    /// First record on an origin: bring the overlay into the originating tab.
    fn spawn_injection(&self, tab_id: i32) {
        let host = Rc::clone(&self.host);
        let tabs = Rc::clone(&self.tabs);

        self.spawner.spawn(Box::pin(async move {
            match host.inject_overlay(tab_id).await {
                Ok(()) => {
                    tabs.borrow_mut().insert(tab_id, TabState::ContentActive);
                }
                Err(e) => error!("overlay injection into tab {} failed: {}", tab_id, e),
            }
        }));
    }

    fn set_tab_state(&self, tab_id: i32, state: TabState) {
        self.tabs.borrow_mut().insert(tab_id, state);
    }
}

fn page_parts(url: &str) -> Result<(String, String), CoordinatorError> {
    match inspect_url(url) {
        UrlKind::Page { key, origin } => Ok((key, origin)),
        UrlKind::Unsupported => Err(CoordinatorError::UnsupportedScheme(url.to_string())),
        UrlKind::Malformed => Err(CoordinatorError::MalformedUrl(url.to_string())),
    }
}

/// `update-content` to one tab; a missing listener is expected.
async fn send_best_effort(host: &dyn BrowserHost, tab_id: i32) {
    match host.send_to_tab(tab_id, Notification::UpdateContent).await {
        Ok(()) | Err(HostError::NoReceiver) => {}
        Err(e) => warn!("error updating tab {}: {}", tab_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_coordinator;
    use serde_json::json;

    fn tab(id: i32, url: &str) -> TabInfo {
        TabInfo::new(id, url.to_string(), String::new())
    }

    #[tokio::test]
    async fn test_change_page_status_writes_and_broadcasts() {
        let (coordinator, host, spawner, backend) = create_test_coordinator(json!({})).await;
        host.open(tab(1, "https://a.com/p"), true);
        host.open(tab(2, "https://a.com/other"), true);
        host.open(tab(3, "chrome://newtab/"), true);

        let response = coordinator
            .handle(Request::change_status("https://a.com/p#top", Status::Done), Some(1))
            .await;

        assert_eq!(response, Response::Ack("change-page-status done".to_string()));
        assert_eq!(backend.snapshot()["https://a.com/p"]["status"], "done");
        assert_eq!(host.indicators(), vec![(1, Status::Done)]);

        spawner.run_pending().await;
        let mut notified = host.notified_tabs();
        notified.sort();
        // tab 1 twice: broadcast plus first-record injection
        assert_eq!(notified, vec![1, 1, 2]);
        assert_eq!(host.injected(), vec![1]);
        assert_eq!(coordinator.tab_state(1), TabState::ContentActive);
    }

    #[tokio::test]
    async fn test_no_injection_when_origin_already_has_records() {
        let (coordinator, host, spawner, _) =
            create_test_coordinator(json!({ "https://a.com/old": { "status": "done" } })).await;
        host.open(tab(1, "https://a.com/p"), true);

        coordinator
            .handle(Request::change_status("https://a.com/p", Status::Todo), Some(1))
            .await;
        spawner.run_pending().await;

        assert!(host.injected().is_empty());
    }

    #[tokio::test]
    async fn test_change_to_none_removes_record() {
        let (coordinator, host, spawner, backend) =
            create_test_coordinator(json!({ "https://a.com/p": { "status": "done" } })).await;
        host.open(tab(1, "https://a.com/p"), true);

        let response = coordinator
            .handle(Request::change_status("https://a.com/p", Status::None), Some(1))
            .await;
        spawner.run_pending().await;

        assert!(!response.is_failure());
        assert!(backend.snapshot().is_empty());
        assert_eq!(host.indicators(), vec![(1, Status::None)]);
        assert!(host.injected().is_empty());
    }

    #[tokio::test]
    async fn test_change_page_status_rejects_unsupported_scheme() {
        let (coordinator, _, _, backend) = create_test_coordinator(json!({})).await;

        let response = coordinator
            .handle(Request::change_status("chrome://extensions", Status::Done), None)
            .await;

        assert!(response.is_failure());
        assert_eq!(backend.writes(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_returns_failure_ack() {
        let (coordinator, _, spawner, backend) = create_test_coordinator(json!({})).await;
        backend.set_failing(true);

        let response = coordinator
            .handle(Request::change_status("https://a.com/p", Status::Done), None)
            .await;

        assert!(response.is_failure());
        // no broadcast for a write that never happened
        assert_eq!(spawner.pending(), 0);
    }

    #[tokio::test]
    async fn test_indicator_failure_on_originating_tab_surfaces() {
        let (coordinator, host, _, backend) = create_test_coordinator(json!({})).await;
        host.fail_indicator.set(true);

        let response = coordinator
            .handle(Request::change_status("https://a.com/p", Status::Done), Some(1))
            .await;

        assert!(response.is_failure());
        // the write itself is kept
        assert_eq!(backend.snapshot()["https://a.com/p"]["status"], "done");
    }

    #[tokio::test]
    async fn test_broadcast_swallows_unreachable_tabs() {
        let (coordinator, host, spawner, _) = create_test_coordinator(json!({})).await;
        host.open(tab(1, "https://a.com/"), false);
        host.open(tab(2, "https://b.com/"), true);

        coordinator.broadcast();
        spawner.run_pending().await;

        assert_eq!(host.notified_tabs(), vec![2]);
    }

    #[tokio::test]
    async fn test_remove_page_resets_active_indicator() {
        let (coordinator, host, spawner, backend) =
            create_test_coordinator(json!({ "https://a.com/p": { "status": "todo" } })).await;
        host.open(tab(4, "https://a.com/p#section"), true);
        host.activate(4);

        let response = coordinator
            .handle(Request::RemovePage { url: "https://a.com/p".to_string() }, None)
            .await;
        spawner.run_pending().await;

        assert_eq!(response, Response::Ack("remove-page done".to_string()));
        assert!(backend.snapshot().is_empty());
        assert_eq!(host.indicators(), vec![(4, Status::None)]);
    }

    #[tokio::test]
    async fn test_get_status_and_batch() {
        let (coordinator, _, _, _) =
            create_test_coordinator(json!({ "https://a.com/x": { "status": "done" } })).await;

        let status = coordinator
            .handle(Request::GetStatus { url: "https://a.com/x#frag".to_string() }, None)
            .await;
        assert_eq!(status, Response::Status(Status::Done));

        let disabled = coordinator
            .handle(Request::GetStatus { url: "about:blank".to_string() }, None)
            .await;
        assert_eq!(disabled, Response::Status(Status::Disabled));

        let batch = coordinator
            .handle(
                Request::BatchGetStatus {
                    urls: vec!["https://a.com/x".to_string(), "https://a.com/y".to_string()],
                },
                None,
            )
            .await;
        let Response::Statuses(map) = batch else {
            panic!("expected statuses");
        };
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("https://a.com/x"), Some(&Status::Done));
    }

    #[tokio::test]
    async fn test_import_data_upserts_and_migrates() {
        let (coordinator, _, _, backend) =
            create_test_coordinator(json!({ "https://old.com/": true })).await;

        let response = coordinator
            .handle_message(
                json!({
                    "type": "import-data",
                    "data": [
                        { "url": "https://a.com/1", "status": "done", "title": "One" },
                        { "url": "https://a.com/2", "status": "started" },
                        { "url": "https://a.com/3", "status": "none" },
                        { "url": "not a url", "status": "done" },
                    ],
                }),
                None,
            )
            .await;

        assert_eq!(response, Some(Response::Ack("success".to_string())));
        let stored = backend.snapshot();
        assert_eq!(stored["https://a.com/1"]["title"], "One");
        assert_eq!(stored["https://a.com/2"]["status"], "todo");
        assert!(!stored.contains_key("https://a.com/3"));
        // migrator ran
        assert_eq!(stored["https://old.com/"]["status"], "done");
    }

    #[tokio::test]
    async fn test_import_data_accepts_exported_date_strings() {
        let (coordinator, _, _, backend) = create_test_coordinator(json!({})).await;

        let response = coordinator
            .handle_message(
                json!({
                    "type": "import-data",
                    "data": [
                        { "url": "https://a.com/1", "status": "done" },
                        {
                            "url": "https://a.com/2",
                            "status": "todo",
                            "title": "Two",
                            "created": "2021-02-21T12:00:00.000Z",
                            "lastModified": "2021-03-21T12:00:00.000Z",
                        },
                    ],
                }),
                None,
            )
            .await;

        assert_eq!(response, Some(Response::Ack("success".to_string())));
        let stored = backend.snapshot();
        assert_eq!(stored["https://a.com/1"]["status"], "done");
        assert_eq!(stored["https://a.com/2"]["status"], "todo");
        assert_eq!(stored["https://a.com/2"]["title"], "Two");
        assert_eq!(stored["https://a.com/2"]["created"], 1000.0);
    }

    #[tokio::test]
    async fn test_unknown_messages_are_ignored() {
        let (coordinator, _, _, _) = create_test_coordinator(json!({})).await;
        assert!(coordinator.handle_message(json!({ "type": "ping" }), None).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_known_message_gets_failure_ack() {
        let (coordinator, _, _, backend) = create_test_coordinator(json!({})).await;

        let response = coordinator
            .handle_message(json!({ "type": "import-data", "data": "not a list" }), None)
            .await;

        assert!(response.is_some_and(|response| response.is_failure()));
        assert!(backend.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_tab_lifecycle_disabled_origin() {
        let (coordinator, host, _, _) = create_test_coordinator(json!({})).await;
        let page = tab(1, "https://quiet.com/");

        let state = coordinator.on_tab_updated(&page, LoadPhase::Loading).await.unwrap();

        assert_eq!(state, TabState::Disabled);
        assert_eq!(host.indicators(), vec![(1, Status::Disabled)]);
        assert!(host.popups().is_empty());

        coordinator.on_tab_updated(&page, LoadPhase::Complete).await.unwrap();
        assert!(host.injected().is_empty());
    }

    #[tokio::test]
    async fn test_tab_lifecycle_active_origin() {
        let (coordinator, host, _, _) =
            create_test_coordinator(json!({ "https://a.com/read": { "status": "done" } })).await;
        let page = tab(1, "https://a.com/read");

        let loading = coordinator.on_tab_updated(&page, LoadPhase::Loading).await.unwrap();
        assert_eq!(loading, TabState::Loading);
        assert_eq!(host.popups(), vec![1]);
        assert_eq!(host.indicators(), vec![(1, Status::Done)]);

        let active = coordinator.on_tab_updated(&page, LoadPhase::Complete).await.unwrap();
        assert_eq!(active, TabState::ContentActive);
        assert_eq!(host.injected(), vec![1]);

        // a second "complete" for the same document only refreshes
        coordinator.on_tab_updated(&page, LoadPhase::Complete).await.unwrap();
        assert_eq!(host.injected(), vec![1]);
    }

    #[tokio::test]
    async fn test_tab_lifecycle_unsupported_scheme() {
        let (coordinator, host, _, _) = create_test_coordinator(json!({})).await;

        let state = coordinator
            .on_tab_updated(&tab(9, "chrome://extensions"), LoadPhase::Loading)
            .await
            .unwrap();

        assert_eq!(state, TabState::Disabled);
        assert_eq!(host.indicators(), vec![(9, Status::Disabled)]);
    }

    #[tokio::test]
    async fn test_tab_activation_refreshes_content() {
        let (coordinator, host, _, _) =
            create_test_coordinator(json!({ "https://a.com/": { "status": "todo" } })).await;
        let page = tab(1, "https://a.com/");
        coordinator.on_tab_updated(&page, LoadPhase::Complete).await.unwrap();
        let before = host.notified_tabs().len();

        coordinator.on_tab_activated(&page).await.unwrap();

        assert_eq!(host.notified_tabs().len(), before + 1);
        assert_eq!(host.indicators().last(), Some(&(1, Status::Todo)));

        coordinator.on_tab_removed(1);
        assert_eq!(coordinator.tab_state(1), TabState::Uninitialized);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_messages() {
        let (coordinator, _, _, _) = create_test_coordinator(json!({})).await;
        coordinator.shutdown();

        let response = coordinator
            .handle(Request::GetStatus { url: "https://a.com/".to_string() }, None)
            .await;

        assert!(response.is_failure());
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_init_loads_settings() {
        let (coordinator, _, _, _) =
            create_test_coordinator(json!({ "userSettings": { "initialStatus": "done" } })).await;
        assert_eq!(coordinator.settings().initial_status, Status::Done);
    }

    #[tokio::test]
    async fn test_on_installed_runs_migration() {
        let (coordinator, _, _, backend) =
            create_test_coordinator(json!({ "https://a.com/": "started" })).await;

        let report = coordinator.on_installed().await.unwrap();

        assert_eq!(report.upgraded, 1);
        assert_eq!(backend.snapshot()["https://a.com/"]["status"], "todo");
    }
}
