/// Client side of the extension pages: popup, list page, options page and link overlay

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::error::{ClientError, HostError};
use crate::indexer::sort_by_status;
use crate::normalize::{inspect_url, normalize, origin_of, UrlKind};
use crate::page_data::{PageProperties, PageRecord, PropertiesPatch, Status, TabInfo};
use crate::protocol::{ImportEntry, Request};
use crate::settings::Settings;
use crate::storage::{ExportEntry, PageStore};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use url::Url;

/// Channel from a surface to the coordinator (`chrome.runtime.sendMessage`).
#[async_trait(?Send)]
pub trait CoordinatorTransport {
    async fn send(&self, request: &Request) -> Result<Value, HostError>;
}

/// Transport that calls a coordinator living in the same context.
pub struct LocalTransport {
    coordinator: Rc<Coordinator>,
    sender_tab: Option<i32>,
}

impl LocalTransport {
    pub fn new(coordinator: Rc<Coordinator>, sender_tab: Option<i32>) -> Self {
        LocalTransport {
            coordinator,
            sender_tab,
        }
    }
}

#[async_trait(?Send)]
impl CoordinatorTransport for LocalTransport {
    async fn send(&self, request: &Request) -> Result<Value, HostError> {
        let response = self.coordinator.handle(request.clone(), self.sender_tab).await;
        serde_json::to_value(response).map_err(|e| HostError::Failed(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchKind {
    Update(PropertiesPatch),
    Remove,
}

/// A write sent to the coordinator but not yet seen in a fetched snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticPatch {
    pub kind: PatchKind,
    pub issued_at: f64,
}

impl OptimisticPatch {
    /// Whether `fetched` (the stored record for the same key, if any) already reflects this patch.
    fn is_settled(&self, fetched: Option<&PageRecord>) -> bool {
        let modified = fetched.and_then(|record| record.properties.modified);
        match (&self.kind, fetched) {
            (PatchKind::Update(_), Some(_)) => modified.is_some_and(|m| m >= self.issued_at),
            (PatchKind::Update(_), None) => false,
            (PatchKind::Remove, None) => true,
            // re-marked by someone after our removal
            (PatchKind::Remove, Some(_)) => modified.is_some_and(|m| m > self.issued_at),
        }
    }
}

/// What the popup should do when it opens.
#[derive(Debug, Clone, PartialEq)]
pub enum PopupView {
    /// Page cannot be tracked; close right away
    Close,
    Show { key: String, status: Status },
}

/// State a surface keeps between renders: store reads plus unconfirmed writes.
pub struct SurfaceClient {
    store: Rc<PageStore>,
    transport: Rc<dyn CoordinatorTransport>,
    clock: Rc<dyn Clock>,
    pending: RefCell<BTreeMap<String, OptimisticPatch>>,
}

impl SurfaceClient {
    pub fn new(store: Rc<PageStore>, transport: Rc<dyn CoordinatorTransport>, clock: Rc<dyn Clock>) -> Self {
        SurfaceClient {
            store,
            transport,
            clock,
            pending: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Send a properties change; the patch shows in snapshots until a fetch reflects it.
    ///
    /// A rejected or undeliverable change is rolled back locally.
    pub async fn change_properties(
        &self,
        url: &str,
        properties: PropertiesPatch,
        tab_id: Option<i32>,
    ) -> Result<String, ClientError> {
        let key = page_key(url)?;
        let kind = if properties.status == Some(Status::None) {
            PatchKind::Remove
        } else {
            PatchKind::Update(properties.clone())
        };
        self.queue(&key, kind);

        let request = Request::ChangePageStatus {
            url: url.to_string(),
            properties,
            tab_id,
        };
        self.send_with_rollback(&key, &request).await
    }

    pub async fn change_status(&self, url: &str, status: Status, tab_id: Option<i32>) -> Result<String, ClientError> {
        self.change_properties(url, PropertiesPatch::status(status), tab_id).await
    }

    /// Status change made from the popup: carries the tab title along.
    pub async fn mark_tab(&self, tab: &TabInfo, status: Status) -> Result<String, ClientError> {
        let properties = PropertiesPatch {
            status: Some(status),
            title: (!tab.title.is_empty()).then(|| tab.title.clone()),
            ..Default::default()
        };
        self.change_properties(&tab.url, properties, Some(tab.id)).await
    }

    pub async fn remove(&self, url: &str) -> Result<String, ClientError> {
        let key = page_key(url)?;
        self.queue(&key, PatchKind::Remove);
        let request = Request::RemovePage { url: url.to_string() };
        self.send_with_rollback(&key, &request).await
    }

    /// Fresh records (all, or one origin) with unconfirmed patches laid over them.
    ///
    /// Patches the fetch already reflects are dropped first. Result is
    /// sorted by status, then url.
    pub async fn snapshot(&self, origin: Option<&str>) -> Result<Vec<PageRecord>, ClientError> {
        let mut records = match origin {
            Some(origin) => self.store.list_for_origin(origin).await?,
            None => self.store.list_all().await?,
        };
        self.expire(&records, origin);

        for (key, patch) in self.pending.borrow().iter() {
            if !in_scope(key, origin) {
                continue;
            }
            let position = records.iter().position(|record| &record.key == key);
            match (&patch.kind, position) {
                (PatchKind::Remove, Some(index)) => {
                    records.remove(index);
                }
                (PatchKind::Remove, None) => {}
                (PatchKind::Update(update), Some(index)) => update.apply_to(&mut records[index].properties),
                (PatchKind::Update(update), None) => {
                    // not stored yet: synthesize from the patch
                    if let Some(status) = update.status {
                        let mut properties = PageProperties::with_status(status.retire());
                        update.apply_to(&mut properties);
                        records.push(PageRecord::new(key.clone(), properties));
                    }
                }
            }
        }

        sort_by_status(&mut records);
        Ok(records)
    }

    /// Surface became visible again; a broadcast may have been missed.
    pub async fn on_resume(&self, origin: Option<&str>) -> Result<Vec<PageRecord>, ClientError> {
        debug!("surface resumed, re-fetching {:?}", origin);
        self.snapshot(origin).await
    }

    /// Decide what the popup shows for `tab`, marking unmarked pages when configured.
    pub async fn open_popup(&self, tab: &TabInfo, settings: &Settings) -> Result<PopupView, ClientError> {
        let key = match inspect_url(&tab.url) {
            UrlKind::Page { key, .. } => key,
            _ => return Ok(PopupView::Close),
        };

        let stored = self.store.status_of(&tab.url).await?;
        let status = self.displayed_status(&key, stored);

        if status == Status::None && settings.mark_on_popup_open {
            let initial = settings.initial_status.retire();
            self.mark_tab(tab, initial).await?;
            return Ok(PopupView::Show { key, status: initial });
        }

        Ok(PopupView::Show { key, status })
    }

    pub async fn export(&self) -> Result<Vec<ExportEntry>, ClientError> {
        Ok(self.store.export().await?)
    }

    /// Hand an import file to the coordinator. Returns its final ack string.
    pub async fn import(&self, data: Vec<ImportEntry>) -> Result<String, ClientError> {
        let answer = self.transport.send(&Request::ImportData { data }).await?;
        expect_ack(answer)
    }

    /// Delete every record once `confirm` has been pressed twice. Returns whether it ran.
    pub async fn clear_all(&self, confirm: &mut TwoStepConfirm) -> Result<bool, ClientError> {
        if confirm.press() == ConfirmStep::AskAgain {
            return Ok(false);
        }
        self.store.clear().await?;
        self.pending.borrow_mut().clear();
        Ok(true)
    }

    fn queue(&self, key: &str, kind: PatchKind) {
        let patch = OptimisticPatch {
            kind,
            issued_at: self.clock.now(),
        };
        self.pending.borrow_mut().insert(key.to_string(), patch);
    }

    async fn send_with_rollback(&self, key: &str, request: &Request) -> Result<String, ClientError> {
        let result = match self.transport.send(request).await {
            Ok(answer) => expect_ack(answer),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = &result {
            warn!("change of {} failed, rolling back: {}", key, e);
            self.pending.borrow_mut().remove(key);
        }
        result
    }

    fn expire(&self, fetched: &[PageRecord], origin: Option<&str>) {
        self.pending.borrow_mut().retain(|key, patch| {
            if !in_scope(key, origin) {
                return true;
            }
            let record = fetched.iter().find(|record| &record.key == key);
            !patch.is_settled(record)
        });
    }

    fn displayed_status(&self, key: &str, stored: Status) -> Status {
        match self.pending.borrow().get(key).map(|patch| &patch.kind) {
            Some(PatchKind::Remove) => Status::None,
            Some(PatchKind::Update(update)) => update.status.map(Status::retire).unwrap_or(stored),
            None => stored,
        }
    }
}

fn page_key(url: &str) -> Result<String, ClientError> {
    match inspect_url(url) {
        UrlKind::Page { key, .. } => Ok(key),
        _ => Err(ClientError::NotAPage(url.to_string())),
    }
}

fn in_scope(key: &str, origin: Option<&str>) -> bool {
    origin.is_none_or(|origin| origin_of(key).as_deref() == Some(origin))
}

fn expect_ack(answer: Value) -> Result<String, ClientError> {
    match answer {
        Value::String(ack) if ack.starts_with("error:") => Err(ClientError::Rejected(ack)),
        Value::String(ack) => Ok(ack),
        other => Err(ClientError::UnexpectedResponse(other.to_string())),
    }
}

fn expect_statuses(answer: Value) -> Result<BTreeMap<String, Status>, ClientError> {
    match answer {
        Value::String(message) if message.starts_with("error:") => Err(ClientError::Rejected(message)),
        other => serde_json::from_value(other.clone())
            .map_err(|_| ClientError::UnexpectedResponse(other.to_string())),
    }
}

/// Link marking for one page: which anchors to look up and which class each gets.
pub struct LinkOverlay {
    page: Option<Url>,
}

impl LinkOverlay {
    pub fn new(page_url: &str) -> Self {
        LinkOverlay {
            page: Url::parse(page_url).ok(),
        }
    }

    /// Absolute form of `href`, resolved against the page.
    fn resolve(&self, href: &str) -> Option<Url> {
        match &self.page {
            Some(page) => page.join(href).ok(),
            None => Url::parse(href).ok(),
        }
    }

    /// Whether an anchor points to some other http(s) document.
    ///
    /// Empty and bare `#` hrefs are skipped, as are in-page anchors of the current document.
    pub fn is_normal_link(&self, href: &str) -> bool {
        let href = href.trim();
        if href.is_empty() || href == "#" {
            return false;
        }
        let Some(target) = self.resolve(href) else {
            return false;
        };
        if !matches!(target.scheme(), "http" | "https") {
            return false;
        }
        match (&self.page, target.fragment()) {
            (Some(page), Some(_)) => {
                let mut target = target.clone();
                let mut page = page.clone();
                target.set_fragment(None);
                page.set_fragment(None);
                target != page
            }
            _ => true,
        }
    }

    /// Normalized, deduplicated urls of all normal links.
    pub fn collect_urls<'a>(&self, hrefs: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        hrefs
            .into_iter()
            .filter(|href| self.is_normal_link(href))
            .filter_map(|href| self.resolve(href.trim()))
            .filter_map(|url| normalize(url.as_str()))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// One `batch-get-status` for every link on the page.
    pub async fn fetch_statuses<'a>(
        &self,
        transport: &dyn CoordinatorTransport,
        hrefs: impl IntoIterator<Item = &'a str>,
    ) -> Result<BTreeMap<String, Status>, ClientError> {
        let urls = self.collect_urls(hrefs);
        if urls.is_empty() {
            return Ok(BTreeMap::new());
        }
        debug!("looking up {} links", urls.len());
        let answer = transport.send(&Request::BatchGetStatus { urls }).await?;
        expect_statuses(answer)
    }

    /// `marked-as-*` class for an anchor, if it should carry one.
    pub fn class_for(&self, href: &str, statuses: &BTreeMap<String, Status>) -> Option<String> {
        if !self.is_normal_link(href) {
            return None;
        }
        let key = normalize(self.resolve(href.trim())?.as_str())?;
        statuses.get(&key).and_then(Status::link_class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStep {
    AskAgain,
    Confirmed,
}

/// Irreversible actions need two presses in a row.
#[derive(Debug, Default)]
pub struct TwoStepConfirm {
    armed: bool,
}

impl TwoStepConfirm {
    pub fn press(&mut self) -> ConfirmStep {
        if self.armed {
            self.armed = false;
            ConfirmStep::Confirmed
        } else {
            self.armed = true;
            ConfirmStep::AskAgain
        }
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}
