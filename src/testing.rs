/// In-process fakes for the browser host, shared by coordinator and surface tests
use crate::clock::ManualClock;
use crate::coordinator::{BrowserHost, Coordinator, CoordinatorContext, QueuedSpawner};
use crate::error::HostError;
use crate::page_data::{Status, TabInfo};
use crate::protocol::Notification;
use crate::settings::Settings;
use crate::storage::{MemoryStorage, PageStore};
use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Records every browser call; tabs without a listener answer `NoReceiver`.
#[derive(Default)]
pub struct RecordingHost {
    tabs: RefCell<Vec<TabInfo>>,
    active: Cell<Option<i32>>,
    listening: RefCell<HashSet<i32>>,
    sent: RefCell<Vec<(i32, Notification)>>,
    indicators: RefCell<Vec<(i32, Status)>>,
    injected: RefCell<Vec<i32>>,
    popups: RefCell<Vec<i32>>,
    pub fail_indicator: Cell<bool>,
}

impl RecordingHost {
    pub fn open(&self, tab: TabInfo, listening: bool) {
        if listening {
            self.listening.borrow_mut().insert(tab.id);
        }
        self.tabs.borrow_mut().push(tab);
    }

    pub fn activate(&self, tab_id: i32) {
        self.active.set(Some(tab_id));
    }

    pub fn notified_tabs(&self) -> Vec<i32> {
        self.sent.borrow().iter().map(|(id, _)| *id).collect()
    }

    pub fn indicators(&self) -> Vec<(i32, Status)> {
        self.indicators.borrow().clone()
    }

    pub fn injected(&self) -> Vec<i32> {
        self.injected.borrow().clone()
    }

    pub fn popups(&self) -> Vec<i32> {
        self.popups.borrow().clone()
    }
}

#[async_trait(?Send)]
impl BrowserHost for RecordingHost {
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        Ok(self.tabs.borrow().clone())
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        let Some(id) = self.active.get() else {
            return Ok(None);
        };
        Ok(self.tabs.borrow().iter().find(|tab| tab.id == id).cloned())
    }

    async fn send_to_tab(&self, tab_id: i32, notification: Notification) -> Result<(), HostError> {
        if !self.listening.borrow().contains(&tab_id) {
            return Err(HostError::NoReceiver);
        }
        self.sent.borrow_mut().push((tab_id, notification));
        Ok(())
    }

    async fn set_indicator(&self, tab_id: i32, status: Status) -> Result<(), HostError> {
        if self.fail_indicator.get() {
            return Err(HostError::Failed("no tab with id".to_string()));
        }
        self.indicators.borrow_mut().push((tab_id, status));
        Ok(())
    }

    async fn arm_popup(&self, tab_id: i32) -> Result<(), HostError> {
        self.popups.borrow_mut().push(tab_id);
        Ok(())
    }

    async fn inject_overlay(&self, tab_id: i32) -> Result<(), HostError> {
        self.injected.borrow_mut().push(tab_id);
        self.listening.borrow_mut().insert(tab_id);
        self.send_to_tab(tab_id, Notification::UpdateContent).await
    }
}

/// Started coordinator over an in-memory store seeded with `entries`.
pub async fn create_test_coordinator(
    entries: Value,
) -> (Rc<Coordinator>, Rc<RecordingHost>, Rc<QueuedSpawner>, Rc<MemoryStorage>) {
    let backend = Rc::new(MemoryStorage::with_entries(
        entries.as_object().cloned().unwrap_or_default(),
    ));
    let host = Rc::new(RecordingHost::default());
    let spawner = Rc::new(QueuedSpawner::new());
    let store = Rc::new(PageStore::new(backend.clone(), Rc::new(ManualClock::new(1_000.0))));

    let coordinator = Rc::new(Coordinator::new(CoordinatorContext {
        store,
        host: host.clone(),
        spawner: spawner.clone(),
        settings: Settings::default(),
    }));
    coordinator.init().await.unwrap();

    (coordinator, host, spawner, backend)
}
