/// wasm-bindgen glue to the chrome.* extension APIs

use crate::coordinator::{BrowserHost, LocalTask, TaskSpawner};
use crate::error::{HostError, Result, StoreError};
use crate::page_data::{Status, TabInfo};
use crate::protocol::{Notification, Request};
use crate::storage::StorageBackend;
use crate::surface::CoordinatorTransport;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

// Import JS bridge functions
#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(keys: JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(key: &str, value: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(key: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageClear() -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn activeTab() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendToTab(tab_id: i32, message: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn setIcon(tab_id: i32, path: &str, title: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn setPopup(tab_id: i32, popup: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn injectOverlay(tab_id: i32) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendRuntimeMessage(message: JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn openListPage() -> std::result::Result<(), JsValue>;

    fn closePopup();

    fn exportToFile(data: &str, filename: &str);
}

const POPUP_PAGE: &str = "popup.html";

/// Plain JS objects, never `Map`s, so chrome.storage can clone them.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> std::result::Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

fn js_message(error: &JsValue) -> String {
    if let Some(message) = error.as_string() {
        return message;
    }
    match error.dyn_ref::<js_sys::Error>() {
        Some(error) => String::from(error.message()),
        None => format!("{:?}", error),
    }
}

fn host_error(error: JsValue) -> HostError {
    let message = js_message(&error);
    if message.contains("Receiving end does not exist") {
        HostError::NoReceiver
    } else {
        HostError::Failed(message)
    }
}

fn storage_error(error: JsValue) -> StoreError {
    StoreError::Io(js_message(&error))
}

fn parse_tab(tab_js: JsValue) -> std::result::Result<Option<TabInfo>, HostError> {
    if tab_js.is_null() || tab_js.is_undefined() {
        return Ok(None);
    }
    serde_wasm_bindgen::from_value(tab_js)
        .map(Some)
        .map_err(|e| HostError::Failed(format!("Failed to parse tab: {:?}", e)))
}

/// `chrome.storage.local`
#[derive(Debug, Default)]
pub struct ChromeStorage;

impl ChromeStorage {
    async fn fetch(&self, keys: JsValue) -> Result<Map<String, Value>> {
        let items = storageGet(keys).await.map_err(storage_error)?;
        if items.is_null() || items.is_undefined() {
            return Ok(Map::new());
        }
        serde_wasm_bindgen::from_value(items)
            .map_err(|e| StoreError::Io(format!("Failed to parse storage: {:?}", e)))
    }
}

#[async_trait(?Send)]
impl StorageBackend for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut items = self.fetch(JsValue::from_str(key)).await?;
        Ok(items.remove(key))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Map<String, Value>> {
        self.fetch(to_js(keys).map_err(StoreError::Io)?).await
    }

    async fn get_all(&self) -> Result<Map<String, Value>> {
        self.fetch(JsValue::NULL).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let value_js = to_js(&value).map_err(StoreError::Io)?;
        storageSet(key, value_js).await.map_err(storage_error)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        storageRemove(key).await.map_err(storage_error)
    }

    async fn clear(&self) -> Result<()> {
        storageClear().await.map_err(storage_error)
    }
}

/// `chrome.tabs`, `chrome.action` and `chrome.scripting`
#[derive(Debug, Default)]
pub struct ChromeHost;

#[async_trait(?Send)]
impl BrowserHost for ChromeHost {
    async fn query_tabs(&self) -> std::result::Result<Vec<TabInfo>, HostError> {
        let tabs_js = queryTabs().await.map_err(host_error)?;
        serde_wasm_bindgen::from_value(tabs_js)
            .map_err(|e| HostError::Failed(format!("Failed to parse tabs: {:?}", e)))
    }

    async fn active_tab(&self) -> std::result::Result<Option<TabInfo>, HostError> {
        parse_tab(activeTab().await.map_err(host_error)?)
    }

    async fn send_to_tab(&self, tab_id: i32, notification: Notification) -> std::result::Result<(), HostError> {
        let message = to_js(&notification).map_err(HostError::Failed)?;
        sendToTab(tab_id, message).await.map_err(host_error)
    }

    async fn set_indicator(&self, tab_id: i32, status: Status) -> std::result::Result<(), HostError> {
        setIcon(tab_id, &status.icon_path(), status.as_str())
            .await
            .map_err(host_error)
    }

    async fn arm_popup(&self, tab_id: i32) -> std::result::Result<(), HostError> {
        setPopup(tab_id, POPUP_PAGE).await.map_err(host_error)
    }

    async fn inject_overlay(&self, tab_id: i32) -> std::result::Result<(), HostError> {
        injectOverlay(tab_id).await.map_err(host_error)
    }
}

/// `chrome.runtime.sendMessage` from popup, options and content pages
#[derive(Debug, Default)]
pub struct RuntimeTransport;

#[async_trait(?Send)]
impl CoordinatorTransport for RuntimeTransport {
    async fn send(&self, request: &Request) -> std::result::Result<Value, HostError> {
        let message = to_js(request).map_err(HostError::Failed)?;
        let answer = sendRuntimeMessage(message).await.map_err(host_error)?;
        if answer.is_undefined() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(answer)
            .map_err(|e| HostError::Failed(format!("Failed to parse answer: {:?}", e)))
    }
}

pub fn close_popup() {
    closePopup();
}

pub async fn open_list_page() -> std::result::Result<(), String> {
    openListPage()
        .await
        .map_err(|e| format!("Failed to open list: {}", js_message(&e)))
}

/// Offer `data` as a file download.
pub fn export_to_file(data: &str, filename: &str) {
    exportToFile(data, filename);
}

/// Runs detached work on the browser event loop.
#[derive(Debug, Default)]
pub struct WasmSpawner;

impl TaskSpawner for WasmSpawner {
    fn spawn(&self, task: LocalTask) {
        spawn_local(task);
    }
}
