/// UI module exports
pub mod components;
pub mod list;
pub mod popup;

use crate::bridge::{ChromeStorage, RuntimeTransport};
use crate::clock::SystemClock;
use crate::storage::PageStore;
use crate::surface::SurfaceClient;
use std::rc::Rc;

/// Client for extension pages: reads chrome.storage directly, writes through the coordinator.
pub fn surface_client() -> SurfaceClient {
    let clock = Rc::new(SystemClock);
    let store = PageStore::new(Rc::new(ChromeStorage), clock.clone());
    SurfaceClient::new(Rc::new(store), Rc::new(RuntimeTransport), clock)
}
