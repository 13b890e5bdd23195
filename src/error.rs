/// Error types for the page store, browser host and coordinator
use crate::page_data::Status;
use thiserror::Error;

/// Failures of the page store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected a read or write.
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("could not (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot create a record for {0} without a status")]
    MissingStatus(String),

    #[error("status \"{0}\" is never persisted; use remove instead")]
    UnpersistableStatus(Status),
}

/// Failures talking to browser tabs and extension APIs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// Nothing listens in the target tab (overlay not loaded).
    #[error("receiving end does not exist")]
    NoReceiver,

    #[error("browser call failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("coordinator is shut down")]
    ShutDown,
}

/// Failures seen by a surface client (popup, overlay, list page).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not reach the coordinator: {0}")]
    Transport(#[from] HostError),

    /// The coordinator answered with a failure ack.
    #[error("coordinator rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected coordinator answer: {0}")]
    UnexpectedResponse(String),

    #[error("not a trackable page: {0}")]
    NotAPage(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
