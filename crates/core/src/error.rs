use std::time::Duration;

use rfidgate_storage::StorageError;

/// Message returned when a scan or status request carries no tag id.
pub const NO_TAG_MESSAGE: &str = "No RFID data provided";

/// Errors surfaced to callers of the workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Missing or empty required input. Nothing was read or written.
    #[error("{0}")]
    Validation(String),

    /// The storage backend failed. The snapshot was rolled back.
    #[error("database error: {0}")]
    Store(#[from] StorageError),
}

/// Errors from publishing a status notification. Logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("publish failed: {0}")]
    Client(String),
}
