//! rfidgate-core: the RFID toggle-and-notify workflow.
//!
//! A scan looks the tag up in the registry, flips its status, appends a log
//! entry and publishes the resulting status. The registry read, the write
//! and the log append share one storage snapshot; the publish happens after
//! commit and is bounded by a timeout.
//!
//! - [`ToggleWorkflow`] -- scan, direct-set, registration and log queries
//! - [`Notifier`] -- status publisher seam, with [`MqttNotifier`] and
//!   [`DisabledNotifier`] implementations
//! - [`TagLocks`] -- per-tag serialization of concurrent scans

pub mod error;
pub mod locks;
pub mod notify;
pub mod workflow;

pub use error::{NotifyError, WorkflowError, NO_TAG_MESSAGE};
pub use locks::TagLocks;
pub use notify::{DisabledNotifier, MqttNotifier, MqttSettings, Notifier};
pub use workflow::{
    now_timestamp, ScanResult, SetStatusOutcome, ToggleWorkflow, DEFAULT_NOTIFY_TIMEOUT,
};

pub use rfidgate_storage::{GateStorage, LogEntryRecord, StorageError, TagRecord, TagStatus};
