//! Toggle workflow: scan handling, direct status sets and registration.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Validate and trim the tag id (no storage access on failure)
//! 2. Take the per-tag lock
//! 3. Read, write and log inside one storage snapshot, then commit
//! 4. Publish the resulting status, bounded by the notify timeout
//!
//! A storage failure aborts the snapshot, so the registry and the log are
//! never left out of step. A publish failure or timeout is logged and does
//! not change the result.

use std::sync::Arc;
use std::time::Duration;

use rfidgate_storage::{
    GateStorage, LogEntryRecord, NewLogEntry, StorageError, TagRecord, TagStatus,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{NotifyError, WorkflowError, NO_TAG_MESSAGE};
use crate::locks::TagLocks;
use crate::notify::Notifier;

/// Default upper bound on a single publish.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of processing one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Whether the tag is registered.
    pub found: bool,
    pub tag_id: String,
    /// Status before the scan. None for unregistered tags.
    pub previous_status: Option<TagStatus>,
    pub new_status: TagStatus,
    pub timestamp: String,
    /// Whether the publish call succeeded within the timeout.
    pub notified: bool,
}

/// Outcome of a direct status set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetStatusOutcome {
    pub tag_id: String,
    pub new_status: TagStatus,
    /// Registry rows changed. Zero for an unregistered tag, which is still logged.
    pub rows_affected: u64,
    pub timestamp: String,
    pub notified: bool,
}

/// Orchestrates the registry, the event log and the notifier.
pub struct ToggleWorkflow<S: GateStorage> {
    storage: Arc<S>,
    notifier: Arc<dyn Notifier>,
    locks: TagLocks,
    notify_timeout: Duration,
}

impl<S: GateStorage> ToggleWorkflow<S> {
    pub fn new(storage: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            storage,
            notifier,
            locks: TagLocks::new(),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Process one scan: toggle a registered tag, or log an unknown one as absent.
    pub async fn process_scan(&self, raw_tag_id: &str) -> Result<ScanResult, WorkflowError> {
        let tag_id = validate_tag_id(raw_tag_id)?;
        // Held through publish so notifications leave in commit order.
        let _guard = self.locks.acquire(tag_id).await;
        let timestamp = now_timestamp();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let (previous_status, new_status) =
            match self.toggle(&mut snapshot, tag_id, &timestamp).await {
                Ok(statuses) => statuses,
                Err(e) => {
                    self.abort(snapshot).await;
                    return Err(e.into());
                }
            };
        self.storage.commit_snapshot(snapshot).await?;

        match previous_status {
            Some(previous) => info!("Tag {} toggled {} -> {}", tag_id, previous, new_status),
            None => info!("Tag {} not registered, logged as {}", tag_id, new_status),
        }

        let notified = self.notify(new_status).await;

        Ok(ScanResult {
            found: previous_status.is_some(),
            tag_id: tag_id.to_string(),
            previous_status,
            new_status,
            timestamp,
            notified,
        })
    }

    async fn toggle(
        &self,
        snapshot: &mut S::Snapshot,
        tag_id: &str,
        timestamp: &str,
    ) -> Result<(Option<TagStatus>, TagStatus), StorageError> {
        let previous = self
            .storage
            .lookup_status_for_update(snapshot, tag_id)
            .await?;

        let new_status = match previous {
            Some(current) => {
                let next = current.toggled();
                self.storage
                    .update_status(snapshot, tag_id, Some(current), next)
                    .await?;
                next
            }
            None => TagStatus::Absent,
        };

        self.storage
            .append_log(snapshot, log_entry(tag_id, new_status, timestamp))
            .await?;

        Ok((previous, new_status))
    }

    /// Write `new_status` without reading the current one, log it and publish it.
    ///
    /// An unregistered tag affects zero registry rows but is still logged and
    /// published.
    pub async fn set_status(
        &self,
        raw_tag_id: &str,
        new_status: TagStatus,
    ) -> Result<SetStatusOutcome, WorkflowError> {
        let tag_id = validate_tag_id(raw_tag_id)?;
        let _guard = self.locks.acquire(tag_id).await;
        let timestamp = now_timestamp();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let rows_affected = match self
            .write_direct(&mut snapshot, tag_id, new_status, &timestamp)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.abort(snapshot).await;
                return Err(e.into());
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        if rows_affected == 0 {
            warn!(
                "Status {} set on unregistered tag {}: logged, registry unchanged",
                new_status, tag_id
            );
        } else {
            info!("Tag {} set to {}", tag_id, new_status);
        }

        let notified = self.notify(new_status).await;

        Ok(SetStatusOutcome {
            tag_id: tag_id.to_string(),
            new_status,
            rows_affected,
            timestamp,
            notified,
        })
    }

    async fn write_direct(
        &self,
        snapshot: &mut S::Snapshot,
        tag_id: &str,
        new_status: TagStatus,
        timestamp: &str,
    ) -> Result<u64, StorageError> {
        let rows = self
            .storage
            .update_status(snapshot, tag_id, None, new_status)
            .await?;
        self.storage
            .append_log(snapshot, log_entry(tag_id, new_status, timestamp))
            .await?;
        Ok(rows)
    }

    /// Add a tag to the registry. No log entry, no notification.
    pub async fn register(
        &self,
        raw_tag_id: &str,
        status: TagStatus,
    ) -> Result<TagRecord, WorkflowError> {
        let tag_id = validate_tag_id(raw_tag_id)?;
        let _guard = self.locks.acquire(tag_id).await;

        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.register_tag(&mut snapshot, tag_id, status).await {
            self.abort(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;

        info!("Registered tag {} with status {}", tag_id, status);
        Ok(TagRecord {
            tag_id: tag_id.to_string(),
            status,
        })
    }

    /// Newest-first log entries (`limit` 0 = all).
    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntryRecord>, WorkflowError> {
        Ok(self.storage.list_recent_logs(limit).await?)
    }

    pub async fn tags(&self) -> Result<Vec<TagRecord>, WorkflowError> {
        Ok(self.storage.list_tags().await?)
    }

    /// Roll back after a failed step. The step's error is what the caller sees.
    async fn abort(&self, snapshot: S::Snapshot) {
        if let Err(e) = self.storage.abort_snapshot(snapshot).await {
            warn!("Rollback failed: {}", e);
        }
    }

    /// Publish `status`, logging failures. Returns whether it succeeded.
    async fn notify(&self, status: TagStatus) -> bool {
        let result = match tokio::time::timeout(self.notify_timeout, self.notifier.publish(status))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.notify_timeout)),
        };

        match result {
            Ok(()) => {
                debug!("Published status {}", status);
                true
            }
            Err(e) => {
                warn!("Status notification dropped: {}", e);
                false
            }
        }
    }
}

/// Trim the raw id; reject it if nothing is left.
fn validate_tag_id(raw: &str) -> Result<&str, WorkflowError> {
    let tag_id = raw.trim();
    if tag_id.is_empty() {
        return Err(WorkflowError::Validation(NO_TAG_MESSAGE.to_string()));
    }
    Ok(tag_id)
}

fn log_entry(tag_id: &str, status: TagStatus, timestamp: &str) -> NewLogEntry {
    NewLogEntry {
        timestamp: timestamp.to_string(),
        tag_id: tag_id.to_string(),
        status,
    }
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub fn now_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
