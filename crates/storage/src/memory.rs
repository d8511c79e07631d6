//! In-memory `GateStorage` backend.
//!
//! Snapshots are serialized by a single writer lock, mirroring SQLite's
//! one-writer model. Writes are buffered in the snapshot and applied on
//! commit, so readers outside a snapshot only ever see committed data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::record::{LogEntryRecord, NewLogEntry, TagRecord, TagStatus};
use crate::traits::GateStorage;

#[derive(Default)]
struct Committed {
    tags: BTreeMap<String, TagStatus>,
    logs: Vec<LogEntryRecord>,
}

/// Volatile storage backend. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    writer: Arc<tokio::sync::Mutex<()>>,
    committed: Arc<Mutex<Committed>>,
}

/// An open memory transaction. Holds the writer lock until consumed or dropped.
pub struct MemorySnapshot {
    _writer: OwnedMutexGuard<()>,
    tags: BTreeMap<String, TagStatus>,
    logs: Vec<LogEntryRecord>,
    next_log_id: i64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with registered tags.
    pub fn with_tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = (T, TagStatus)>,
        T: Into<String>,
    {
        let storage = Self::new();
        if let Ok(mut committed) = storage.committed.lock() {
            committed.tags = tags.into_iter().map(|(id, s)| (id.into(), s)).collect();
        }
        storage
    }

    fn committed(&self) -> Result<MutexGuard<'_, Committed>, StorageError> {
        self.committed
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    fn current_status(
        &self,
        snapshot: &MemorySnapshot,
        tag_id: &str,
    ) -> Result<Option<TagStatus>, StorageError> {
        if let Some(status) = snapshot.tags.get(tag_id) {
            return Ok(Some(*status));
        }
        Ok(self.committed()?.tags.get(tag_id).copied())
    }
}

#[async_trait]
impl GateStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        let next_log_id = self.committed()?.logs.last().map_or(1, |e| e.id + 1);
        Ok(MemorySnapshot {
            _writer: writer,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            next_log_id,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut committed = self.committed()?;
        committed.tags.extend(snapshot.tags);
        committed.logs.extend(snapshot.logs);
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn register_tag(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
        status: TagStatus,
    ) -> Result<(), StorageError> {
        if self.current_status(snapshot, tag_id)?.is_some() {
            return Err(StorageError::AlreadyRegistered {
                tag_id: tag_id.to_string(),
            });
        }
        snapshot.tags.insert(tag_id.to_string(), status);
        Ok(())
    }

    async fn lookup_status_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
    ) -> Result<Option<TagStatus>, StorageError> {
        self.current_status(snapshot, tag_id)
    }

    async fn update_status(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
        expected: Option<TagStatus>,
        new_status: TagStatus,
    ) -> Result<u64, StorageError> {
        let current = match self.current_status(snapshot, tag_id)? {
            Some(s) => s,
            None => return Ok(0),
        };
        if expected.is_some_and(|e| e != current) {
            return Err(StorageError::ConcurrentConflict {
                tag_id: tag_id.to_string(),
            });
        }
        snapshot.tags.insert(tag_id.to_string(), new_status);
        Ok(1)
    }

    async fn append_log(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: NewLogEntry,
    ) -> Result<LogEntryRecord, StorageError> {
        let record = LogEntryRecord::from_new(snapshot.next_log_id, entry);
        snapshot.next_log_id += 1;
        snapshot.logs.push(record.clone());
        Ok(record)
    }

    async fn get_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, StorageError> {
        Ok(self.committed()?.tags.get(tag_id).map(|status| TagRecord {
            tag_id: tag_id.to_string(),
            status: *status,
        }))
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, StorageError> {
        Ok(self
            .committed()?
            .tags
            .iter()
            .map(|(tag_id, status)| TagRecord {
                tag_id: tag_id.clone(),
                status: *status,
            })
            .collect())
    }

    async fn list_recent_logs(&self, limit: usize) -> Result<Vec<LogEntryRecord>, StorageError> {
        let committed = self.committed()?;
        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(committed.logs.iter().rev().take(take).cloned().collect())
    }
}
