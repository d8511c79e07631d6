//! Per-tag async locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Prune idle entries once the map grows past this many tags.
const PRUNE_THRESHOLD: usize = 1024;

/// Serializes work per tag id while letting different tags run in parallel.
///
/// Entries are created on demand and dropped again once no task holds or
/// waits on them.
#[derive(Default)]
pub struct TagLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TagLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `tag_id`. Released when the guard drops.
    pub async fn acquire(&self, tag_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle entry.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(tag_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tags with a lock entry.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
