use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{LogEntryRecord, NewLogEntry, TagRecord, TagStatus};

/// The storage trait for rfidgate backends.
///
/// A `GateStorage` implementation provides the two persistent tables the
/// gate needs: the tag registry (one row per tag, holding its current
/// status) and the append-only scan log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back.
///
/// ## Compare-and-swap
///
/// `update_status` with `expected = Some(s)` only writes when the row still
/// holds `s`. If the row exists with another status the method returns
/// `Err(StorageError::ConcurrentConflict { .. })`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait GateStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Registry operations (within snapshot) ────────────────────────────────

    /// Add a tag to the registry with the given initial status.
    ///
    /// Returns `Err(StorageError::AlreadyRegistered)` if the tag exists.
    async fn register_tag(
        &self,
        snapshot: &mut Self::Snapshot,
        tag_id: &str,
        status: TagStatus,
    ) -> Result<(), StorageError>;

    /// Read a tag's current status, holding it against concurrent writers
    /// until the snapshot ends. `None` if the tag is not registered.
    async fn lookup_status_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        tag_id: &str,
    ) -> Result<Option<TagStatus>, StorageError>;

    /// Write a tag's status and return the number of rows affected.
    ///
    /// A tag that is not registered affects zero rows and is not an error.
    /// With `expected = Some(s)`, a registered tag whose status differs
    /// from `s` yields `Err(StorageError::ConcurrentConflict)`.
    async fn update_status(
        &self,
        snapshot: &mut Self::Snapshot,
        tag_id: &str,
        expected: Option<TagStatus>,
        new_status: TagStatus,
    ) -> Result<u64, StorageError>;

    // ── Log operations (within snapshot) ─────────────────────────────────────

    /// Append a log entry and return it with its assigned id.
    async fn append_log(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: NewLogEntry,
    ) -> Result<LogEntryRecord, StorageError>;

    // ── Query operations (outside snapshot) ──────────────────────────────────

    /// Read a registered tag without locking.
    async fn get_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, StorageError>;

    /// List all registered tags ordered by tag id.
    async fn list_tags(&self) -> Result<Vec<TagRecord>, StorageError>;

    /// List log entries newest first (by append order).
    ///
    /// - `limit`: maximum number of results (0 = no limit)
    async fn list_recent_logs(&self, limit: usize) -> Result<Vec<LogEntryRecord>, StorageError>;
}
