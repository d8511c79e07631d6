/// All errors that can be returned by a GateStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Compare-and-swap conflict: the registry row no longer holds the
    /// status the caller read, or another writer holds the row.
    #[error("concurrent conflict on tag {tag_id}")]
    ConcurrentConflict { tag_id: String },

    /// A tag with this identifier is already in the registry.
    #[error("tag already registered: {tag_id}")]
    AlreadyRegistered { tag_id: String },

    /// A backend-specific storage error (connection, query, decoding, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
