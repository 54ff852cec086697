//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Node not found in the entity index.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// Node already exists (duplicate create).
    #[error("node already exists: {node_id}")]
    NodeAlreadyExists { node_id: String },

    /// A single-key optimistic write was discarded because the key changed
    /// underneath it. The only retryable storage error.
    #[error("concurrent operation on the same resource: {key}")]
    ConcurrentModification { key: String },

    /// Malformed pagination cursor.
    #[error("invalid cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Query exceeded its timeout.
    #[error("query timeout after {timeout:?} in operation '{operation}'")]
    QueryTimeout {
        operation: String,
        timeout: std::time::Duration,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    Internal { message: String },
}

impl StorageError {
    /// Whether the operation that produced this error may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
