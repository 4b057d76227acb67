//! Error types for the offline operation queue

use thiserror::Error;

/// Main error type for queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// No handlers are registered for the requested category
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// The category is known but the operation name is not registered under it
    #[error("Unknown operation: {category}/{operation}")]
    UnknownOperation {
        /// The category that was resolved
        category: String,
        /// The operation name that failed to resolve
        operation: String,
    },

    /// The business operation itself failed (network failure, server
    /// rejection, validation failure). Retryable up to the attempt ceiling.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization of persisted queues
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// Whether this error came from the durable store rather than from an
    /// item's own execution. Persistence failures never count against an
    /// item's attempt ceiling.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            QueueError::Database(_)
                | QueueError::Transaction(_)
                | QueueError::Table(_)
                | QueueError::StorageOp(_)
                | QueueError::Commit(_)
                | QueueError::Serialization(_)
                | QueueError::Io(_)
        )
    }
}

/// Result type alias using QueueError
pub type QueueResult<T> = Result<T, QueueError>;
