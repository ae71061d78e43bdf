//! Error types for queue operations.

use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },

    #[error("Partition '{partition}' is full (limit: {limit})")]
    PartitionFull { partition: String, limit: usize },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("Dead letter index {index} out of range (size: {size})")]
    DlqIndexOutOfRange { index: usize, size: usize },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if the operation may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueFull { .. } => true,
            Self::PartitionFull { .. } => true,
            Self::ItemNotFound { .. } => false,
            Self::DlqIndexOutOfRange { .. } => false,
            Self::Persistence(_) => true,
            Self::Validation(_) => false,
        }
    }
}

/// Errors while snapshotting or restoring queue state
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for input validation failures
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' is out of range: {message}")]
    OutOfRange { field: String, message: String },
}
