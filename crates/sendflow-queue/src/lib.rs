//! # sendflow-queue
//!
//! Priority queue runtime for the sendflow request orchestrator.
//!
//! This crate provides the scheduling substrate the orchestrator drains:
//! a priority heap with FIFO ordering inside each priority level, named
//! partitions with independent occupancy limits, a bounded dead letter
//! queue with replay, item expiry, and optional snapshot persistence with
//! atomic file replacement.
//!
//! ## Usage
//!
//! ```rust
//! use sendflow_queue::{Priority, QueueItem, RequestId, RequestQueue};
//!
//! # async fn example() {
//! let queue: RequestQueue<String> = RequestQueue::new(1000);
//! let id = RequestId::new("0123456789abcdef".to_string()).unwrap();
//! queue
//!     .add(QueueItem::new(id, Priority::High, "payload".to_string()))
//!     .await
//!     .unwrap();
//! let item = queue.get(None).await.unwrap();
//! assert_eq!(item.payload, "payload");
//! # }
//! ```

/// Item, identifier, and statistics types
pub mod item;

/// Error types for queue operations
pub mod error;

/// The priority queue itself
pub mod queue;

/// Snapshot persistence
pub mod persistence;

pub use error::{PersistenceError, QueueError, ValidationError};
pub use item::{
    AgeDistribution, DeadLetterEntry, InFlightItem, PartitionMetrics, Priority, QueueCounters,
    QueueItem, QueueMetrics, QueueStats, RequestId, Timestamp,
};
pub use queue::{RequestQueue, DEFAULT_DLQ_CAPACITY, DEFAULT_EXPIRY_SECONDS, MAX_RETRIES};
