//! Item types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Content fingerprint identifying a request while it is live.
///
/// Sixteen lowercase hex characters, the truncated SHA-256 of the canonical
/// JSON form of the request descriptor. The hash itself is computed upstream;
/// this type only enforces the shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Create new request ID with validation
    pub fn new(value: String) -> Result<Self, ValidationError> {
        if value.len() != 16 {
            return Err(ValidationError::InvalidFormat {
                field: "request_id".to_string(),
                message: "must be exactly 16 characters".to_string(),
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ValidationError::InvalidFormat {
                field: "request_id".to_string(),
                message: "only lowercase hex characters allowed".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get request ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Scheduling priority for queued requests.
///
/// Lower numeric value wins; `Critical` items are always dequeued before
/// `Low` items regardless of enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

impl Priority {
    /// Get numeric value (1 = highest, 4 = lowest)
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Get uppercase name (e.g. for webhook payloads)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }

    /// One step lower priority, saturating at `Low`.
    ///
    /// Used when requeueing failed items so retries do not starve fresh work.
    pub fn demoted(&self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Normal,
            Self::Normal | Self::Low => Self::Low,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Normal),
            4 => Ok(Self::Low),
            _ => Err(ValidationError::OutOfRange {
                field: "priority".to_string(),
                message: "must be between 1 and 4".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(ValidationError::InvalidFormat {
                field: "priority".to_string(),
                message: "must be critical, high, normal, or low".to_string(),
            }),
        }
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds elapsed since this timestamp, zero if it lies in the future
    pub fn age_seconds(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.0);
        (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Unix seconds
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ============================================================================
// Queue Item Types
// ============================================================================

/// An item scheduled through the priority queue.
///
/// The payload type is opaque to the queue; callers store whatever they need
/// to process the item once it is handed back. Payloads must serialize so
/// queue snapshots can be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem<T> {
    pub id: RequestId,
    pub priority: Priority,
    pub enqueued_at: Timestamp,
    pub retry_count: u32,
    pub partition: Option<String>,
    pub payload: T,
}

impl<T> QueueItem<T> {
    /// Create a new item at the given priority
    pub fn new(id: RequestId, priority: Priority, payload: T) -> Self {
        Self {
            id,
            priority,
            enqueued_at: Timestamp::now(),
            retry_count: 0,
            partition: None,
            payload,
        }
    }

    /// Tag the item with a partition
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Age of the item in seconds
    pub fn age_seconds(&self) -> f64 {
        self.enqueued_at.age_seconds()
    }
}

/// An item that exhausted its retry budget, parked for inspection and replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry<T> {
    pub item: QueueItem<T>,
    pub reason: String,
    pub failed_at: Timestamp,
}

// ============================================================================
// Statistics Types
// ============================================================================

/// An in-flight item visible through [`QueueStats`]
#[derive(Debug, Clone, Serialize)]
pub struct InFlightItem {
    pub id: RequestId,
    pub duration_seconds: f64,
}

/// Point-in-time queue statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_failed: u64,
    pub total_expired: u64,
    pub current_size: usize,
    pub dlq_size: usize,
    pub in_flight_count: usize,
    pub in_flight_items: Vec<InFlightItem>,
    pub partitions: std::collections::HashMap<String, usize>,
    pub oldest_item_age_seconds: Option<f64>,
}

/// Monotonic counters persisted alongside the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCounters {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_failed: u64,
    pub total_expired: u64,
}

/// Detailed queue metrics for monitoring exports
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub size: usize,
    pub capacity_used: f64,
    pub priority_distribution: std::collections::HashMap<u8, usize>,
    pub age_distribution: AgeDistribution,
    pub dlq_size: usize,
    pub in_flight_count: usize,
    pub throughput: QueueCounters,
    pub partitions: std::collections::HashMap<String, PartitionMetrics>,
}

/// Queue age histogram with fixed buckets
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgeDistribution {
    pub under_1m: usize,
    pub from_1m_to_5m: usize,
    pub from_5m_to_30m: usize,
    pub over_30m: usize,
}

/// Per-partition occupancy and limit
#[derive(Debug, Clone, Serialize)]
pub struct PartitionMetrics {
    pub size: usize,
    pub limit: Option<usize>,
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
