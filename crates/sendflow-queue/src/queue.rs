//! Priority queue with partitions, dead-lettering, and optional persistence.
//!
//! This module provides the scheduling heart of sendflow:
//! - Priority-ordered dequeue with FIFO ties within a priority level
//! - Named partitions with independent occupancy limits
//! - Bounded dead letter queue with replay
//! - Item expiry so stale work is never delivered
//! - Best-effort snapshot persistence with atomic file replacement
//!
//! All operations are mutually exclusive under a single internal lock. The
//! lock is never held across file I/O; snapshots are encoded under the lock
//! and written after it is released.

use crate::error::QueueError;
use crate::item::{
    AgeDistribution, DeadLetterEntry, InFlightItem, PartitionMetrics, Priority, QueueCounters,
    QueueItem, QueueMetrics, QueueStats, RequestId, Timestamp,
};
use crate::persistence::{self, QueueSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Items older than this are counted as expired instead of delivered
pub const DEFAULT_EXPIRY_SECONDS: f64 = 3600.0;

/// Default bound on the dead letter queue
pub const DEFAULT_DLQ_CAPACITY: usize = 100;

/// Requeue attempts beyond this promote the item to the DLQ
pub const MAX_RETRIES: u32 = 3;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Heap ordering key: priority first, then admission order within a priority.
///
/// Sequence numbers are assigned monotonically on every push, so comparing
/// them yields FIFO order among equal priorities.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapEntry {
    priority: u8,
    seq: u64,
    id: RequestId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue state protected by the single queue lock.
///
/// The item map is the source of truth; heap entries whose id is no longer
/// in the map are stale and skipped on pop. Rebuilds after removals keep the
/// heap from accumulating stale entries.
struct QueueState<T> {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    items: HashMap<RequestId, QueueItem<T>>,
    in_flight: HashMap<RequestId, Timestamp>,
    dlq: VecDeque<DeadLetterEntry<T>>,
    partition_counts: HashMap<String, usize>,
    partition_limits: HashMap<String, usize>,
    counters: QueueCounters,
    next_seq: u64,
}

impl<T> QueueState<T> {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            items: HashMap::new(),
            in_flight: HashMap::new(),
            dlq: VecDeque::new(),
            partition_counts: HashMap::new(),
            partition_limits: HashMap::new(),
            counters: QueueCounters::default(),
            next_seq: 0,
        }
    }

    fn decrement_partition(&mut self, partition: &Option<String>) {
        if let Some(name) = partition {
            if let Some(count) = self.partition_counts.get_mut(name) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Drop heap entries whose item is gone. O(n), acceptable for removals.
    fn rebuild_heap(&mut self) {
        let live: Vec<Reverse<HeapEntry>> = self
            .heap
            .drain()
            .filter(|Reverse(entry)| self.items.contains_key(&entry.id))
            .collect();
        self.heap = live.into_iter().collect();
    }

    /// Heap entries in dequeue order, stale entries filtered out
    fn ordered_entries(&self) -> Vec<HeapEntry> {
        let mut entries: Vec<HeapEntry> = self
            .heap
            .iter()
            .map(|Reverse(entry)| entry.clone())
            .filter(|entry| self.items.contains_key(&entry.id))
            .collect();
        entries.sort();
        entries
    }
}

// ============================================================================
// RequestQueue
// ============================================================================

/// Priority request queue with partitions, DLQ, and optional persistence.
///
/// Generic over the payload carried by each item. Payloads must serialize so
/// snapshots can be written; they are never inspected by the queue itself.
pub struct RequestQueue<T> {
    max_size: usize,
    dlq_capacity: usize,
    expiry_seconds: f64,
    persist_path: Option<PathBuf>,
    state: Mutex<QueueState<T>>,
}

impl<T> RequestQueue<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a new in-memory queue with the given capacity
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            dlq_capacity: DEFAULT_DLQ_CAPACITY,
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
            persist_path: None,
            state: Mutex::new(QueueState::new()),
        }
    }

    /// Override the dead letter queue bound
    pub fn with_dlq_capacity(mut self, capacity: usize) -> Self {
        self.dlq_capacity = capacity;
        self
    }

    /// Override the item expiry horizon
    pub fn with_expiry_seconds(mut self, seconds: f64) -> Self {
        self.expiry_seconds = seconds;
        self
    }

    /// Enable snapshot persistence and restore any existing snapshot.
    ///
    /// A missing or unreadable snapshot file starts the queue empty; load
    /// failures are logged, never fatal.
    pub async fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match persistence::load::<T>(&path).await {
            Ok(Some(snapshot)) => {
                let restored = snapshot.items.len();
                self.restore(snapshot);
                info!(items = restored, path = %path.display(), "Restored queue snapshot");
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, path = %path.display(), "Failed to load queue snapshot");
            }
        }
        self.persist_path = Some(path);
        self
    }

    fn restore(&mut self, snapshot: QueueSnapshot<T>) {
        let state = self.state.get_mut().unwrap();
        state.counters = snapshot.counters;
        state.partition_limits = snapshot.partition_limits;
        state.dlq = snapshot.dlq.into();

        // Snapshot items are stored in dequeue order; reassigning sequence
        // numbers in that order preserves FIFO semantics across restarts.
        for item in snapshot.items {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Reverse(HeapEntry {
                priority: item.priority.as_u8(),
                seq,
                id: item.id.clone(),
            }));
            if let Some(name) = &item.partition {
                *state.partition_counts.entry(name.clone()).or_insert(0) += 1;
            }
            state.items.insert(item.id.clone(), item);
        }
    }

    /// Add an item to the queue.
    ///
    /// When the queue is at capacity an expiry sweep runs first; the add
    /// fails with [`QueueError::QueueFull`] only if the sweep frees nothing.
    /// Partitioned items are additionally checked against their partition
    /// limit. The enqueue timestamp is stamped on admission.
    ///
    /// # Errors
    ///
    /// [`QueueError::QueueFull`] or [`QueueError::PartitionFull`].
    pub async fn add(&self, item: QueueItem<T>) -> Result<(), QueueError> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            self.add_locked(&mut state, item)?;
            self.encode_snapshot(&state)
        };
        self.write_snapshot(snapshot).await;
        Ok(())
    }

    fn add_locked(&self, state: &mut QueueState<T>, mut item: QueueItem<T>) -> Result<(), QueueError> {
        if state.items.len() >= self.max_size {
            let swept = self.sweep_expired_locked(state);
            if swept > 0 {
                info!(swept, "Expiry sweep freed queue capacity");
            }
            if state.items.len() >= self.max_size {
                return Err(QueueError::QueueFull {
                    capacity: self.max_size,
                });
            }
        }

        if let Some(name) = &item.partition {
            if let Some(&limit) = state.partition_limits.get(name) {
                let occupancy = state.partition_counts.get(name).copied().unwrap_or(0);
                if occupancy >= limit {
                    return Err(QueueError::PartitionFull {
                        partition: name.clone(),
                        limit,
                    });
                }
            }
        }

        // Re-submission of a live id replaces the earlier entry
        if let Some(previous) = state.items.remove(&item.id) {
            state.decrement_partition(&previous.partition);
            state.rebuild_heap();
        }

        item.enqueued_at = Timestamp::now();

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse(HeapEntry {
            priority: item.priority.as_u8(),
            seq,
            id: item.id.clone(),
        }));
        if let Some(name) = &item.partition {
            *state.partition_counts.entry(name.clone()).or_insert(0) += 1;
        }
        state.items.insert(item.id.clone(), item);
        state.counters.total_enqueued += 1;
        Ok(())
    }

    /// Pop the highest-priority eligible item, expiring stale items on the way.
    ///
    /// With a partition, the best item carrying that tag is selected instead
    /// of the global top. The returned item is tracked as in-flight until
    /// [`complete`](Self::complete) or [`requeue`](Self::requeue) is called.
    pub async fn get(&self, partition: Option<&str>) -> Option<QueueItem<T>> {
        let (result, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let result = self.get_locked(&mut state, partition);
            let snapshot = if result.is_some() {
                self.encode_snapshot(&state)
            } else {
                None
            };
            (result, snapshot)
        };
        self.write_snapshot(snapshot).await;
        result
    }

    fn get_locked(&self, state: &mut QueueState<T>, partition: Option<&str>) -> Option<QueueItem<T>> {
        loop {
            let entry = match partition {
                None => match state.heap.pop() {
                    Some(Reverse(entry)) => entry,
                    None => return None,
                },
                Some(name) => {
                    let best = state
                        .heap
                        .iter()
                        .map(|Reverse(entry)| entry)
                        .filter(|entry| {
                            state
                                .items
                                .get(&entry.id)
                                .map_or(false, |item| item.partition.as_deref() == Some(name))
                        })
                        .min()
                        .cloned();
                    match best {
                        Some(entry) => {
                            // Pull the chosen entry out of the heap
                            let remaining: Vec<Reverse<HeapEntry>> = state
                                .heap
                                .drain()
                                .filter(|Reverse(candidate)| candidate.id != entry.id)
                                .collect();
                            state.heap = remaining.into_iter().collect();
                            entry
                        }
                        None => return None,
                    }
                }
            };

            // Stale entry left behind by a removal; the map is authoritative
            let item = match state.items.remove(&entry.id) {
                Some(item) => item,
                None => continue,
            };
            state.decrement_partition(&item.partition);

            if item.age_seconds() > self.expiry_seconds {
                state.counters.total_expired += 1;
                continue;
            }

            state.in_flight.insert(item.id.clone(), Timestamp::now());
            state.counters.total_dequeued += 1;
            return Some(item);
        }
    }

    /// Return the `n` next items in dequeue order without removing them
    pub fn peek(&self, n: usize) -> Vec<QueueItem<T>> {
        let state = self.state.lock().unwrap();
        state
            .ordered_entries()
            .into_iter()
            .take(n)
            .filter_map(|entry| state.items.get(&entry.id).cloned())
            .collect()
    }

    /// Remove a specific item from every structure.
    ///
    /// Returns `false` when the id is neither queued nor in-flight.
    pub async fn remove(&self, item_id: &RequestId) -> bool {
        let (removed, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let queued = state.items.remove(item_id);
            if let Some(item) = &queued {
                state.decrement_partition(&item.partition);
                state.rebuild_heap();
            }
            let was_in_flight = state.in_flight.remove(item_id).is_some();
            let removed = queued.is_some() || was_in_flight;
            let snapshot = if removed {
                self.encode_snapshot(&state)
            } else {
                None
            };
            (removed, snapshot)
        };
        self.write_snapshot(snapshot).await;
        removed
    }

    /// Mark an in-flight item as finished.
    ///
    /// Returns `false` if the item was not tracked as in-flight.
    pub fn complete(&self, item_id: &RequestId) -> bool {
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(item_id).is_some()
    }

    /// Return a failed item to the queue at demoted priority.
    ///
    /// After [`MAX_RETRIES`] requeues the item is promoted to the dead letter
    /// queue instead, with a reason prefixed `Max retries exceeded`.
    ///
    /// # Errors
    ///
    /// Propagates capacity errors from the underlying re-add.
    pub async fn requeue(&self, mut item: QueueItem<T>, reason: &str) -> Result<(), QueueError> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.in_flight.remove(&item.id);
            item.retry_count += 1;

            if item.retry_count > MAX_RETRIES {
                warn!(item_id = %item.id, reason, "Item moved to DLQ");
                self.push_dlq_locked(
                    &mut state,
                    item,
                    format!("Max retries exceeded: {}", reason),
                );
            } else {
                item.priority = item.priority.demoted();
                self.add_locked(&mut state, item)?;
            }
            self.encode_snapshot(&state)
        };
        self.write_snapshot(snapshot).await;
        Ok(())
    }

    /// Park an item on the dead letter queue with a reason
    pub async fn add_to_dlq(&self, item: QueueItem<T>, reason: impl Into<String>) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.in_flight.remove(&item.id);
            self.push_dlq_locked(&mut state, item, reason.into());
            self.encode_snapshot(&state)
        };
        self.write_snapshot(snapshot).await;
    }

    fn push_dlq_locked(&self, state: &mut QueueState<T>, item: QueueItem<T>, reason: String) {
        if state.dlq.len() >= self.dlq_capacity {
            state.dlq.pop_front();
        }
        state.dlq.push_back(DeadLetterEntry {
            item,
            reason,
            failed_at: Timestamp::now(),
        });
        state.counters.total_failed += 1;
    }

    /// Copy of the dead letter queue, oldest first
    pub fn dlq_entries(&self) -> Vec<DeadLetterEntry<T>> {
        let state = self.state.lock().unwrap();
        state.dlq.iter().cloned().collect()
    }

    /// Re-admit a dead-lettered item at normal priority with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// [`QueueError::DlqIndexOutOfRange`] for a bad index; capacity errors
    /// from the re-add.
    pub async fn replay_dlq(&self, index: usize) -> Result<RequestId, QueueError> {
        let (id, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let size = state.dlq.len();
            let entry = state
                .dlq
                .remove(index)
                .ok_or(QueueError::DlqIndexOutOfRange { index, size })?;

            let mut item = entry.item;
            item.retry_count = 0;
            item.priority = Priority::Normal;
            let id = item.id.clone();
            self.add_locked(&mut state, item)?;
            (id, self.encode_snapshot(&state))
        };
        self.write_snapshot(snapshot).await;
        Ok(id)
    }

    /// Number of queued items
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    /// Occupancy of a single partition
    pub fn partition_size(&self, partition: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .partition_counts
            .get(partition)
            .copied()
            .unwrap_or(0)
    }

    /// Number of dead-lettered items
    pub fn dlq_size(&self) -> usize {
        self.state.lock().unwrap().dlq.len()
    }

    /// Cap the number of simultaneously queued items for a partition
    pub fn set_partition_limit(&self, partition: impl Into<String>, limit: usize) {
        let mut state = self.state.lock().unwrap();
        state.partition_limits.insert(partition.into(), limit);
    }

    /// Point-in-time statistics snapshot
    pub fn get_stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        let in_flight_items: Vec<InFlightItem> = state
            .in_flight
            .iter()
            .map(|(id, started)| InFlightItem {
                id: id.clone(),
                duration_seconds: started.age_seconds(),
            })
            .collect();

        let oldest_item_age_seconds = state
            .items
            .values()
            .map(|item| item.age_seconds())
            .fold(None, |oldest: Option<f64>, age| {
                Some(oldest.map_or(age, |o| o.max(age)))
            });

        QueueStats {
            total_enqueued: state.counters.total_enqueued,
            total_dequeued: state.counters.total_dequeued,
            total_failed: state.counters.total_failed,
            total_expired: state.counters.total_expired,
            current_size: state.items.len(),
            dlq_size: state.dlq.len(),
            in_flight_count: state.in_flight.len(),
            in_flight_items,
            partitions: state.partition_counts.clone(),
            oldest_item_age_seconds,
        }
    }

    /// Detailed metrics for monitoring exports
    pub fn export_metrics(&self) -> QueueMetrics {
        let state = self.state.lock().unwrap();

        let mut priority_distribution: HashMap<u8, usize> = HashMap::new();
        let mut age_distribution = AgeDistribution::default();
        for item in state.items.values() {
            *priority_distribution
                .entry(item.priority.as_u8())
                .or_insert(0) += 1;

            let age = item.age_seconds();
            if age < 60.0 {
                age_distribution.under_1m += 1;
            } else if age < 300.0 {
                age_distribution.from_1m_to_5m += 1;
            } else if age < 1800.0 {
                age_distribution.from_5m_to_30m += 1;
            } else {
                age_distribution.over_30m += 1;
            }
        }

        let partitions = state
            .partition_counts
            .iter()
            .map(|(name, &size)| {
                (
                    name.clone(),
                    PartitionMetrics {
                        size,
                        limit: state.partition_limits.get(name).copied(),
                    },
                )
            })
            .collect();

        QueueMetrics {
            size: state.items.len(),
            capacity_used: state.items.len() as f64 / self.max_size as f64,
            priority_distribution,
            age_distribution,
            dlq_size: state.dlq.len(),
            in_flight_count: state.in_flight.len(),
            throughput: state.counters.clone(),
            partitions,
        }
    }

    /// Drop every queued and in-flight item. Counters and the DLQ survive.
    pub async fn clear(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.heap.clear();
            state.items.clear();
            state.in_flight.clear();
            state.partition_counts.clear();
            self.encode_snapshot(&state)
        };
        self.write_snapshot(snapshot).await;
    }

    fn sweep_expired_locked(&self, state: &mut QueueState<T>) -> usize {
        let expired: Vec<RequestId> = state
            .items
            .iter()
            .filter(|(_, item)| item.age_seconds() > self.expiry_seconds)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(item) = state.items.remove(id) {
                state.decrement_partition(&item.partition);
                state.counters.total_expired += 1;
            }
        }
        if !expired.is_empty() {
            state.rebuild_heap();
        }
        expired.len()
    }

    /// Encode a persistence snapshot under the lock, or `None` when disabled
    /// or when encoding fails (logged).
    fn encode_snapshot(&self, state: &QueueState<T>) -> Option<Vec<u8>> {
        self.persist_path.as_ref()?;

        let items: Vec<QueueItem<T>> = state
            .ordered_entries()
            .into_iter()
            .filter_map(|entry| state.items.get(&entry.id).cloned())
            .collect();
        let snapshot = QueueSnapshot {
            items,
            dlq: state.dlq.iter().cloned().collect(),
            counters: state.counters.clone(),
            partition_limits: state.partition_limits.clone(),
        };

        match persistence::encode(&snapshot) {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                warn!(%error, "Failed to encode queue snapshot");
                None
            }
        }
    }

    async fn write_snapshot(&self, bytes: Option<Vec<u8>>) {
        let (Some(path), Some(bytes)) = (self.persist_path.as_ref(), bytes) else {
            return;
        };
        if let Err(error) = persistence::write_atomic(path, bytes).await {
            warn!(%error, path = %path.display(), "Failed to persist queue snapshot");
        }
    }
}
