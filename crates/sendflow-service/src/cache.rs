//! Response cache keyed by request fingerprint.
//!
//! Because the fingerprint is deterministic in the descriptor, identical
//! descriptors within the TTL window resolve to the same cached response
//! without a transport call.

use sendflow_core::transport::TransportResult;
use sendflow_core::RequestId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

struct CacheEntry {
    result: TransportResult,
    inserted_at: Instant,
}

/// TTL-bounded response cache shared by the orchestrator and its workers
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<RequestId, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh cached result for a fingerprint, if any.
    ///
    /// Expired entries are left in place for the sweeper.
    pub fn get(&self, id: &RequestId) -> Option<TransportResult> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(id)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    /// Store the latest result for a fingerprint
    pub fn insert(&self, id: RequestId, result: TransportResult) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            id,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Number of entries, expired included
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
