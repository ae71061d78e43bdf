//! Snapshot persistence for queue state.
//!
//! Snapshots are JSON documents containing the queued items (in dequeue
//! order), the dead letter queue, the throughput counters, and the partition
//! limits. Writes go to a sibling `.tmp` file which is then atomically
//! renamed over the target, so a reader never observes a partial snapshot.

use crate::error::PersistenceError;
use crate::item::{DeadLetterEntry, QueueCounters, QueueItem};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;

/// Serialized form of the queue state
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct QueueSnapshot<T> {
    pub items: Vec<QueueItem<T>>,
    pub dlq: Vec<DeadLetterEntry<T>>,
    pub counters: QueueCounters,
    pub partition_limits: HashMap<String, usize>,
}

/// Encode a snapshot to JSON bytes
pub fn encode<T: Serialize>(snapshot: &QueueSnapshot<T>) -> Result<Vec<u8>, PersistenceError> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Write snapshot bytes with the temp-file-then-rename discipline
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
    }

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|source| PersistenceError::Io {
            path: temp_path.display().to_string(),
            source,
        })?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Load a snapshot, returning `None` when no snapshot file exists
pub async fn load<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<QueueSnapshot<T>>, PersistenceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let snapshot = serde_json::from_slice(&bytes)?;
    Ok(Some(snapshot))
}
