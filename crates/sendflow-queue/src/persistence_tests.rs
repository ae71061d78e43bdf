//! Tests for queue snapshot persistence.

use super::*;
use crate::error::QueueError;
use crate::item::{Priority, QueueItem, RequestId};
use crate::queue::RequestQueue;

fn id(tag: u8) -> RequestId {
    RequestId::new(format!("{:016x}", tag as u64)).unwrap()
}

#[tokio::test]
async fn test_write_atomic_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    let snapshot: QueueSnapshot<String> = QueueSnapshot {
        items: vec![],
        dlq: vec![],
        counters: QueueCounters::default(),
        partition_limits: HashMap::new(),
    };
    let bytes = encode(&snapshot).unwrap();
    write_atomic(&path, bytes).await.unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_load_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let loaded = load::<String>(&path).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_load_rejects_corrupt_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    tokio::fs::write(&path, b"not json").await.unwrap();

    assert!(load::<String>(&path).await.is_err());
}

/// Snapshotting and reloading yields the same items in the same dequeue order.
#[tokio::test]
async fn test_queue_round_trips_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    {
        let queue: RequestQueue<String> = RequestQueue::new(10)
            .with_persistence(&path)
            .await;
        queue
            .add(QueueItem::new(id(1), Priority::Low, "a".to_string()))
            .await
            .unwrap();
        queue
            .add(QueueItem::new(id(2), Priority::Critical, "b".to_string()))
            .await
            .unwrap();
        queue
            .add(QueueItem::new(id(3), Priority::Critical, "c".to_string()))
            .await
            .unwrap();
        queue
            .add_to_dlq(
                QueueItem::new(id(4), Priority::Normal, "d".to_string()),
                "poison payload",
            )
            .await;
    }

    let restored: RequestQueue<String> = RequestQueue::new(10).with_persistence(&path).await;

    assert_eq!(restored.size(), 3);
    assert_eq!(restored.dlq_size(), 1);
    assert_eq!(restored.get_stats().total_enqueued, 3);

    // FIFO among the two criticals survives the reload
    assert_eq!(restored.get(None).await.unwrap().id, id(2));
    assert_eq!(restored.get(None).await.unwrap().id, id(3));
    assert_eq!(restored.get(None).await.unwrap().id, id(1));
}

/// Partition limits persist so a restart cannot overfill a partition.
#[tokio::test]
async fn test_partition_limits_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    {
        let queue: RequestQueue<String> = RequestQueue::new(10).with_persistence(&path).await;
        queue.set_partition_limit("api", 1);
        queue
            .add(
                QueueItem::new(id(1), Priority::Normal, "a".to_string()).with_partition("api"),
            )
            .await
            .unwrap();
    }

    let restored: RequestQueue<String> = RequestQueue::new(10).with_persistence(&path).await;
    assert_eq!(restored.partition_size("api"), 1);
    let error = restored
        .add(QueueItem::new(id(2), Priority::Normal, "b".to_string()).with_partition("api"))
        .await
        .unwrap_err();
    assert!(matches!(error, QueueError::PartitionFull { .. }));
}
