//! Tests for the priority request queue.

use super::*;
use crate::item::{Priority, QueueItem, RequestId};

fn id(tag: u8) -> RequestId {
    RequestId::new(format!("{:016x}", tag as u64)).unwrap()
}

fn item(tag: u8, priority: Priority) -> QueueItem<String> {
    QueueItem::new(id(tag), priority, format!("payload-{}", tag))
}

// ============================================================================
// Ordering Tests
// ============================================================================

mod ordering {
    use super::*;

    /// Higher priority (lower numeric value) wins regardless of enqueue order.
    #[tokio::test]
    async fn test_priority_dominance() {
        let queue: RequestQueue<String> = RequestQueue::new(10);

        queue.add(item(1, Priority::Low)).await.unwrap();
        queue.add(item(2, Priority::Critical)).await.unwrap();
        queue.add(item(3, Priority::Normal)).await.unwrap();

        assert_eq!(queue.get(None).await.unwrap().id, id(2));
        assert_eq!(queue.get(None).await.unwrap().id, id(3));
        assert_eq!(queue.get(None).await.unwrap().id, id(1));
        assert!(queue.get(None).await.is_none());
    }

    /// Within a priority level, dequeue order equals enqueue order.
    #[tokio::test]
    async fn test_fifo_within_priority() {
        let queue: RequestQueue<String> = RequestQueue::new(10);

        for tag in 1..=5 {
            queue.add(item(tag, Priority::Normal)).await.unwrap();
        }

        for tag in 1..=5 {
            assert_eq!(queue.get(None).await.unwrap().id, id(tag));
        }
    }

    #[tokio::test]
    async fn test_peek_does_not_remove() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Low)).await.unwrap();
        queue.add(item(2, Priority::High)).await.unwrap();

        let peeked = queue.peek(2);
        assert_eq!(peeked.len(), 2);
        assert_eq!(peeked[0].id, id(2));
        assert_eq!(peeked[1].id, id(1));
        assert_eq!(queue.size(), 2);
    }
}

// ============================================================================
// Capacity and Expiry Tests
// ============================================================================

mod capacity {
    use super::*;

    #[tokio::test]
    async fn test_queue_full_is_reported() {
        let queue: RequestQueue<String> = RequestQueue::new(2);
        queue.add(item(1, Priority::Normal)).await.unwrap();
        queue.add(item(2, Priority::Normal)).await.unwrap();

        let error = queue.add(item(3, Priority::Normal)).await.unwrap_err();
        assert!(matches!(error, QueueError::QueueFull { capacity: 2 }));
    }

    /// A saturated add sweeps expired items before giving up.
    #[tokio::test]
    async fn test_full_queue_recovers_capacity_from_expired_items() {
        let queue: RequestQueue<String> = RequestQueue::new(2).with_expiry_seconds(0.05);
        queue.add(item(1, Priority::Normal)).await.unwrap();
        queue.add(item(2, Priority::Normal)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;

        queue.add(item(3, Priority::Normal)).await.unwrap();
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.get_stats().total_expired, 2);
    }

    /// Expired items are skipped on pop and counted as expired.
    #[tokio::test]
    async fn test_expired_items_are_never_delivered() {
        let queue: RequestQueue<String> = RequestQueue::new(10).with_expiry_seconds(0.05);
        queue.add(item(1, Priority::Critical)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        queue.add(item(2, Priority::Low)).await.unwrap();

        let delivered = queue.get(None).await.unwrap();
        assert_eq!(delivered.id, id(2));
        assert_eq!(queue.get_stats().total_expired, 1);
    }

    #[tokio::test]
    async fn test_partition_limit_rejects_overflow() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.set_partition_limit("api", 1);

        queue
            .add(item(1, Priority::Normal).with_partition("api"))
            .await
            .unwrap();
        let error = queue
            .add(item(2, Priority::Normal).with_partition("api"))
            .await
            .unwrap_err();

        assert!(matches!(error, QueueError::PartitionFull { limit: 1, .. }));

        // Other partitions and untagged items are unaffected
        queue
            .add(item(3, Priority::Normal).with_partition("bulk"))
            .await
            .unwrap();
        queue.add(item(4, Priority::Normal)).await.unwrap();
    }

    #[tokio::test]
    async fn test_partitioned_get_selects_only_tagged_items() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Critical)).await.unwrap();
        queue
            .add(item(2, Priority::Low).with_partition("api"))
            .await
            .unwrap();
        queue
            .add(item(3, Priority::Normal).with_partition("api"))
            .await
            .unwrap();

        // Best item within the partition, not the global top
        assert_eq!(queue.get(Some("api")).await.unwrap().id, id(3));
        assert_eq!(queue.get(Some("api")).await.unwrap().id, id(2));
        assert!(queue.get(Some("api")).await.is_none());
        assert_eq!(queue.get(None).await.unwrap().id, id(1));
    }
}

// ============================================================================
// Retry and Dead Letter Tests
// ============================================================================

mod dead_letter {
    use super::*;

    #[tokio::test]
    async fn test_requeue_demotes_priority() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Critical)).await.unwrap();

        let popped = queue.get(None).await.unwrap();
        queue.requeue(popped, "connection reset").await.unwrap();

        let retried = queue.get(None).await.unwrap();
        assert_eq!(retried.priority, Priority::High);
        assert_eq!(retried.retry_count, 1);
    }

    /// Four requeues promote an item to the DLQ exactly once, and it is
    /// absent from the main heap.
    #[tokio::test]
    async fn test_requeue_promotes_to_dlq_after_max_retries() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Normal)).await.unwrap();

        for _ in 0..4 {
            let popped = queue.get(None).await.unwrap();
            queue.requeue(popped, "upstream 503").await.unwrap();
        }

        assert_eq!(queue.size(), 0);
        let dlq = queue.dlq_entries();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].item.id, id(1));
        assert!(dlq[0].reason.starts_with("Max retries exceeded"));
    }

    #[tokio::test]
    async fn test_dlq_evicts_oldest_beyond_capacity() {
        let queue: RequestQueue<String> = RequestQueue::new(100).with_dlq_capacity(3);

        for tag in 1..=5 {
            queue
                .add_to_dlq(item(tag, Priority::Normal), "poison payload")
                .await;
        }

        let dlq = queue.dlq_entries();
        assert_eq!(dlq.len(), 3);
        assert_eq!(dlq[0].item.id, id(3));
        assert_eq!(dlq[2].item.id, id(5));
    }

    #[tokio::test]
    async fn test_replay_resets_retry_count_and_priority() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        let mut failed = item(1, Priority::Critical);
        failed.retry_count = 4;
        queue.add_to_dlq(failed, "max retries").await;

        let replayed_id = queue.replay_dlq(0).await.unwrap();
        assert_eq!(replayed_id, id(1));
        assert_eq!(queue.dlq_size(), 0);

        let restored = queue.get(None).await.unwrap();
        assert_eq!(restored.priority, Priority::Normal);
        assert_eq!(restored.retry_count, 0);
    }

    #[tokio::test]
    async fn test_replay_with_bad_index_fails() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        let error = queue.replay_dlq(7).await.unwrap_err();
        assert!(matches!(
            error,
            QueueError::DlqIndexOutOfRange { index: 7, size: 0 }
        ));
    }
}

// ============================================================================
// Tracking and Accounting Tests
// ============================================================================

mod accounting {
    use super::*;

    #[tokio::test]
    async fn test_remove_takes_item_out_of_every_structure() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue
            .add(item(1, Priority::Normal).with_partition("api"))
            .await
            .unwrap();
        queue.add(item(2, Priority::Normal)).await.unwrap();

        assert!(queue.remove(&id(1)).await);
        assert!(!queue.remove(&id(1)).await);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.partition_size("api"), 0);
        assert_eq!(queue.get(None).await.unwrap().id, id(2));
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Normal)).await.unwrap();

        let popped = queue.get(None).await.unwrap();
        assert_eq!(queue.get_stats().in_flight_count, 1);

        assert!(queue.complete(&popped.id));
        assert!(!queue.complete(&popped.id));
        assert_eq!(queue.get_stats().in_flight_count, 0);
    }

    /// Conservation: enqueued = dequeued + expired + queued + in-flight,
    /// with DLQ admissions tracked separately as failures.
    #[tokio::test]
    async fn test_counter_conservation() {
        let queue: RequestQueue<String> = RequestQueue::new(10);

        for tag in 1..=4 {
            queue.add(item(tag, Priority::Normal)).await.unwrap();
        }
        let first = queue.get(None).await.unwrap();
        queue.complete(&first.id);
        let second = queue.get(None).await.unwrap();

        let stats = queue.get_stats();
        assert_eq!(stats.total_enqueued, 4);
        assert_eq!(stats.total_dequeued, 2);
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.in_flight_count, 1);
        assert_eq!(
            stats.total_enqueued,
            stats.total_dequeued + stats.total_expired + stats.current_size as u64
        );
        drop(second);
    }

    #[tokio::test]
    async fn test_resubmitting_live_id_replaces_item() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Low)).await.unwrap();
        queue.add(item(1, Priority::Critical)).await.unwrap();

        assert_eq!(queue.size(), 1);
        let popped = queue.get(None).await.unwrap();
        assert_eq!(popped.priority, Priority::Critical);
        assert!(queue.get(None).await.is_none());
    }

    #[tokio::test]
    async fn test_export_metrics_distributions() {
        let queue: RequestQueue<String> = RequestQueue::new(4);
        queue.add(item(1, Priority::Critical)).await.unwrap();
        queue.add(item(2, Priority::Normal)).await.unwrap();
        queue
            .add(item(3, Priority::Normal).with_partition("api"))
            .await
            .unwrap();

        let metrics = queue.export_metrics();
        assert_eq!(metrics.size, 3);
        assert!((metrics.capacity_used - 0.75).abs() < f64::EPSILON);
        assert_eq!(metrics.priority_distribution.get(&1), Some(&1));
        assert_eq!(metrics.priority_distribution.get(&3), Some(&2));
        assert_eq!(metrics.age_distribution.under_1m, 3);
        assert_eq!(metrics.partitions.get("api").unwrap().size, 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_counters_and_dlq() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        queue.add(item(1, Priority::Normal)).await.unwrap();
        queue.add_to_dlq(item(2, Priority::Normal), "poison").await;

        queue.clear().await;

        assert_eq!(queue.size(), 0);
        assert_eq!(queue.dlq_size(), 1);
        assert_eq!(queue.get_stats().total_enqueued, 1);
    }
}
