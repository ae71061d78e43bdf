//! Tests for queue item and identifier types.

use super::*;

// ============================================================================
// RequestId Tests
// ============================================================================

mod request_id {
    use super::*;

    #[test]
    fn test_accepts_sixteen_hex_chars() {
        let id = RequestId::new("0123456789abcdef".to_string()).unwrap();
        assert_eq!(id.as_str(), "0123456789abcdef");
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(RequestId::new("abc".to_string()).is_err());
        assert!(RequestId::new("0123456789abcdef0".to_string()).is_err());
        assert!(RequestId::new(String::new()).is_err());
    }

    #[test]
    fn test_rejects_non_hex_characters() {
        assert!(RequestId::new("0123456789abcdeg".to_string()).is_err());
        assert!(RequestId::new("0123456789ABCDEF".to_string()).is_err());
    }

    #[test]
    fn test_parses_from_str() {
        let id: RequestId = "feedfacecafebeef".parse().unwrap();
        assert_eq!(id.to_string(), "feedfacecafebeef");
    }
}

// ============================================================================
// Priority Tests
// ============================================================================

mod priority {
    use super::*;

    #[test]
    fn test_numeric_values() {
        assert_eq!(Priority::Critical.as_u8(), 1);
        assert_eq!(Priority::High.as_u8(), 2);
        assert_eq!(Priority::Normal.as_u8(), 3);
        assert_eq!(Priority::Low.as_u8(), 4);
    }

    #[test]
    fn test_lower_value_orders_first() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn test_demotion_saturates_at_low() {
        assert_eq!(Priority::Critical.demoted(), Priority::High);
        assert_eq!(Priority::Normal.demoted(), Priority::Low);
        assert_eq!(Priority::Low.demoted(), Priority::Low);
    }

    #[test]
    fn test_round_trips_through_u8() {
        for priority in [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ] {
            assert_eq!(Priority::try_from(priority.as_u8()).unwrap(), priority);
        }
        assert!(Priority::try_from(0).is_err());
        assert!(Priority::try_from(5).is_err());
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "2");
        let parsed: Priority = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Priority::Low);
    }

    #[test]
    fn test_parses_names_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("normal".parse::<Priority>().unwrap(), Priority::Normal);
        assert!("urgent".parse::<Priority>().is_err());
    }
}

// ============================================================================
// QueueItem Tests
// ============================================================================

mod queue_item {
    use super::*;

    fn test_id() -> RequestId {
        RequestId::new("00000000000000aa".to_string()).unwrap()
    }

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::new(test_id(), Priority::Normal, "payload".to_string());
        assert_eq!(item.retry_count, 0);
        assert!(item.partition.is_none());
        assert!(item.age_seconds() < 1.0);
    }

    #[test]
    fn test_with_partition() {
        let item =
            QueueItem::new(test_id(), Priority::Normal, "payload".to_string()).with_partition("api");
        assert_eq!(item.partition.as_deref(), Some("api"));
    }

    #[test]
    fn test_item_round_trips_through_json() {
        let item = QueueItem::new(test_id(), Priority::High, vec![1u8, 2, 3]).with_partition("bulk");
        let json = serde_json::to_string(&item).unwrap();
        let restored: QueueItem<Vec<u8>> = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, item.id);
        assert_eq!(restored.priority, item.priority);
        assert_eq!(restored.partition, item.partition);
        assert_eq!(restored.payload, item.payload);
    }
}
