//! Tests for the monitor facade.

use super::*;
use crate::metrics::MetricKind;

fn request_id(tag: u8) -> RequestId {
    RequestId::new(format!("{:016x}", tag as u64)).unwrap()
}

struct FixedProbe(SystemSample);

#[async_trait]
impl SystemProbe for FixedProbe {
    async fn sample(&self) -> Option<SystemSample> {
        Some(self.0.clone())
    }
}

fn hot_sample() -> SystemSample {
    SystemSample {
        cpu_percent: 95.0,
        memory_percent: 40.0,
        memory_available_bytes: 8 << 30,
        disk_percent: 10.0,
        bytes_sent: 1000,
        bytes_received: 2000,
    }
}

// ============================================================================
// Event Intake Tests
// ============================================================================

#[tokio::test]
async fn test_request_lifecycle_counters() {
    let monitor = Monitor::new();
    let id = request_id(1);

    monitor.record_request_queued(&id);
    monitor.record_request_started(&id);
    monitor.record_request_completed(&id, true, 0.25).await;

    let collector = monitor.collector();
    assert_eq!(collector.counter("requests.queued"), 1.0);
    assert_eq!(collector.counter("requests.started"), 1.0);
    assert_eq!(collector.counter("requests.completed"), 1.0);
    assert_eq!(collector.counter("requests.success"), 1.0);
    assert_eq!(collector.counter("requests.failed"), 0.0);

    let duration_stats = collector.histogram_stats("request.duration").unwrap();
    assert_eq!(duration_stats.count, 1);
    assert_eq!(duration_stats.max, 0.25);
}

#[tokio::test]
async fn test_success_rate_gauges() {
    let monitor = Monitor::new();

    monitor
        .record_request_completed(&request_id(1), true, 0.1)
        .await;
    monitor
        .record_request_completed(&request_id(2), true, 0.1)
        .await;
    monitor
        .record_request_completed(&request_id(3), true, 0.1)
        .await;
    monitor
        .record_request_failed(&request_id(4), "connection reset")
        .await;

    let collector = monitor.collector();
    assert_eq!(collector.gauge("requests.success_rate"), Some(0.75));
    assert_eq!(collector.gauge("requests.failure_rate"), Some(0.25));
    assert_eq!(collector.counter("errors.connection reset"), 1.0);
}

#[tokio::test]
async fn test_failure_rate_above_threshold_raises_alert() {
    let monitor = Monitor::new();

    // 1 of 2 failed: failure rate 0.5 > 0.1 default threshold
    monitor
        .record_request_completed(&request_id(1), true, 0.1)
        .await;
    monitor
        .record_request_failed(&request_id(2), "timeout")
        .await;

    let active = monitor.alerts().active_alerts();
    assert!(active
        .iter()
        .any(|alert| alert.metric == "requests.failure_rate"));
}

#[tokio::test]
async fn test_slow_request_raises_duration_alert() {
    let monitor = Monitor::new();
    monitor
        .record_request_completed(&request_id(1), true, 45.0)
        .await;

    let active = monitor.alerts().active_alerts();
    assert!(active.iter().any(|alert| alert.metric == "request.duration"));
}

// ============================================================================
// Report Tests
// ============================================================================

#[tokio::test]
async fn test_get_metrics_shape() {
    let monitor = Monitor::new();
    monitor.record_request_started(&request_id(1));
    monitor
        .record_request_completed(&request_id(1), true, 0.5)
        .await;
    monitor.add_custom_metric("pool.size", 12.0, MetricKind::Gauge);

    let report = monitor.get_metrics();
    assert_eq!(report.gauges["pool.size"], 12.0);
    assert!(report.histograms.contains_key("request.duration"));
    assert_eq!(report.requests.active, 0);
    assert_eq!(report.requests.total_processed, 1);
    assert_eq!(report.alerts.active, 0);
}

#[tokio::test]
async fn test_health_transitions() {
    let monitor = Monitor::new();
    assert_eq!(monitor.get_health_status().status, HealthStatus::Healthy);

    monitor
        .alerts()
        .create_alert("requests.stuck", 400.0, 300.0, AlertSeverity::High)
        .await;
    assert_eq!(monitor.get_health_status().status, HealthStatus::Warning);

    for _ in 0..11 {
        monitor
            .alerts()
            .create_alert("noise", 2.0, 1.0, AlertSeverity::Low)
            .await;
    }
    assert_eq!(monitor.get_health_status().status, HealthStatus::Degraded);

    monitor
        .alerts()
        .create_alert("system.down", 1.0, 0.0, AlertSeverity::Critical)
        .await;
    let health = monitor.get_health_status();
    assert_eq!(health.status, HealthStatus::Critical);
    assert_eq!(health.critical_alerts, 1);
}

#[tokio::test]
async fn test_custom_metric_kinds() {
    let monitor = Monitor::new();
    monitor.add_custom_metric("jobs.done", 2.0, MetricKind::Counter);
    monitor.add_custom_metric("jobs.done", 3.0, MetricKind::Counter);
    monitor.add_custom_metric("pool.free", 7.0, MetricKind::Gauge);
    monitor.add_custom_metric("job.duration", 1.5, MetricKind::Histogram);

    let collector = monitor.collector();
    assert_eq!(collector.counter("jobs.done"), 5.0);
    assert_eq!(collector.gauge("pool.free"), Some(7.0));
    assert_eq!(
        collector.histogram_stats("job.duration").unwrap().count,
        1
    );
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_start_and_stop_are_clean() {
    let monitor = Arc::new(Monitor::new().with_probe(Arc::new(FixedProbe(hot_sample()))));
    monitor.start().await;
    // Second start is a no-op
    monitor.start().await;
    monitor.stop().await;
    // Second stop is a no-op
    monitor.stop().await;
}

#[tokio::test]
async fn test_export_task_writes_metrics_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let monitor = Arc::new(Monitor::new().with_export_path(&path));
    monitor
        .record_request_completed(&request_id(1), true, 0.5)
        .await;
    monitor.start().await;

    // The export interval fires immediately on start
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    monitor.stop().await;

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let report: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert!(report.get("counters").is_some());
    assert!(report.get("uptime").is_some());
}
