//! Tests for metric registers.

use super::*;

#[test]
fn test_counters_accumulate() {
    let collector = MetricCollector::default();
    collector.increment("requests.completed");
    collector.increment("requests.completed");
    collector.increment_by("requests.completed", 3.0);

    assert_eq!(collector.counter("requests.completed"), 5.0);
    assert_eq!(collector.counter("never.touched"), 0.0);
}

#[test]
fn test_gauges_hold_last_value() {
    let collector = MetricCollector::default();
    collector.set_gauge("requests.success_rate", 0.5);
    collector.set_gauge("requests.success_rate", 0.75);

    assert_eq!(collector.gauge("requests.success_rate"), Some(0.75));
    assert_eq!(collector.gauge("missing"), None);
}

#[test]
fn test_stats_over_series() {
    let collector = MetricCollector::default();
    for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
        collector.record("queue.depth", value);
    }

    let stats = collector.stats("queue.depth").unwrap();
    assert_eq!(stats.count, 5);
    assert_eq!(stats.min, 1.0);
    assert_eq!(stats.max, 5.0);
    assert_eq!(stats.mean, 3.0);
    assert_eq!(stats.median, 3.0);
}

#[test]
fn test_stats_for_unknown_metric_is_none() {
    let collector = MetricCollector::default();
    assert!(collector.stats("nothing").is_none());
}

/// With fewer than two samples, every quantile equals the single value.
#[test]
fn test_single_sample_quantiles() {
    let collector = MetricCollector::default();
    collector.record_histogram("request.duration", 7.5);

    let stats = collector.histogram_stats("request.duration").unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.median, 7.5);
    assert_eq!(stats.p95, 7.5);
    assert_eq!(stats.p99, 7.5);
}

#[test]
fn test_percentiles_on_uniform_window() {
    let collector = MetricCollector::default();
    for value in 1..=100 {
        collector.record_histogram("request.duration", value as f64);
    }

    let stats = collector.histogram_stats("request.duration").unwrap();
    // Interpolated ranks over 1..=100, within 1% of the true quantile
    assert!((stats.p95 - 95.0).abs() <= 1.0);
    assert!((stats.p99 - 99.0).abs() <= 1.0);
    assert_eq!(stats.min, 1.0);
    assert_eq!(stats.max, 100.0);
}

/// Histogram windows evict oldest samples beyond the bound.
#[test]
fn test_window_eviction() {
    let collector = MetricCollector::new(10);
    for value in 0..25 {
        collector.record_histogram("request.duration", value as f64);
    }

    let stats = collector.histogram_stats("request.duration").unwrap();
    assert_eq!(stats.count, 10);
    assert_eq!(stats.min, 15.0);
    assert_eq!(stats.max, 24.0);
}

#[test]
fn test_series_window_eviction() {
    let collector = MetricCollector::new(3);
    for value in 0..5 {
        collector.record("system.cpu_percent", value as f64);
    }

    let stats = collector.stats("system.cpu_percent").unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.min, 2.0);
}

#[test]
fn test_snapshots() {
    let collector = MetricCollector::default();
    collector.increment("a");
    collector.set_gauge("b", 2.0);
    collector.record_histogram("c", 3.0);

    assert_eq!(collector.counters_snapshot()["a"], 1.0);
    assert_eq!(collector.gauges_snapshot()["b"], 2.0);
    assert_eq!(collector.histogram_names(), vec!["c".to_string()]);
}
