//! Metric registers: counters, gauges, histograms, and time series.
//!
//! Histograms and time series are bounded rings of at most `window_size`
//! samples with FIFO eviction. Statistics are computed over the current
//! window on demand; recording is O(1) amortized.

use crate::Timestamp;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Default bound on histogram and time-series windows
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Kinds of metric accepted by `add_custom_metric`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Series,
}

/// Statistics over a metric window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

struct Registers {
    counters: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, VecDeque<f64>>,
    series: HashMap<String, VecDeque<(Timestamp, f64)>>,
}

/// Thread-safe metric store shared by the monitor and all workers
pub struct MetricCollector {
    window_size: usize,
    inner: Mutex<Registers>,
}

impl MetricCollector {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            inner: Mutex::new(Registers {
                counters: HashMap::new(),
                gauges: HashMap::new(),
                histograms: HashMap::new(),
                series: HashMap::new(),
            }),
        }
    }

    /// Record a time-series sample stamped now
    pub fn record(&self, metric: &str, value: f64) {
        self.record_at(metric, value, Timestamp::now());
    }

    /// Record a time-series sample with an explicit timestamp
    pub fn record_at(&self, metric: &str, value: f64, timestamp: Timestamp) {
        let mut inner = self.inner.lock().unwrap();
        let window = inner.series.entry(metric.to_string()).or_default();
        if window.len() >= self.window_size {
            window.pop_front();
        }
        window.push_back((timestamp, value));
    }

    /// Increment a counter by one
    pub fn increment(&self, metric: &str) {
        self.increment_by(metric, 1.0);
    }

    /// Increment a counter by a delta
    pub fn increment_by(&self, metric: &str, delta: f64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.counters.entry(metric.to_string()).or_insert(0.0) += delta;
    }

    /// Set a gauge
    pub fn set_gauge(&self, metric: &str, value: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.gauges.insert(metric.to_string(), value);
    }

    /// Record a histogram sample
    pub fn record_histogram(&self, metric: &str, value: f64) {
        let mut inner = self.inner.lock().unwrap();
        let window = inner.histograms.entry(metric.to_string()).or_default();
        if window.len() >= self.window_size {
            window.pop_front();
        }
        window.push_back(value);
    }

    /// Current counter value, zero when never incremented
    pub fn counter(&self, metric: &str) -> f64 {
        self.inner
            .lock()
            .unwrap()
            .counters
            .get(metric)
            .copied()
            .unwrap_or(0.0)
    }

    /// Current gauge value
    pub fn gauge(&self, metric: &str) -> Option<f64> {
        self.inner.lock().unwrap().gauges.get(metric).copied()
    }

    /// Statistics over a time-series window
    pub fn stats(&self, metric: &str) -> Option<MetricStats> {
        let inner = self.inner.lock().unwrap();
        let values: Vec<f64> = inner
            .series
            .get(metric)?
            .iter()
            .map(|(_, value)| *value)
            .collect();
        compute_stats(values)
    }

    /// Statistics over a histogram window
    pub fn histogram_stats(&self, metric: &str) -> Option<MetricStats> {
        let inner = self.inner.lock().unwrap();
        let values: Vec<f64> = inner.histograms.get(metric)?.iter().copied().collect();
        compute_stats(values)
    }

    /// Snapshot of every counter
    pub fn counters_snapshot(&self) -> HashMap<String, f64> {
        self.inner.lock().unwrap().counters.clone()
    }

    /// Snapshot of every gauge
    pub fn gauges_snapshot(&self) -> HashMap<String, f64> {
        self.inner.lock().unwrap().gauges.clone()
    }

    /// Names of every histogram with at least one sample
    pub fn histogram_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().histograms.keys().cloned().collect()
    }
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// Sort-on-query statistics. Count, min, and max are exact; quantiles use
/// linear interpolation between ranks. With a single sample every quantile
/// equals that sample.
fn compute_stats(mut values: Vec<f64>) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = values.len();
    let sum: f64 = values.iter().sum();

    Some(MetricStats {
        count,
        min: values[0],
        max: values[count - 1],
        mean: sum / count as f64,
        median: percentile(&values, 50.0),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
    })
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
