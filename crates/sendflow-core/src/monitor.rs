//! Monitor facade.
//!
//! Aggregates the metric collector and alert manager, tracks in-flight
//! requests, samples host resources through a [`SystemProbe`], and exposes
//! metrics and health snapshots. Background tasks run on their own
//! schedules once [`Monitor::start`] is called and stop cleanly on
//! [`Monitor::stop`].

use crate::alerts::{AlertHandler, AlertManager, AlertSeverity, Comparison};
use crate::metrics::{MetricCollector, MetricKind, MetricStats};
use crate::{RequestId, Timestamp};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

/// Completed-request history retained for throughput derivation
const HISTORY_CAPACITY: usize = 10_000;

/// In-flight requests older than this raise a `requests.stuck` alert
const STUCK_THRESHOLD_SECONDS: f64 = 300.0;

const COLLECT_INTERVAL: Duration = Duration::from_secs(5);
const SYSTEM_INTERVAL: Duration = Duration::from_secs(30);
const STUCK_SCAN_INTERVAL: Duration = Duration::from_secs(60);
const EXPORT_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// System Probe
// ============================================================================

/// One sample of host resource usage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_available_bytes: u64,
    pub disk_percent: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Source of host resource samples.
///
/// The service crate injects a real implementation; tests and headless
/// deployments use [`NoOpProbe`].
#[async_trait]
pub trait SystemProbe: Send + Sync {
    async fn sample(&self) -> Option<SystemSample>;
}

/// Probe that never produces samples
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProbe;

#[async_trait]
impl SystemProbe for NoOpProbe {
    async fn sample(&self) -> Option<SystemSample> {
        None
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Aggregate health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertCounts {
    pub active: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestCounts {
    pub active: usize,
    pub total_processed: usize,
}

/// Full metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub timestamp: Timestamp,
    pub uptime: f64,
    pub counters: HashMap<String, f64>,
    pub gauges: HashMap<String, f64>,
    pub histograms: HashMap<String, MetricStats>,
    pub system: Option<SystemSample>,
    pub alerts: AlertCounts,
    pub requests: RequestCounts,
}

/// Condensed health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime: f64,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub system_load: f64,
    pub memory_usage: f64,
    pub active_requests: usize,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    timestamp: Timestamp,
    success: bool,
}

// ============================================================================
// Monitor
// ============================================================================

/// Monitoring facade shared by the orchestrator and its workers
pub struct Monitor {
    collector: Arc<MetricCollector>,
    alerts: Arc<AlertManager>,
    probe: Arc<dyn SystemProbe>,
    export_path: Option<PathBuf>,
    started_at: Mutex<Option<Timestamp>>,
    active: Mutex<HashMap<RequestId, Timestamp>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    latest_sample: Mutex<Option<SystemSample>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            collector: Arc::new(MetricCollector::default()),
            alerts: Arc::new(AlertManager::default()),
            probe: Arc::new(NoOpProbe),
            export_path: None,
            started_at: Mutex::new(None),
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            latest_sample: Mutex::new(None),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Use a real system probe
    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Periodically write the full metrics report to this file
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    /// The underlying metric collector
    pub fn collector(&self) -> &Arc<MetricCollector> {
        &self.collector
    }

    /// The underlying alert manager
    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Start the background tasks. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        let mut shutdown = self.shutdown.lock().unwrap();
        if shutdown.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *shutdown = Some(tx);
        *self.started_at.lock().unwrap() = Some(Timestamp::now());

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(Self::collect_loop(
            Arc::clone(self),
            rx.clone(),
        )));
        tasks.push(tokio::spawn(Self::system_loop(Arc::clone(self), rx.clone())));
        tasks.push(tokio::spawn(Self::stuck_scan_loop(
            Arc::clone(self),
            rx.clone(),
        )));
        if self.export_path.is_some() {
            tasks.push(tokio::spawn(Self::export_loop(Arc::clone(self), rx)));
        }

        info!("Monitor started");
    }

    /// Stop every background task and wait for termination
    pub async fn stop(&self) {
        let sender = self.shutdown.lock().unwrap().take();
        let Some(sender) = sender else {
            return;
        };
        let _ = sender.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("Monitor stopped");
    }

    // ------------------------------------------------------------------
    // Event intake
    // ------------------------------------------------------------------

    pub fn record_request_queued(&self, _request_id: &RequestId) {
        self.collector.increment("requests.queued");
    }

    pub fn record_request_started(&self, request_id: &RequestId) {
        let active_count = {
            let mut active = self.active.lock().unwrap();
            active.insert(request_id.clone(), Timestamp::now());
            active.len()
        };
        self.collector.increment("requests.started");
        self.collector.record("requests.active", active_count as f64);
    }

    pub async fn record_request_completed(
        &self,
        request_id: &RequestId,
        success: bool,
        duration: f64,
    ) {
        self.active.lock().unwrap().remove(request_id);

        self.collector.increment("requests.completed");
        self.collector.record_histogram("request.duration", duration);
        if success {
            self.collector.increment("requests.success");
        } else {
            self.collector.increment("requests.failed");
        }
        let failure_rate = self.update_rate_gauges();

        {
            let mut history = self.history.lock().unwrap();
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(HistoryEntry {
                timestamp: Timestamp::now(),
                success,
            });
        }

        self.alerts.check_metric("request.duration", duration).await;
        if let Some(rate) = failure_rate {
            self.alerts.check_metric("requests.failure_rate", rate).await;
        }
    }

    pub async fn record_request_failed(&self, request_id: &RequestId, reason: &str) {
        self.active.lock().unwrap().remove(request_id);

        self.collector.increment("requests.failed");
        self.collector.increment(&format!("errors.{}", reason));
        let failure_rate = self.update_rate_gauges();

        {
            let mut history = self.history.lock().unwrap();
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(HistoryEntry {
                timestamp: Timestamp::now(),
                success: false,
            });
        }

        if let Some(rate) = failure_rate {
            self.alerts.check_metric("requests.failure_rate", rate).await;
        }
    }

    /// Recompute the derived success/failure rate gauges.
    /// Returns the failure rate when any request has completed.
    fn update_rate_gauges(&self) -> Option<f64> {
        let success = self.collector.counter("requests.success");
        let failed = self.collector.counter("requests.failed");
        let total = success + failed;
        if total <= 0.0 {
            return None;
        }
        let success_rate = success / total;
        self.collector.set_gauge("requests.success_rate", success_rate);
        self.collector
            .set_gauge("requests.failure_rate", 1.0 - success_rate);
        Some(1.0 - success_rate)
    }

    // ------------------------------------------------------------------
    // Custom metrics and alerts
    // ------------------------------------------------------------------

    pub fn add_custom_metric(&self, name: &str, value: f64, kind: MetricKind) {
        match kind {
            MetricKind::Counter => self.collector.increment_by(name, value),
            MetricKind::Gauge => self.collector.set_gauge(name, value),
            MetricKind::Histogram => self.collector.record_histogram(name, value),
            MetricKind::Series => self.collector.record(name, value),
        }
    }

    pub fn add_alert_threshold(
        &self,
        metric: &str,
        threshold: f64,
        severity: AlertSeverity,
        comparison: Comparison,
    ) {
        self.alerts
            .add_threshold(metric, severity, threshold, comparison);
    }

    pub fn add_alert_handler(&self, severity: AlertSeverity, handler: Arc<dyn AlertHandler>) {
        self.alerts.add_handler(severity, handler);
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    pub fn get_metrics(&self) -> MetricsReport {
        let histograms = self
            .collector
            .histogram_names()
            .into_iter()
            .filter_map(|name| {
                self.collector
                    .histogram_stats(&name)
                    .map(|stats| (name, stats))
            })
            .collect();

        MetricsReport {
            timestamp: Timestamp::now(),
            uptime: self.uptime(),
            counters: self.collector.counters_snapshot(),
            gauges: self.collector.gauges_snapshot(),
            histograms,
            system: self.latest_sample.lock().unwrap().clone(),
            alerts: AlertCounts {
                active: self.alerts.active_alerts().len(),
                total: self.alerts.total_alerts(),
            },
            requests: RequestCounts {
                active: self.active.lock().unwrap().len(),
                total_processed: self.history.lock().unwrap().len(),
            },
        }
    }

    pub fn get_health_status(&self) -> HealthReport {
        let active_alerts = self.alerts.active_alerts();
        let critical_alerts = active_alerts
            .iter()
            .filter(|alert| alert.severity == AlertSeverity::Critical)
            .count();

        let status = if critical_alerts > 0 {
            HealthStatus::Critical
        } else if active_alerts.len() > 10 {
            HealthStatus::Degraded
        } else if !active_alerts.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let sample = self.latest_sample.lock().unwrap().clone();
        HealthReport {
            status,
            uptime: self.uptime(),
            active_alerts: active_alerts.len(),
            critical_alerts,
            system_load: sample.as_ref().map(|s| s.cpu_percent).unwrap_or(0.0),
            memory_usage: sample.as_ref().map(|s| s.memory_percent).unwrap_or(0.0),
            active_requests: self.active.lock().unwrap().len(),
        }
    }

    fn uptime(&self) -> f64 {
        self.started_at
            .lock()
            .unwrap()
            .map(|started| started.age_seconds())
            .unwrap_or(0.0)
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    async fn collect_loop(monitor: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(COLLECT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let active = monitor.active.lock().unwrap().len();
                    monitor.collector.record("requests.active", active as f64);

                    let per_minute = {
                        let history = monitor.history.lock().unwrap();
                        history
                            .iter()
                            .filter(|entry| entry.timestamp.age_seconds() < 60.0)
                            .count()
                    };
                    monitor
                        .collector
                        .record("requests.per_minute", per_minute as f64);
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn system_loop(monitor: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(SYSTEM_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(sample) = monitor.probe.sample().await else {
                        continue;
                    };
                    monitor.collector.record("system.cpu_percent", sample.cpu_percent);
                    monitor
                        .collector
                        .record("system.memory_percent", sample.memory_percent);
                    monitor.collector.record("system.disk_percent", sample.disk_percent);
                    monitor
                        .collector
                        .record("system.bytes_sent", sample.bytes_sent as f64);
                    monitor
                        .collector
                        .record("system.bytes_recv", sample.bytes_received as f64);

                    monitor
                        .alerts
                        .check_metric("system.cpu_percent", sample.cpu_percent)
                        .await;
                    monitor
                        .alerts
                        .check_metric("system.memory_percent", sample.memory_percent)
                        .await;
                    monitor
                        .alerts
                        .check_metric("system.disk_percent", sample.disk_percent)
                        .await;

                    *monitor.latest_sample.lock().unwrap() = Some(sample);
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn stuck_scan_loop(monitor: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(STUCK_SCAN_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stuck: Vec<f64> = {
                        let active = monitor.active.lock().unwrap();
                        active
                            .values()
                            .map(Timestamp::age_seconds)
                            .filter(|age| *age > STUCK_THRESHOLD_SECONDS)
                            .collect()
                    };
                    for age in stuck {
                        monitor
                            .alerts
                            .create_alert(
                                "requests.stuck",
                                age,
                                STUCK_THRESHOLD_SECONDS,
                                AlertSeverity::High,
                            )
                            .await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn export_loop(monitor: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let Some(path) = monitor.export_path.clone() else {
            return;
        };
        let mut interval = tokio::time::interval(EXPORT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = monitor.get_metrics();
                    match serde_json::to_vec_pretty(&report) {
                        Ok(bytes) => {
                            if let Err(err) = tokio::fs::write(&path, bytes).await {
                                error!(%err, path = %path.display(), "Metrics export failed");
                            }
                        }
                        Err(err) => error!(%err, "Metrics report serialization failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
