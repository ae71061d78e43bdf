//! Alert thresholds, lifecycle, and handler dispatch.

use crate::{MonitorError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::error;

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;

/// Default bound on the retained alert list
pub const DEFAULT_MAX_ALERTS: usize = 1000;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Threshold comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Lt,
    Eq,
}

impl Comparison {
    fn triggers(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Eq => value == threshold,
        }
    }
}

/// A triggered alert
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: Timestamp,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub resolved: bool,
}

/// Handler invoked for every alert at its registered severity.
///
/// Handler failures are logged and never interrupt dispatch to the
/// remaining handlers.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn handle(&self, alert: &Alert) -> Result<(), MonitorError>;
}

#[derive(Debug, Clone)]
struct AlertThreshold {
    severity: AlertSeverity,
    threshold: f64,
    comparison: Comparison,
}

struct AlertState {
    alerts: Vec<Alert>,
    thresholds: HashMap<String, AlertThreshold>,
}

// ============================================================================
// AlertManager
// ============================================================================

/// Evaluates metric values against thresholds and manages the alert list.
///
/// Default thresholds installed at construction: CPU above 80, memory above
/// 85, disk above 90, failure rate above 0.10, request duration above 30
/// seconds.
pub struct AlertManager {
    max_alerts: usize,
    state: Mutex<AlertState>,
    handlers: RwLock<HashMap<AlertSeverity, Vec<Arc<dyn AlertHandler>>>>,
}

impl AlertManager {
    pub fn new(max_alerts: usize) -> Self {
        let manager = Self {
            max_alerts,
            state: Mutex::new(AlertState {
                alerts: Vec::new(),
                thresholds: HashMap::new(),
            }),
            handlers: RwLock::new(HashMap::new()),
        };
        manager.install_default_thresholds();
        manager
    }

    fn install_default_thresholds(&self) {
        self.add_threshold("system.cpu_percent", AlertSeverity::High, 80.0, Comparison::Gt);
        self.add_threshold(
            "system.memory_percent",
            AlertSeverity::High,
            85.0,
            Comparison::Gt,
        );
        self.add_threshold(
            "system.disk_percent",
            AlertSeverity::High,
            90.0,
            Comparison::Gt,
        );
        self.add_threshold(
            "requests.failure_rate",
            AlertSeverity::Medium,
            0.1,
            Comparison::Gt,
        );
        self.add_threshold(
            "request.duration",
            AlertSeverity::Medium,
            30.0,
            Comparison::Gt,
        );
    }

    /// Install or replace a threshold for a metric
    pub fn add_threshold(
        &self,
        metric: &str,
        severity: AlertSeverity,
        threshold: f64,
        comparison: Comparison,
    ) {
        let mut state = self.state.lock().unwrap();
        state.thresholds.insert(
            metric.to_string(),
            AlertThreshold {
                severity,
                threshold,
                comparison,
            },
        );
    }

    /// Register a handler for a severity level
    pub fn add_handler(&self, severity: AlertSeverity, handler: Arc<dyn AlertHandler>) {
        let mut handlers = self.handlers.write().unwrap();
        handlers.entry(severity).or_default().push(handler);
    }

    /// Evaluate a metric value against its threshold, if one is installed
    pub async fn check_metric(&self, metric: &str, value: f64) {
        let triggered = {
            let state = self.state.lock().unwrap();
            state.thresholds.get(metric).and_then(|config| {
                config
                    .comparison
                    .triggers(value, config.threshold)
                    .then(|| (config.severity, config.threshold))
            })
        };

        if let Some((severity, threshold)) = triggered {
            self.create_alert(metric, value, threshold, severity).await;
        }
    }

    /// Construct an alert, append it (bounded), and dispatch handlers
    pub async fn create_alert(
        &self,
        metric: &str,
        value: f64,
        threshold: f64,
        severity: AlertSeverity,
    ) {
        let alert = Alert {
            id: format!("{}_{}", metric, Timestamp::now().unix_seconds()),
            severity,
            message: format!(
                "Metric {} value {} exceeded threshold {}",
                metric, value, threshold
            ),
            timestamp: Timestamp::now(),
            metric: metric.to_string(),
            value,
            threshold,
            resolved: false,
        };

        {
            let mut state = self.state.lock().unwrap();
            state.alerts.push(alert.clone());
            if state.alerts.len() > self.max_alerts {
                let excess = state.alerts.len() - self.max_alerts;
                state.alerts.drain(..excess);
            }
        }

        let handlers: Vec<Arc<dyn AlertHandler>> = {
            let registered = self.handlers.read().unwrap();
            registered.get(&severity).cloned().unwrap_or_default()
        };
        for handler in handlers {
            if let Err(err) = handler.handle(&alert).await {
                error!(alert_id = %alert.id, %err, "Alert handler failed");
            }
        }
    }

    /// Alerts not yet resolved, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let state = self.state.lock().unwrap();
        state
            .alerts
            .iter()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect()
    }

    /// Number of alerts retained, resolved included
    pub fn total_alerts(&self) -> usize {
        self.state.lock().unwrap().alerts.len()
    }

    /// Mark an alert resolved by id
    pub fn resolve(&self, alert_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(alert) = state.alerts.iter_mut().find(|alert| alert.id == alert_id) {
            alert.resolved = true;
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALERTS)
    }
}
