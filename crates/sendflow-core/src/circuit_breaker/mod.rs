//! Per-endpoint circuit breaking.
//!
//! Every endpoint (request URL stripped of its query string) gets its own
//! three-state breaker. Consults and updates for an endpoint are serialized
//! through the registry lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

pub mod breaker;

pub use breaker::{BreakerSnapshot, EndpointBreaker};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// ============================================================================
// State and Configuration
// ============================================================================

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass; failures are counted
    Closed,
    /// Requests are rejected without dispatch
    Open,
    /// Probe traffic is allowed; successes close, one failure re-opens
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Breaker thresholds shared by every endpoint in a registry
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker
    pub failure_threshold: u32,

    /// How long an open breaker rejects traffic before allowing a probe
    pub cool_down: Duration,

    /// Consecutive half-open successes beyond this close the breaker
    pub half_open_success_quota: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
            half_open_success_quota: 3,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of per-endpoint breakers.
///
/// Breakers are created lazily on first consult or update. The registry is
/// scoped to an orchestrator instance and shared across its workers.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, EndpointBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry with the given thresholds
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Consult the breaker for an endpoint before dispatch.
    ///
    /// An open breaker whose cool-down has elapsed transitions to half-open
    /// here, on the first consult after the deadline.
    pub fn check(&self, endpoint: &str) -> CircuitState {
        let mut breakers = self.breakers.lock().unwrap();
        let breaker = breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointBreaker::new(self.config.clone()));
        let before = breaker.state();
        let state = breaker.check();
        if before == CircuitState::Open && state == CircuitState::HalfOpen {
            info!(endpoint, "Circuit breaker half-open, allowing probe traffic");
        }
        state
    }

    /// Record a successful dispatch for an endpoint
    pub fn record_success(&self, endpoint: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        let breaker = breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointBreaker::new(self.config.clone()));
        let before = breaker.state();
        breaker.record_success();
        if before != CircuitState::Closed && breaker.state() == CircuitState::Closed {
            info!(endpoint, "Circuit breaker closed");
        }
    }

    /// Record a failed dispatch for an endpoint
    pub fn record_failure(&self, endpoint: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        let breaker = breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointBreaker::new(self.config.clone()));
        let before = breaker.state();
        breaker.record_failure();
        if before != CircuitState::Open && breaker.state() == CircuitState::Open {
            warn!(endpoint, "Circuit breaker opened");
        }
    }

    /// Current state per known endpoint
    pub fn states(&self) -> HashMap<String, CircuitState> {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .iter()
            .map(|(endpoint, breaker)| (endpoint.clone(), breaker.state()))
            .collect()
    }

    /// Number of endpoints currently rejecting traffic
    pub fn open_count(&self) -> usize {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .values()
            .filter(|breaker| breaker.state() == CircuitState::Open)
            .count()
    }

    /// Detailed snapshot for one endpoint, if it has a breaker
    pub fn snapshot(&self, endpoint: &str) -> Option<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap();
        breakers.get(endpoint).map(EndpointBreaker::snapshot)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
