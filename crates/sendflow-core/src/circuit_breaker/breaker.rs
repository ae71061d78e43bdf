//! Single-endpoint breaker state machine.

use super::{BreakerConfig, CircuitState};
use serde::Serialize;
use std::time::Instant;

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;

/// State machine for one endpoint.
///
/// Transitions:
/// - closed → open when consecutive failures reach the threshold
/// - open → half-open on the first consult after the cool-down
/// - half-open → closed after the success quota is exceeded
/// - half-open → open on any failure
///
/// An open breaker can never reach closed without passing through
/// half-open.
#[derive(Debug)]
pub struct EndpointBreaker {
    config: BreakerConfig,
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl EndpointBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
        }
    }

    /// Current state without side effects
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consult before dispatch; performs the open → half-open transition
    pub fn check(&mut self) -> CircuitState {
        if self.state == CircuitState::Open {
            let cooled_down = self
                .opened_at
                .map(|opened| opened.elapsed() >= self.config.cool_down)
                .unwrap_or(true);
            if cooled_down {
                self.transition_to_half_open();
            }
        }
        self.state
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failures = 0;
            }
            CircuitState::HalfOpen => {
                self.successes += 1;
                if self.successes > self.config.half_open_success_quota {
                    self.close();
                }
            }
            CircuitState::Open => {
                // A worker that was already in flight when the breaker
                // tripped; the result carries no weight while open.
            }
        }
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failures += 1;
                if self.failures >= self.config.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::HalfOpen => {
                self.trip();
            }
            CircuitState::Open => {
                self.failures += 1;
            }
        }
    }

    /// Point-in-time view for status reporting
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failures: self.failures,
            successes: self.successes,
            seconds_since_opened: self.opened_at.map(|opened| opened.elapsed().as_secs_f64()),
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.successes = 0;
    }

    fn transition_to_half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.opened_at = None;
        self.failures = 0;
        self.successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.failures = 0;
        self.successes = 0;
    }

    #[cfg(test)]
    pub(crate) fn force_open_at(&mut self, opened_at: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(opened_at);
    }
}

/// Observable breaker state for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub seconds_since_opened: Option<f64>,
}
