//! # sendflow-service
//!
//! The running half of sendflow: the orchestrator, its rate limiter and
//! response cache, the reqwest transport adapter, the sysinfo resource
//! probe, webhook notifications, and configuration loading.
//!
//! The service binary wires these together; library consumers (the CLI,
//! batch runners, web bridges) construct an [`Orchestrator`] directly.

/// Service configuration
pub mod config;

/// Request orchestrator
pub mod orchestrator;

/// Global token bucket rate limiter
pub mod rate_limit;

/// Response cache
pub mod cache;

/// reqwest transport adapter
pub mod transport;

/// sysinfo-backed system probe
pub mod probe;

/// Webhook notifications
pub mod webhook;

pub use cache::ResponseCache;
pub use config::{ConfigError, OrchestratorConfig};
pub use orchestrator::{BatchOutcome, Orchestrator, OrchestratorError, OrchestratorStatus};
pub use probe::SysinfoProbe;
pub use rate_limit::TokenBucket;
pub use transport::{ConnectivityReport, DownloadReport, HttpTransport};
pub use webhook::WebhookNotifier;

/// Initialize tracing from the configured log level.
///
/// `RUST_LOG` takes precedence over the configuration value when set.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
