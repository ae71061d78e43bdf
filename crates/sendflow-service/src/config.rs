//! Configuration types for the orchestration service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

fn default_max_concurrent_requests() -> usize {
    50
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_rate_limit() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> f64 {
    3600.0
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_health_snapshot_path() -> PathBuf {
    PathBuf::from("logs/health.json")
}

/// Orchestrator configuration.
///
/// Loaded from an optional TOML file layered under `SENDFLOW_`-prefixed
/// environment variables; every field has a default so an empty
/// configuration is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker pool size
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// System-wide request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Transport attempts per item per orchestrated attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay for exponential backoff, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Global token bucket capacity and refill rate
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,

    #[serde(default = "default_true")]
    pub enable_monitoring: bool,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    /// Response cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: f64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// When set, completed requests POST a summary here
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Headers merged into every outgoing request
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// Queue capacity before admission fails
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// When set, queue state is snapshotted here after every mutation
    #[serde(default)]
    pub queue_persist_path: Option<PathBuf>,

    /// Health snapshot file written every 60 seconds
    #[serde(default = "default_health_snapshot_path")]
    pub health_snapshot_path: PathBuf,

    /// When set, the monitor writes its full metrics report here
    #[serde(default)]
    pub metrics_export_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout: default_request_timeout(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            rate_limit_per_second: default_rate_limit(),
            enable_monitoring: true,
            enable_caching: true,
            cache_ttl: default_cache_ttl(),
            log_level: default_log_level(),
            webhook_url: None,
            custom_headers: HashMap::new(),
            queue_capacity: default_queue_capacity(),
            queue_persist_path: None,
            health_snapshot_path: default_health_snapshot_path(),
            metrics_export_path: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// Environment variables use the `SENDFLOW_` prefix with `__` as the
    /// nesting separator, e.g. `SENDFLOW_RETRY_COUNT=5`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or a value
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SENDFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check the configuration for values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_count",
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit_per_second == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_per_second",
                message: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be positive".to_string(),
            });
        }
        if self.retry_delay < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_delay",
                message: "must not be negative".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}
