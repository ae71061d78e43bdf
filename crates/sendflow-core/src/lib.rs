//! # sendflow-core
//!
//! Core business logic for the sendflow request orchestration system.
//!
//! This crate contains the domain logic for describing outbound HTTP
//! requests, building them (templates, authentication, signing), protecting
//! endpoints with circuit breakers, and observing the system through
//! metrics, alerts, and health snapshots.
//!
//! ## Architecture
//!
//! The core depends only on trait abstractions for anything that touches
//! the network or the host system:
//! - [`transport::Transport`] executes built requests
//! - [`monitor::SystemProbe`] samples host resources
//!
//! Concrete implementations are injected at runtime by the service crate.
//!
//! ## Usage
//!
//! ```rust
//! use sendflow_core::{fingerprint, RequestDescriptor};
//!
//! let descriptor = RequestDescriptor::get("https://api.example.com/items");
//! let id = fingerprint(&descriptor).unwrap();
//! assert_eq!(id.as_str().len(), 16);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// Re-export queue-level domain types used throughout the system
pub use sendflow_queue::{Priority, QueueItem, RequestId, Timestamp};

/// Standard result type for build operations
pub type BuildResult<T> = Result<T, BuildError>;

// ============================================================================
// Fingerprinting
// ============================================================================

/// Compute the stable identity of a descriptor.
///
/// The descriptor is rendered as canonical JSON (object keys sorted
/// recursively, absent optional fields omitted) and hashed with SHA-256;
/// the first sixteen hex characters form the [`RequestId`]. Two
/// structurally identical descriptors always produce the same id, which is
/// what makes response caching and deduplication work.
pub fn fingerprint(descriptor: &descriptor::RequestDescriptor) -> BuildResult<RequestId> {
    // serde_json maps are BTree-backed, so serializing through a Value
    // yields recursively sorted keys.
    let value = serde_json::to_value(descriptor)?;
    let canonical = serde_json::to_string(&value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    let id = hex::encode(digest)[..16].to_string();
    Ok(RequestId::new(id).expect("sha256 prefix is 16 hex characters"))
}

// ============================================================================
// Request Outcome
// ============================================================================

/// Terminal outcome of an orchestrated request, delivered through the
/// caller's result channel.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub request_id: RequestId,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: u32,
    pub result: Option<transport::TransportResult>,
    pub from_cache: bool,
}

impl RequestOutcome {
    /// Outcome for a request that completed at the transport
    pub fn completed(request_id: RequestId, attempts: u32, result: transport::TransportResult) -> Self {
        Self {
            request_id,
            success: result.success,
            error: result.error.clone(),
            attempts,
            result: Some(result),
            from_cache: false,
        }
    }

    /// Outcome served from the response cache without a transport call
    pub fn cached(request_id: RequestId, result: transport::TransportResult) -> Self {
        Self {
            request_id,
            success: result.success,
            error: result.error.clone(),
            attempts: 0,
            result: Some(result),
            from_cache: true,
        }
    }

    /// Terminal failure that never produced a transport result
    pub fn failed(request_id: RequestId, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            error: Some(error.into()),
            attempts,
            result: None,
            from_cache: false,
        }
    }
}

/// Payload carried by queue items: everything a worker needs to process
/// one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub descriptor: descriptor::RequestDescriptor,
    pub built: descriptor::BuiltRequest,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while transforming a descriptor into a built request.
///
/// Build errors are fail-fast: the descriptor is rejected before anything
/// is enqueued.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("URL must include scheme http or https: '{url}'")]
    UnsupportedScheme { url: String },

    #[error("URL is not valid: {message}")]
    InvalidUrl { message: String },

    #[error("Unresolved URL placeholder: {{{name}}}")]
    UnresolvedPlaceholder { name: String },

    #[error("Template '{name}' not found")]
    UnknownTemplate { name: String },

    #[error("Unknown transformation type: {name}")]
    UnknownTransformer { name: String },

    #[error("Unknown validator: {name}")]
    UnknownValidator { name: String },

    #[error("Validator '{name}' rejected request: {message}")]
    ValidatorRejected { name: String, message: String },

    #[error("Unknown custom auth handler: {name}")]
    UnknownAuthHandler { name: String },

    #[error("Credential shape invalid: {message}")]
    InvalidCredentials { message: String },

    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Body serialization failed: {message}")]
    BodySerialization { message: String },

    #[error("Transformation '{name}' failed: {message}")]
    TransformationFailed { name: String, message: String },

    #[error("Descriptor serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by monitoring components
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Alert handler failed: {message}")]
    Handler { message: String },

    #[error("Metrics export failed: {message}")]
    Export { message: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Request descriptor and built-request types
pub mod descriptor;

/// Request builder: templates, validation, auth, bodies, signing
pub mod builder;

/// Per-endpoint circuit breaker registry
pub mod circuit_breaker;

/// Metric registers: counters, gauges, histograms, time series
pub mod metrics;

/// Alert thresholds, lifecycle, and handler dispatch
pub mod alerts;

/// Monitor facade aggregating metrics and alerts
pub mod monitor;

/// Transport contract the orchestrator depends on
pub mod transport;

// Re-export key types for convenience
pub use alerts::{Alert, AlertHandler, AlertManager, AlertSeverity, Comparison};
pub use builder::RequestBuilder;
pub use circuit_breaker::{BreakerConfig, BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
pub use descriptor::{
    AuthConfig, BodyFormat, BuiltRequest, HttpMethod, RequestDescriptor, SigningAlgorithm,
    SigningConfig, Transformation,
};
pub use metrics::{MetricCollector, MetricKind, MetricStats};
pub use monitor::{
    HealthReport, HealthStatus, MetricsReport, Monitor, NoOpProbe, SystemProbe, SystemSample,
};
pub use transport::{ErrorKind, ResponseBody, Transport, TransportResult};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
