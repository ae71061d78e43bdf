//! Transport contract.
//!
//! The orchestrator's sole dependency on the HTTP layer is the
//! [`Transport`] trait: execute a built request, return a normalized
//! result. Transport-level errors, timeouts, and non-success statuses are
//! all folded into the result rather than raised, so the retry loop treats
//! them uniformly.

use crate::descriptor::BuiltRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parsed response payload, classified by content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "data", rename_all = "lowercase")]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

/// Custom serialization for binary payloads
mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        general_purpose::STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Broad classification of a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ClientError,
    Unknown,
}

/// Response metadata surfaced alongside the parsed body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// One hop of a followed redirect chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub status: u16,
    pub url: String,
}

/// Normalized result of a transport send.
///
/// `success` reflects both connectivity and HTTP status: statuses in
/// `200..400` are successful, everything else feeds the retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub body: Option<ResponseBody>,
    pub url: String,
    pub method: String,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirects: Option<Vec<Redirect>>,
}

impl TransportResult {
    /// A failed send that never produced a usable response
    pub fn failure(
        request: &BuiltRequest,
        duration: f64,
        error: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        Self {
            success: false,
            status_code: None,
            headers: None,
            body: None,
            url: request.url.clone(),
            method: request.method.as_str().to_string(),
            duration,
            error: Some(error.into()),
            error_kind: Some(kind),
            metadata: None,
            redirects: None,
        }
    }
}

/// Capability to execute built requests.
///
/// Implementations own connection pooling, TLS, and socket I/O; the core
/// treats them as opaque.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &BuiltRequest) -> TransportResult;
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
