//! Request descriptor and built-request types.
//!
//! The descriptor is the caller-facing structure describing what to send.
//! It is polymorphic over authentication kinds, body formats, and
//! transformations; each of those is modeled as a tagged variant with an
//! enumerated option set so that validation happens at the deserialization
//! boundary rather than deep inside the builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;

// ============================================================================
// HTTP Method
// ============================================================================

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Get uppercase wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether a body is serialized for this method
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("Invalid method: {}", other)),
        }
    }
}

// ============================================================================
// Body Format
// ============================================================================

/// Serialization format for request bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Json,
    Xml,
    Form,
    Multipart,
    Yaml,
    Text,
    Raw,
}

impl BodyFormat {
    /// Content type derived from the format, if one is defined for it
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json => Some("application/json"),
            Self::Xml => Some("application/xml"),
            Self::Form => Some("application/x-www-form-urlencoded"),
            Self::Multipart => Some("multipart/form-data"),
            Self::Yaml => Some("application/x-yaml"),
            Self::Text => Some("text/plain"),
            Self::Raw => None,
        }
    }
}

impl Default for BodyFormat {
    fn default() -> Self {
        Self::Json
    }
}

fn is_default_format(format: &BodyFormat) -> bool {
    *format == BodyFormat::Json
}

fn is_default_method(method: &HttpMethod) -> bool {
    *method == HttpMethod::Get
}

// ============================================================================
// Authentication
// ============================================================================

/// Where an API key is placed on the outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyPlacement {
    Header,
    Query,
}

impl Default for ApiKeyPlacement {
    fn default() -> Self {
        Self::Header
    }
}

/// JWT signing algorithms supported by the `jwt` auth variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    #[serde(rename = "HS256")]
    Hs256,
    #[serde(rename = "HS384")]
    Hs384,
    #[serde(rename = "HS512")]
    Hs512,
}

impl JwtAlgorithm {
    pub fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Hs256 => jsonwebtoken::Algorithm::HS256,
            Self::Hs384 => jsonwebtoken::Algorithm::HS384,
            Self::Hs512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

impl Default for JwtAlgorithm {
    fn default() -> Self {
        Self::Hs256
    }
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

/// Authentication block of a descriptor, dispatched on `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// HTTP Basic: base64 of `user:pass`
    Basic { username: String, password: String },

    /// Bearer token placed verbatim in `Authorization`
    Bearer { token: String },

    /// Named key placed in a header or merged into the query string
    ApiKey {
        #[serde(default = "default_api_key_name")]
        key_name: String,
        key_value: String,
        #[serde(default)]
        placement: ApiKeyPlacement,
    },

    /// Pre-acquired OAuth2 access token attached as bearer.
    /// Token acquisition is the caller's concern.
    Oauth2 { access_token: String },

    /// Self-signed JWT with `iat` and `exp` auto-injected when absent
    Jwt {
        #[serde(default)]
        payload: serde_json::Map<String, serde_json::Value>,
        secret: String,
        #[serde(default)]
        algorithm: JwtAlgorithm,
    },

    /// Handler registered on the builder by name
    Custom {
        handler: String,
        #[serde(default)]
        credentials: serde_json::Value,
    },
}

// ============================================================================
// Signing
// ============================================================================

/// HMAC algorithms supported for request signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    #[serde(rename = "HMAC-SHA512")]
    HmacSha512,
}

impl Default for SigningAlgorithm {
    fn default() -> Self {
        Self::HmacSha256
    }
}

fn default_include_body() -> bool {
    true
}

/// Request signing block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub algorithm: SigningAlgorithm,
    pub secret: String,
    #[serde(default = "default_include_body")]
    pub include_body: bool,
}

// ============================================================================
// Transformations and Parameters
// ============================================================================

/// A named transformation applied to the built request, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl Transformation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: serde_json::Value::Null,
        }
    }
}

/// A query parameter value: single, or repeated for list values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// Values in declaration order
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// Caller-supplied description of an outbound request.
///
/// Map fields use ordered maps so the canonical JSON rendering used for
/// fingerprinting is stable under key reordering; optional fields are
/// omitted from that rendering entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    #[serde(default, skip_serializing_if = "is_default_method")]
    pub method: HttpMethod,

    pub url: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "is_default_format")]
    pub body_format: BodyFormat,

    /// Values substituted into `{name}` placeholders in the URL path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub url_params: BTreeMap<String, String>,

    /// Query parameters merged into the URL's existing query string
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Per-request timeout in seconds, falling back to the system default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Names of registered validators that must accept this descriptor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<String>,

    /// Headers that must be present, checked by the `required_headers` validator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_headers: Vec<String>,

    /// Schema the body must satisfy, checked by the `json_schema` validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

impl RequestDescriptor {
    /// A plain GET descriptor for the given URL
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            body_format: BodyFormat::default(),
            url_params: BTreeMap::new(),
            params: BTreeMap::new(),
            auth: None,
            template: None,
            transformations: Vec::new(),
            signing: None,
            partition: None,
            timeout: None,
            validators: Vec::new(),
            required_headers: Vec::new(),
            json_schema: None,
        }
    }

    /// A POST descriptor with a JSON body
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        let mut descriptor = Self::get(url);
        descriptor.method = HttpMethod::Post;
        descriptor.body = Some(body);
        descriptor
    }

    /// Set the method
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the auth block
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the partition tag
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Set the per-request timeout in seconds
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

// ============================================================================
// Built Request
// ============================================================================

/// The normalized, validated, authenticated, possibly signed request handed
/// to the transport. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub timeout_seconds: f64,
}

impl BuiltRequest {
    /// The request URL without its query string; the unit of circuit breaking
    pub fn endpoint(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    /// Effective timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}
