//! Request builder: descriptor → built request.
//!
//! The builder owns registries for templates, transformers, validators,
//! and custom auth handlers, and runs the full construction pipeline:
//!
//! 1. template merge (descriptor wins on scalar conflicts)
//! 2. validation (scheme, declared validators)
//! 3. URL assembly (placeholder substitution, query merge)
//! 4. header derivation (defaults, content type from body format)
//! 5. authentication injection
//! 6. body serialization for body-carrying methods
//! 7. transformation pipeline, in declaration order
//! 8. HMAC request signing
//!
//! Every failure is a [`BuildError`] raised before anything is enqueued.

use crate::descriptor::{BuiltRequest, RequestDescriptor};
use crate::{BuildError, BuildResult};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

pub mod auth;
pub mod body;
pub mod signing;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// User agent attached to every request unless overridden
pub const DEFAULT_USER_AGENT: &str = "NetworkAutomation/1.0";

/// Fallback timeout when neither the descriptor nor the builder sets one
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;

/// Transformation applied to a built request; receives the transformation's
/// configuration value.
pub type TransformerFn =
    dyn Fn(&mut BuiltRequest, &serde_json::Value) -> Result<(), String> + Send + Sync;

/// Descriptor validator; returns a rejection message on failure.
pub type ValidatorFn = dyn Fn(&RequestDescriptor) -> Result<(), String> + Send + Sync;

/// Custom auth handler; receives the mutable headers and URL plus the
/// credentials value from the descriptor.
pub type AuthHandlerFn = dyn Fn(&mut BTreeMap<String, String>, &mut String, &serde_json::Value) -> Result<(), String>
    + Send
    + Sync;

// ============================================================================
// RequestBuilder
// ============================================================================

/// Builds concrete requests from descriptors.
///
/// Registries are populated during setup; [`build`](Self::build) itself
/// takes `&self` and is safe to share behind an `Arc`.
pub struct RequestBuilder {
    templates: HashMap<String, serde_json::Value>,
    transformers: HashMap<String, Arc<TransformerFn>>,
    validators: HashMap<String, Arc<ValidatorFn>>,
    auth_handlers: HashMap<String, Arc<AuthHandlerFn>>,
    base_headers: BTreeMap<String, String>,
    default_timeout_seconds: f64,
    placeholder: Regex,
}

impl RequestBuilder {
    /// Create a builder with the default transformers and validators installed
    pub fn new() -> Self {
        let mut base_headers = BTreeMap::new();
        base_headers.insert("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string());

        let mut builder = Self {
            templates: HashMap::new(),
            transformers: HashMap::new(),
            validators: HashMap::new(),
            auth_handlers: HashMap::new(),
            base_headers,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            placeholder: Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"),
        };
        builder.install_default_transformers();
        builder.install_default_validators();
        builder
    }

    /// Add a header applied to every built request (descriptor headers win)
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_headers.insert(name.into(), value.into());
        self
    }

    /// Override the fallback timeout
    pub fn with_default_timeout(mut self, seconds: f64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    /// Register a request template by name.
    ///
    /// Templates are partial descriptors in JSON form; a descriptor naming
    /// the template is merged over it, winning on conflicts.
    pub fn register_template(&mut self, name: impl Into<String>, template: serde_json::Value) {
        self.templates.insert(name.into(), template);
    }

    /// Register a custom transformer
    pub fn register_transformer<F>(&mut self, name: impl Into<String>, transformer: F)
    where
        F: Fn(&mut BuiltRequest, &serde_json::Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.transformers.insert(name.into(), Arc::new(transformer));
    }

    /// Register a custom validator
    pub fn register_validator<F>(&mut self, name: impl Into<String>, validator: F)
    where
        F: Fn(&RequestDescriptor) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Arc::new(validator));
    }

    /// Register a custom auth handler invoked by the `custom` auth variant
    pub fn register_auth_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut BTreeMap<String, String>, &mut String, &serde_json::Value) -> Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        self.auth_handlers.insert(name.into(), Arc::new(handler));
    }

    /// Build a request from a descriptor.
    ///
    /// # Errors
    ///
    /// Any malformed input, unknown template, unknown transformer,
    /// unknown or failed validator, or invalid credential shape raises a
    /// [`BuildError`]; nothing is partially built.
    pub fn build(&self, descriptor: &RequestDescriptor) -> BuildResult<BuiltRequest> {
        let descriptor = self.apply_template(descriptor)?;
        self.validate(&descriptor)?;

        let mut url = self.assemble_url(&descriptor)?;
        let mut headers = self.assemble_headers(&descriptor);

        if let Some(auth) = &descriptor.auth {
            auth::apply(auth, &mut headers, &mut url, &self.auth_handlers)?;
        }

        let body = if descriptor.method.has_body() {
            body::serialize_body(&descriptor)?
        } else {
            None
        };

        let mut request = BuiltRequest {
            method: descriptor.method,
            url,
            headers,
            body,
            timeout_seconds: descriptor.timeout.unwrap_or(self.default_timeout_seconds),
        };

        for transformation in &descriptor.transformations {
            let transformer = self.transformers.get(&transformation.name).ok_or_else(|| {
                BuildError::UnknownTransformer {
                    name: transformation.name.clone(),
                }
            })?;
            transformer(&mut request, &transformation.config).map_err(|message| {
                BuildError::TransformationFailed {
                    name: transformation.name.clone(),
                    message,
                }
            })?;
        }

        if let Some(signing) = &descriptor.signing {
            signing::sign(&mut request, signing)?;
        }

        Ok(request)
    }

    /// Build multiple descriptors, failing on the first error
    pub fn build_batch(&self, descriptors: &[RequestDescriptor]) -> BuildResult<Vec<BuiltRequest>> {
        descriptors.iter().map(|d| self.build(d)).collect()
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    fn apply_template(&self, descriptor: &RequestDescriptor) -> BuildResult<RequestDescriptor> {
        let Some(name) = &descriptor.template else {
            return Ok(descriptor.clone());
        };
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| BuildError::UnknownTemplate { name: name.clone() })?;

        let mut merged = template.clone();
        let mut overlay = serde_json::to_value(descriptor)?;
        if let serde_json::Value::Object(map) = &mut overlay {
            map.remove("template");
        }

        merge_into(&mut merged, overlay);
        Ok(serde_json::from_value(merged)?)
    }

    fn validate(&self, descriptor: &RequestDescriptor) -> BuildResult<()> {
        for name in &descriptor.validators {
            let validator = self
                .validators
                .get(name)
                .ok_or_else(|| BuildError::UnknownValidator { name: name.clone() })?;
            validator(descriptor).map_err(|message| BuildError::ValidatorRejected {
                name: name.clone(),
                message,
            })?;
        }
        Ok(())
    }

    fn assemble_url(&self, descriptor: &RequestDescriptor) -> BuildResult<String> {
        let mut url = descriptor.url.clone();
        for (key, value) in &descriptor.url_params {
            url = url.replace(&format!("{{{}}}", key), value);
        }

        if let Some(unresolved) = self.placeholder.captures(&url) {
            return Err(BuildError::UnresolvedPlaceholder {
                name: unresolved[1].to_string(),
            });
        }

        let mut parsed = Url::parse(&url).map_err(|error| BuildError::InvalidUrl {
            message: error.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BuildError::UnsupportedScheme { url });
        }

        if !descriptor.params.is_empty() {
            // Merged keys replace existing values; list values are repeated
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .filter(|(k, _)| !descriptor.params.contains_key(k))
                .collect();
            let mut pairs = parsed.query_pairs_mut();
            pairs.clear();
            for (key, value) in &kept {
                pairs.append_pair(key, value);
            }
            for (key, value) in &descriptor.params {
                for item in value.values() {
                    pairs.append_pair(key, item);
                }
            }
            drop(pairs);
        }

        Ok(parsed.to_string())
    }

    fn assemble_headers(&self, descriptor: &RequestDescriptor) -> BTreeMap<String, String> {
        let mut headers = self.base_headers.clone();
        for (name, value) in &descriptor.headers {
            headers.insert(name.clone(), value.clone());
        }

        if descriptor.body.is_some() && !headers.contains_key("Content-Type") {
            if let Some(content_type) = descriptor.body_format.content_type() {
                headers.insert("Content-Type".to_string(), content_type.to_string());
            }
        }

        headers
    }

    // ------------------------------------------------------------------
    // Default registrations
    // ------------------------------------------------------------------

    fn install_default_transformers(&mut self) {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        self.register_transformer("encrypt_body", |request, _config| {
            if let Some(body) = &request.body {
                request.body = Some(STANDARD.encode(body.as_bytes()));
                request
                    .headers
                    .insert("X-Encrypted".to_string(), "true".to_string());
            }
            Ok(())
        });

        self.register_transformer("add_timestamp", |request, config| {
            let format = config
                .get("format")
                .and_then(|v| v.as_str())
                .unwrap_or("%Y-%m-%dT%H:%M:%SZ");
            request.headers.insert(
                "X-Timestamp".to_string(),
                chrono::Utc::now().format(format).to_string(),
            );
            Ok(())
        });

        self.register_transformer("add_request_id", |request, _config| {
            request.headers.insert(
                "X-Request-ID".to_string(),
                uuid::Uuid::new_v4().to_string(),
            );
            Ok(())
        });
    }

    fn install_default_validators(&mut self) {
        self.register_validator("required_headers", |descriptor| {
            for header in &descriptor.required_headers {
                if !descriptor.headers.contains_key(header) {
                    return Err(format!("Required header missing: {}", header));
                }
            }
            Ok(())
        });

        self.register_validator("json_schema", |descriptor| {
            if let (Some(body), Some(schema)) = (&descriptor.body, &descriptor.json_schema) {
                if !jsonschema::is_valid(schema, body) {
                    return Err("JSON schema validation failed".to_string());
                }
            }
            Ok(())
        });
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `overlay` into `target`: nested objects merge one level deep with
/// the overlay winning per key, everything else replaces wholesale.
fn merge_into(target: &mut serde_json::Value, overlay: serde_json::Value) {
    let (serde_json::Value::Object(target_map), serde_json::Value::Object(overlay_map)) =
        (target, overlay)
    else {
        return;
    };

    for (key, value) in overlay_map {
        let incoming = match value {
            serde_json::Value::Object(incoming)
                if matches!(target_map.get(&key), Some(serde_json::Value::Object(_))) =>
            {
                incoming
            }
            other => {
                target_map.insert(key, other);
                continue;
            }
        };

        if let Some(serde_json::Value::Object(existing)) = target_map.get_mut(&key) {
            for (nested_key, nested_value) in incoming {
                existing.insert(nested_key, nested_value);
            }
        }
    }
}
