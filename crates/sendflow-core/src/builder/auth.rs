//! Authentication injection for built requests.

use super::AuthHandlerFn;
use crate::descriptor::{ApiKeyPlacement, AuthConfig};
use crate::{BuildError, BuildResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

/// Seconds a self-signed JWT stays valid when the payload carries no `exp`
const JWT_DEFAULT_TTL_SECONDS: i64 = 3600;

/// Apply the descriptor's auth block to the request headers and URL
pub(crate) fn apply(
    auth: &AuthConfig,
    headers: &mut BTreeMap<String, String>,
    url: &mut String,
    handlers: &HashMap<String, Arc<AuthHandlerFn>>,
) -> BuildResult<()> {
    match auth {
        AuthConfig::Basic { username, password } => {
            let credentials = STANDARD.encode(format!("{}:{}", username, password));
            headers.insert("Authorization".to_string(), format!("Basic {}", credentials));
        }

        AuthConfig::Bearer { token } => {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        AuthConfig::ApiKey {
            key_name,
            key_value,
            placement,
        } => match placement {
            ApiKeyPlacement::Header => {
                headers.insert(key_name.clone(), key_value.clone());
            }
            ApiKeyPlacement::Query => {
                *url = merge_query_key(url, key_name, key_value)?;
            }
        },

        AuthConfig::Oauth2 { access_token } => {
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", access_token),
            );
        }

        AuthConfig::Jwt {
            payload,
            secret,
            algorithm,
        } => {
            let token = sign_jwt(payload, secret, *algorithm)?;
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        AuthConfig::Custom {
            handler,
            credentials,
        } => {
            let handler_fn = handlers.get(handler).ok_or_else(|| {
                BuildError::UnknownAuthHandler {
                    name: handler.clone(),
                }
            })?;
            handler_fn(headers, url, credentials)
                .map_err(|message| BuildError::InvalidCredentials { message })?;
        }
    }

    Ok(())
}

fn sign_jwt(
    payload: &serde_json::Map<String, serde_json::Value>,
    secret: &str,
    algorithm: crate::descriptor::JwtAlgorithm,
) -> BuildResult<String> {
    let mut claims = payload.clone();
    let now = chrono::Utc::now().timestamp();
    claims
        .entry("iat".to_string())
        .or_insert_with(|| serde_json::Value::from(now));
    claims
        .entry("exp".to_string())
        .or_insert_with(|| serde_json::Value::from(now + JWT_DEFAULT_TTL_SECONDS));

    let header = jsonwebtoken::Header::new(algorithm.to_jsonwebtoken());
    let key = jsonwebtoken::EncodingKey::from_secret(secret.as_bytes());
    Ok(jsonwebtoken::encode(&header, &claims, &key)?)
}

/// Set `key=value` in the URL's query string, replacing any existing values
fn merge_query_key(url: &str, key: &str, value: &str) -> BuildResult<String> {
    let mut parsed = Url::parse(url).map_err(|error| BuildError::InvalidUrl {
        message: error.to_string(),
    })?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| k != key)
        .collect();

    let mut pairs = parsed.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
    drop(pairs);

    Ok(parsed.to_string())
}
