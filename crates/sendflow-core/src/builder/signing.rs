//! HMAC request signing.
//!
//! The signature base string is `method \n url \n unix_seconds`, with the
//! body appended as a fourth line when configured. The hex digest lands in
//! `X-Signature` and the timestamp used in `X-Timestamp`, so receivers can
//! recompute the exact base string.

use crate::descriptor::{BuiltRequest, SigningAlgorithm, SigningConfig};
use crate::{BuildError, BuildResult};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;

/// Sign the request in place
pub(crate) fn sign(request: &mut BuiltRequest, config: &SigningConfig) -> BuildResult<()> {
    let timestamp = chrono::Utc::now().timestamp();

    let mut parts = vec![
        request.method.as_str().to_string(),
        request.url.clone(),
        timestamp.to_string(),
    ];
    if config.include_body {
        if let Some(body) = &request.body {
            parts.push(body.clone());
        }
    }
    let base = parts.join("\n");

    let signature = compute_signature(&base, &config.secret, config.algorithm)?;
    request
        .headers
        .insert("X-Signature".to_string(), signature);
    request
        .headers
        .insert("X-Timestamp".to_string(), timestamp.to_string());
    Ok(())
}

fn compute_signature(
    base: &str,
    secret: &str,
    algorithm: SigningAlgorithm,
) -> BuildResult<String> {
    match algorithm {
        SigningAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| {
                BuildError::InvalidCredentials {
                    message: "secret cannot be used as HMAC key".to_string(),
                }
            })?;
            mac.update(base.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        SigningAlgorithm::HmacSha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).map_err(|_| {
                BuildError::InvalidCredentials {
                    message: "secret cannot be used as HMAC key".to_string(),
                }
            })?;
            mac.update(base.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
    }
}
