//! Authentication for inbound `api_event` deliveries.
//!
//! A workflow's `trigger_config` may carry:
//! - `secret` -- HMAC-SHA256 over the raw body, hex-encoded in the
//!   `X-Autoflow-Signature` header (an optional `sha256=` prefix is accepted)
//! - `token` -- bearer token in the `Authorization` header
//!
//! When both are set, both must verify. All comparisons are constant-time.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-autoflow-signature";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiAuthError {
    #[error("signature verification failed")]
    InvalidSignature,

    #[error("bearer token verification failed")]
    InvalidToken,

    #[error("missing authentication: {0}")]
    Missing(&'static str),

    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Verify a hex HMAC-SHA256 signature (optionally `sha256=`-prefixed) of `body`.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> Result<(), ApiAuthError> {
    let hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hex_decode(hex).ok_or(ApiAuthError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ApiAuthError::InvalidKey(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ApiAuthError::InvalidSignature)
}

/// Compare a bearer token (with or without the `Bearer ` prefix).
pub fn verify_bearer(expected: &str, provided: &str) -> Result<(), ApiAuthError> {
    let token = provided.strip_prefix("Bearer ").unwrap_or(provided);
    if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
        Ok(())
    } else {
        Err(ApiAuthError::InvalidToken)
    }
}

/// Hex HMAC-SHA256 of `body`; used by clients signing their deliveries.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, ApiAuthError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ApiAuthError::InvalidKey(e.to_string()))?;
    mac.update(body);
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// XOR-accumulating comparison; time does not depend on where bytes differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Per-workflow policy
// ---------------------------------------------------------------------------

/// Authentication requirements of one `api_event` workflow.
#[derive(Debug, Clone, Default)]
pub struct EventAuth {
    secret: Option<String>,
    token: Option<String>,
}

impl EventAuth {
    pub fn from_trigger_config(config: &Value) -> Self {
        let read = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            secret: read("secret"),
            token: read("token"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.secret.is_none() && self.token.is_none()
    }

    /// Check a delivery given its raw body and the relevant header values.
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<(), ApiAuthError> {
        if let Some(secret) = &self.secret {
            let signature = signature.ok_or(ApiAuthError::Missing("X-Autoflow-Signature header"))?;
            verify_signature(secret.as_bytes(), body, signature)?;
        }
        if let Some(token) = &self.token {
            let provided = authorization.ok_or(ApiAuthError::Missing("Authorization header"))?;
            verify_bearer(token, provided)?;
        }
        Ok(())
    }
}
