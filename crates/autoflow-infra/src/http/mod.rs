//! reqwest-backed implementations of the outbound collaborator traits.
//!
//! - `client` -- generic `HttpClient` used by the `webhook` action
//! - `agent` -- `AgentClient` for the external AI agent service
//! - `transport` -- email/SMS providers reached over HTTP
//!
//! API keys are wrapped in [`secrecy::SecretString`] and only exposed when
//! building the `Authorization` header.

pub mod agent;
pub mod client;
pub mod transport;

use std::time::Duration;

use autoflow_types::config::HttpConfig;
use autoflow_types::error::CollaboratorError;
use serde_json::Value;

pub use agent::{DisabledAgent, HttpAgentClient};
pub use client::ReqwestHttpClient;
pub use transport::{DisabledTransport, HttpMessageTransport};

/// Build the shared `reqwest::Client` from `[http]` settings.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| CollaboratorError::Request(format!("failed to create HTTP client: {e}")))
}

/// Parse a response body as JSON, keeping non-JSON text as a JSON string.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Map a transport-level reqwest failure.
pub(crate) fn request_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Request(format!("request timed out: {e}"))
    } else {
        CollaboratorError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"ok": true}"#), json!({"ok": true}));
        assert_eq!(parse_body("plain text"), json!("plain text"));
        assert_eq!(parse_body("  "), Value::Null);
    }

    #[test]
    fn test_build_client_from_defaults() {
        assert!(build_client(&HttpConfig::default()).is_ok());
    }
}
