//! Outbound HTTP interface used by the `webhook` action.

use std::collections::BTreeMap;

use autoflow_types::error::CollaboratorError;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Per-request timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, or the raw text as a JSON string.
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends HTTP requests. Implementations return `Ok` for any HTTP status;
/// status interpretation is left to the caller.
pub trait HttpClient: Send + Sync {
    fn send<'a>(&'a self, request: HttpRequest)
    -> BoxFuture<'a, Result<HttpResponse, CollaboratorError>>;
}
