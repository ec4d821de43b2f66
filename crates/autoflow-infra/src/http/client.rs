//! Generic outbound HTTP client for the `webhook` action.

use std::collections::BTreeMap;
use std::time::Duration;

use autoflow_core::collaborator::{HttpClient, HttpRequest, HttpResponse};
use autoflow_types::error::CollaboratorError;
use futures_util::future::BoxFuture;

use super::{parse_body, request_error};

/// `HttpClient` over a shared `reqwest::Client`. Any HTTP status is returned
/// as `Ok`; only transport failures are errors.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, CollaboratorError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CollaboratorError::Request(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(secs) = request.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder)
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, CollaboratorError>> {
        Box::pin(async move {
            let builder = self.build(&request)?;
            tracing::debug!(method = %request.method, url = %request.url, "sending webhook request");

            let response = builder.send().await.map_err(request_error)?;
            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
                })
                .collect();
            let text = response.text().await.map_err(request_error)?;

            Ok(HttpResponse {
                status,
                headers,
                body: parse_body(&text),
            })
        })
    }
}
