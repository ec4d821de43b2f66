//! Email and SMS providers reached through a JSON HTTP endpoint.

use autoflow_core::collaborator::{MessageTransport, OutboundMessage};
use autoflow_types::config::TransportConfig;
use autoflow_types::error::CollaboratorError;
use autoflow_types::record::DeliveryReceipt;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{parse_body, request_error};

/// POSTs `{to, from, subject, body}` to the configured provider URL.
///
/// 2xx responses are deliveries (the provider's `id`/`message_id` becomes the
/// receipt id), 4xx responses are rejections, and 5xx responses or
/// connection failures are errors.
pub struct HttpMessageTransport {
    channel: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
    from: Option<String>,
}

impl HttpMessageTransport {
    pub fn new(channel: impl Into<String>, client: reqwest::Client, config: &TransportConfig) -> Self {
        Self {
            channel: channel.into(),
            client,
            url: config.url.clone(),
            api_key: config.api_key.as_deref().map(|k| SecretString::from(k.to_string())),
            from: config.from.clone(),
        }
    }

    fn payload(&self, message: &OutboundMessage) -> Value {
        json!({
            "to": message.to,
            "from": self.from,
            "subject": message.subject,
            "body": message.body,
        })
    }
}

/// Interpret a provider response.
fn receipt_from_response(status: u16, body: &Value) -> Result<DeliveryReceipt, CollaboratorError> {
    match status {
        200..=299 => {
            let id = ["message_id", "messageId", "id"]
                .iter()
                .find_map(|key| match body.get(*key) {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_default();
            Ok(DeliveryReceipt::delivered(id))
        }
        400..=499 => {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("provider rejected message (HTTP {status})"));
            Ok(DeliveryReceipt::rejected(reason))
        }
        _ => Err(CollaboratorError::Status {
            status,
            body: body.to_string(),
        }),
    }
}

impl MessageTransport for HttpMessageTransport {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn send<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>> {
        Box::pin(async move {
            let mut builder = self.client.post(&self.url).json(&self.payload(message));
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key.expose_secret());
            }

            let response = builder.send().await.map_err(request_error)?;
            let status = response.status().as_u16();
            let text = response.text().await.map_err(request_error)?;
            let receipt = receipt_from_response(status, &parse_body(&text))?;

            tracing::debug!(channel = %self.channel, status, success = receipt.success, "message handed to provider");
            Ok(receipt)
        })
    }
}

/// Transport used when the channel has no configuration. Always fails with
/// `NotConfigured`, which the delivery actions turn into a degraded
/// notification.
pub struct DisabledTransport {
    channel: String,
}

impl DisabledTransport {
    pub fn new(channel: impl Into<String>) -> Self {
        Self { channel: channel.into() }
    }
}

impl MessageTransport for DisabledTransport {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn send<'a>(&'a self, _message: &'a OutboundMessage) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>> {
        Box::pin(async move { Err(CollaboratorError::NotConfigured(format!("{} transport", self.channel))) })
    }
}
