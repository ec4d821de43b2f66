//! Notification, email and SMS actions.
//!
//! Delivery is non-critical: when the transport fails (or reports a rejected
//! message), the action writes an internal record to the `notifications`
//! table instead and succeeds with `degraded: true`. Only a failure of that
//! fallback write propagates.

use std::sync::Arc;

use autoflow_types::record::NotificationPriority;
use autoflow_types::workflow::ActionKind;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use super::{ActionError, ActionExecutor, ActionRegistry, check_required, optional_str, required_str};
use crate::collaborator::{Datastore, MessageTransport, Notification, NotificationChannel, OutboundMessage};
use crate::context::ExecutionContext;

/// Table receiving degraded deliveries.
pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Write the fallback notification record.
async fn record_fallback(
    datastore: &dyn Datastore,
    ctx: &ExecutionContext,
    kind: ActionKind,
    message: String,
    recipient: Option<&str>,
    error: &str,
) -> Result<Value, ActionError> {
    tracing::warn!(
        execution_id = %ctx.execution_id(),
        action = %kind,
        error,
        "delivery failed, recording internal notification"
    );

    let record = json!({
        "message": message,
        "recipient": recipient,
        "type": format!("{kind}_failed"),
        "status": "undelivered",
        "error": error,
        "workflow_id": ctx.workflow_id().to_string(),
        "execution_id": ctx.execution_id().to_string(),
    });

    datastore
        .insert(NOTIFICATIONS_TABLE, record)
        .await
        .map_err(|source| ActionError::Record {
            operation: "create",
            table: NOTIFICATIONS_TABLE.to_string(),
            source,
        })
}

fn parse_priority(config: &Value) -> NotificationPriority {
    config
        .get("priority")
        .cloned()
        .and_then(|p| serde_json::from_value(p).ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// send_notification
// ---------------------------------------------------------------------------

pub struct SendNotification {
    channel: Arc<dyn NotificationChannel>,
    datastore: Arc<dyn Datastore>,
}

impl SendNotification {
    pub fn new(channel: Arc<dyn NotificationChannel>, datastore: Arc<dyn Datastore>) -> Self {
        Self { channel, datastore }
    }
}

impl ActionExecutor for SendNotification {
    fn kind(&self) -> ActionKind {
        ActionKind::SendNotification
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["message"]);
        if let Some(p) = config.get("priority") {
            if serde_json::from_value::<NotificationPriority>(p.clone()).is_err() {
                errors.push("'priority' must be one of low, normal, high, urgent".to_string());
            }
        }
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let notification = Notification {
                message: required_str(&config, "message", self.kind())?,
                title: optional_str(&config, "title"),
                recipient: optional_str(&config, "recipient"),
                priority: parse_priority(&config),
            };

            match self.channel.notify(&notification).await {
                Ok(()) => Ok(json!({"delivered": true, "recipient": notification.recipient})),
                Err(e) => {
                    let fallback = record_fallback(
                        self.datastore.as_ref(),
                        ctx,
                        self.kind(),
                        notification.message.clone(),
                        notification.recipient.as_deref(),
                        &e.to_string(),
                    )
                    .await?;
                    Ok(json!({"delivered": false, "degraded": true, "error": e.to_string(), "notification": fallback}))
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// send_email / send_sms
// ---------------------------------------------------------------------------

/// Email and SMS share one executor; only the kind, the transport and the
/// body field differ.
pub struct SendMessage {
    kind: ActionKind,
    transport: Arc<dyn MessageTransport>,
    datastore: Arc<dyn Datastore>,
}

impl SendMessage {
    pub fn email(transport: Arc<dyn MessageTransport>, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            kind: ActionKind::SendEmail,
            transport,
            datastore,
        }
    }

    pub fn sms(transport: Arc<dyn MessageTransport>, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            kind: ActionKind::SendSms,
            transport,
            datastore,
        }
    }

    fn build_message(&self, config: &Value) -> Result<OutboundMessage, ActionError> {
        let to = required_str(config, "to", self.kind)?;
        let message = match self.kind {
            ActionKind::SendEmail => OutboundMessage {
                to,
                subject: Some(required_str(config, "subject", self.kind)?),
                body: optional_str(config, "body")
                    .or_else(|| optional_str(config, "message"))
                    .unwrap_or_default(),
            },
            _ => OutboundMessage {
                to,
                subject: None,
                body: required_str(config, "message", self.kind)?,
            },
        };
        Ok(message)
    }
}

impl ActionExecutor for SendMessage {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        match self.kind {
            ActionKind::SendEmail => check_required(config, &["to", "subject"]),
            _ => check_required(config, &["to", "message"]),
        }
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let message = self.build_message(&config)?;

            let failure = match self.transport.send(&message).await {
                Ok(receipt) if receipt.success => {
                    tracing::info!(
                        execution_id = %ctx.execution_id(),
                        channel = self.transport.channel(),
                        to = %message.to,
                        "message sent"
                    );
                    return Ok(json!({"sent": true, "to": message.to, "message_id": receipt.message_id}));
                }
                Ok(receipt) => receipt
                    .error
                    .unwrap_or_else(|| "delivery rejected".to_string()),
                Err(e) => e.to_string(),
            };

            let summary = match &message.subject {
                Some(subject) => format!(
                    "{} to {} failed ({subject}): {failure}",
                    self.transport.channel(),
                    message.to
                ),
                None => format!("{} to {} failed: {failure}", self.transport.channel(), message.to),
            };
            let fallback = record_fallback(
                self.datastore.as_ref(),
                ctx,
                self.kind,
                summary,
                Some(&message.to),
                &failure,
            )
            .await?;

            Ok(json!({"sent": false, "degraded": true, "error": failure, "notification": fallback}))
        })
    }
}
