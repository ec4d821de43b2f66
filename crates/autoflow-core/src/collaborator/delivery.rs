//! Notification, email and SMS delivery interfaces.

use autoflow_types::error::CollaboratorError;
use autoflow_types::record::{DeliveryReceipt, NotificationPriority};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// An in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub priority: NotificationPriority,
}

/// Delivers notifications to users (push endpoint, notification table, ...).
pub trait NotificationChannel: Send + Sync {
    fn notify<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// An email or SMS message. `subject` is ignored by SMS transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

/// Email or SMS provider.
///
/// A transport may fail outright (`Err`) or report a rejected delivery
/// (`Ok` with `success: false`); the delivery actions treat both the same.
pub trait MessageTransport: Send + Sync {
    /// Short label used in logs and degraded notifications ("email", "sms").
    fn channel(&self) -> &str;

    fn send<'a>(
        &'a self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>>;
}
