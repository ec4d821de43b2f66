//! Notification channels for the `send_notification` action.
//!
//! With `[notifications] push_url` set, notifications are POSTed there.
//! Otherwise they are stored as rows of the `notifications` table, which is
//! the in-app inbox read by the UI.

use std::sync::Arc;

use autoflow_core::action::delivery::NOTIFICATIONS_TABLE;
use autoflow_core::collaborator::{Datastore, Notification, NotificationChannel};
use autoflow_types::error::CollaboratorError;
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::json;

use crate::http::request_error;

/// POSTs each notification as JSON to a push endpoint.
pub struct PushNotificationChannel {
    client: reqwest::Client,
    url: String,
}

impl PushNotificationChannel {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

impl NotificationChannel for PushNotificationChannel {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(notification)
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CollaboratorError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        })
    }
}

/// Stores notifications in the `notifications` table of the datastore.
pub struct RecordNotificationChannel {
    datastore: Arc<dyn Datastore>,
}

impl RecordNotificationChannel {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

impl NotificationChannel for RecordNotificationChannel {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let row = json!({
                "message": notification.message,
                "title": notification.title,
                "recipient": notification.recipient,
                "priority": notification.priority.as_str(),
                "status": "unread",
                "sent_at": Utc::now().to_rfc3339(),
            });
            self.datastore.insert(NOTIFICATIONS_TABLE, row).await?;
            Ok(())
        })
    }
}
