//! Action dispatcher and action library.
//!
//! - `registry` -- closed dispatch table keyed by `ActionKind`, retry policy
//! - `record` -- create/update/delete/query against the datastore
//! - `delivery` -- notification, email and SMS with degraded fallback
//! - `outbound` -- webhook and AI agent calls
//! - `control` -- wait, conditional and loop
//! - `utility` -- log, set_variable and calculate

pub mod control;
pub mod delivery;
pub mod outbound;
pub mod record;
pub mod registry;
pub mod utility;

use std::sync::Arc;

use autoflow_types::error::CollaboratorError;
use autoflow_types::workflow::{Action, ActionKind};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::collaborator::{
    AgentClient, Datastore, HttpClient, MessageTransport, NotificationChannel,
};
use crate::condition::ConditionError;
use crate::context::ExecutionContext;

pub use registry::ActionRegistry;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while executing a single action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid {kind} config: {message}")]
    InvalidConfig { kind: ActionKind, message: String },

    #[error("{operation} on table '{table}' failed: {source}")]
    Record {
        operation: &'static str,
        table: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("webhook {method} {url} returned HTTP {status}: {body}")]
    WebhookStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("agent '{agent}' failed: {source}")]
    Agent {
        agent: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("nested action {index} ({kind}) failed: {source}")]
    Nested {
        index: usize,
        kind: ActionKind,
        #[source]
        source: Box<ActionError>,
    },

    #[error("expression error: {0}")]
    Expression(#[from] ConditionError),

    #[error("no executor registered for '{0}'")]
    Unregistered(ActionKind),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ActionError {
    pub fn invalid(kind: ActionKind, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            kind,
            message: message.into(),
        }
    }

    /// Config problems will not go away on a second attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig { .. } | Self::Unregistered(_) | Self::Expression(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// One implementation per action kind.
///
/// `execute` receives the already-interpolated config (nested action lists
/// excepted) and the mutable execution context. Control-flow executors use
/// the registry to dispatch their nested actions.
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Static schema check of a raw (un-interpolated) config.
    fn validate(&self, config: &Value, registry: &ActionRegistry) -> Vec<String>;

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>>;
}

/// Collaborators shared by the built-in executors.
#[derive(Clone)]
pub struct ActionServices {
    pub datastore: Arc<dyn Datastore>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub email: Arc<dyn MessageTransport>,
    pub sms: Arc<dyn MessageTransport>,
    pub http: Arc<dyn HttpClient>,
    pub agent: Arc<dyn AgentClient>,
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Fetch a required non-empty string field. Numbers are accepted and
/// rendered as text (ids often arrive as numbers from templates).
pub(crate) fn required_str(
    config: &Value,
    key: &str,
    kind: ActionKind,
) -> Result<String, ActionError> {
    optional_str(config, key).ok_or_else(|| ActionError::invalid(kind, format!("'{key}' is required")))
}

pub(crate) fn optional_str(config: &Value, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient unsigned integer read: numbers or numeric strings.
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64),
        _ => None,
    }
}

/// Parse a nested action list. A missing key yields an empty list.
pub(crate) fn nested_actions(
    config: &Value,
    key: &str,
    kind: ActionKind,
) -> Result<Vec<Action>, ActionError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ActionError::invalid(kind, format!("'{key}' is not a valid action list: {e}"))),
    }
}

/// Schema check shared by most executors: required string fields present.
pub(crate) fn check_required(config: &Value, keys: &[&str]) -> Vec<String> {
    let mut errors = Vec::new();
    if !config.is_object() {
        errors.push("config must be an object".to_string());
        return errors;
    }
    for key in keys {
        if optional_str(config, key).is_none() {
            errors.push(format!("'{key}' is required"));
        }
    }
    errors
}

/// Schema check for an optional object-valued field.
pub(crate) fn check_object(config: &Value, key: &str) -> Option<String> {
    match config.get(key) {
        None | Some(Value::Null) | Some(Value::Object(_)) => None,
        // A sole template token may expand to an object at run time.
        Some(Value::String(s)) if s.contains("{{") => None,
        Some(_) => Some(format!("'{key}' must be an object")),
    }
}
