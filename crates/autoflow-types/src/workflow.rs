//! Workflow definition types for Autoflow.
//!
//! A `Workflow` is one trigger plus an ordered list of `Action`s. Definitions
//! are authored externally (YAML/JSON files, the REST API) and are read-only
//! to the execution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A persisted automation definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Which event source starts this workflow.
    pub trigger_type: TriggerType,
    /// Trigger-specific settings, interpreted by the trigger subsystem.
    #[serde(default = "empty_object")]
    pub trigger_config: serde_json::Value,
    /// Actions executed strictly in declared order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Disabled workflows never get a live trigger and refuse to execute.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_enabled() -> bool {
    true
}

/// The event source that starts a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Row insert/update/delete on a datastore table.
    DatabaseEvent,
    /// Fixed interval, daily time, or cron expression.
    Scheduled,
    /// Explicit invocation by a user or the CLI.
    Manual,
    /// Inbound HTTP event delivered through the REST API.
    ApiEvent,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseEvent => "database_event",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::ApiEvent => "api_event",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database_event" => Ok(Self::DatabaseEvent),
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            "api_event" => Ok(Self::ApiEvent),
            other => Err(format!("unknown trigger type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One declarative step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Dispatcher registry key.
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Optional label; results are also exposed under `results.<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kind-specific settings. String values may contain `{{path}}` tokens.
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
    /// Error policy. `None` behaves like `Stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,
    /// Extra attempts when `on_error` is `Retry`.
    #[serde(default)]
    pub retry_count: u32,
}

impl Action {
    /// Build an action with default policy; used mostly by tests and SDK-style callers.
    pub fn new(kind: ActionKind, config: serde_json::Value) -> Self {
        Self {
            kind,
            name: None,
            config,
            on_error: None,
            retry_count: 0,
        }
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Effective policy with the unset case folded into `Stop`.
    pub fn error_policy(&self) -> OnError {
        self.on_error.unwrap_or(OnError::Stop)
    }
}

/// Per-action error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Log the failure and move on to the next action.
    Continue,
    /// Abort the execution as failed.
    Stop,
    /// Re-run the action up to `retry_count` more times, then stop.
    Retry,
}

/// The closed set of action kinds understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    QueryRecords,
    SendNotification,
    SendEmail,
    SendSms,
    Webhook,
    AiAgent,
    Wait,
    Conditional,
    Loop,
    Log,
    SetVariable,
    Calculate,
}

impl ActionKind {
    /// Every registered kind, in documentation order.
    pub const ALL: [ActionKind; 15] = [
        Self::CreateRecord,
        Self::UpdateRecord,
        Self::DeleteRecord,
        Self::QueryRecords,
        Self::SendNotification,
        Self::SendEmail,
        Self::SendSms,
        Self::Webhook,
        Self::AiAgent,
        Self::Wait,
        Self::Conditional,
        Self::Loop,
        Self::Log,
        Self::SetVariable,
        Self::Calculate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRecord => "create_record",
            Self::UpdateRecord => "update_record",
            Self::DeleteRecord => "delete_record",
            Self::QueryRecords => "query_records",
            Self::SendNotification => "send_notification",
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::Webhook => "webhook",
            Self::AiAgent => "ai_agent",
            Self::Wait => "wait",
            Self::Conditional => "conditional",
            Self::Loop => "loop",
            Self::Log => "log",
            Self::SetVariable => "set_variable",
            Self::Calculate => "calculate",
        }
    }

    /// Config keys holding nested action lists. These are interpolated
    /// per nested dispatch rather than up front.
    pub fn nested_action_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Conditional => &["then", "else"],
            Self::Loop => &["actions"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action type '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of validating a workflow definition before it is stored or run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
