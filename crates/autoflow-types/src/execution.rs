//! Execution tracking types: one `Execution` per workflow run plus its
//! append-only `LogEntry` trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// A single run instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Snapshot of the payload that fired the trigger.
    pub trigger_data: serde_json::Value,
    /// Aggregated action results once the run is finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Create a new execution already in `Running`.
    pub fn start(workflow_id: Uuid, trigger_data: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            status: ExecutionStatus::Running,
            trigger_data,
            result: None,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Wall-clock duration of a finished run in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// Lifecycle state of an execution.
///
/// `Completed` and `Failed` are terminal; transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` respects the state machine
    /// (`pending -> running -> completed|failed`).
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Failed) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("invalid execution status: {other}")),
        }
    }
}

/// Partial update applied when an execution finishes.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionUpdate {
    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            result: Some(result),
            error_message: None,
            completed_at: Some(Utc::now()),
        }
    }

    pub fn failed(error_message: impl Into<String>, result: Option<serde_json::Value>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            result,
            error_message: Some(error_message.into()),
            completed_at: Some(Utc::now()),
        }
    }
}

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    /// Accepts `warn` as an alias for `warning`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

/// One append-only entry in an execution's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        execution_id: Uuid,
        level: LogLevel,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            level,
            message: message.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}
