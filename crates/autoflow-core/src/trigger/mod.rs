//! Trigger subsystem: turns `trigger_config` into live subscriptions.
//!
//! - `database` -- change-feed subscriptions with an optional row condition
//! - `schedule` -- interval, daily and cron timers (with an optional fan-out query)
//! - `scheduler` -- owned registry of armed triggers and the engine handoff
//!
//! `manual` and `api_event` workflows are never armed; they are started
//! through [`ExecutionEngine::trigger_workflow_manually`](crate::engine::ExecutionEngine::trigger_workflow_manually).

pub mod database;
pub mod schedule;
pub mod scheduler;

use autoflow_types::error::RepositoryError;
use autoflow_types::workflow::{TriggerType, Workflow};
use serde_json::Value;
use uuid::Uuid;

pub use database::DatabaseTriggerSpec;
pub use schedule::{Schedule, ScheduleSpec, normalize_schedule};
pub use scheduler::{TriggerInfo, TriggerScheduler, TriggerStats};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// Structurally invalid `trigger_config`.
    #[error("invalid trigger config: {0}")]
    InvalidConfig(String),

    /// Schedule string that no supported format accepts.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// Engine handoff
// ---------------------------------------------------------------------------

/// A request from a trigger task to run a workflow once.
#[derive(Debug, Clone)]
pub struct FireRequest {
    pub workflow_id: Uuid,
    pub trigger_type: TriggerType,
    pub trigger_data: Value,
}

/// Check a workflow's `trigger_config` against its trigger type without
/// arming anything.
pub fn validate_trigger_config(trigger_type: TriggerType, config: &Value) -> Result<(), TriggerError> {
    if !config.is_object() && !config.is_null() {
        return Err(TriggerError::InvalidConfig("trigger_config must be an object".to_string()));
    }
    match trigger_type {
        TriggerType::DatabaseEvent => DatabaseTriggerSpec::from_config(config).map(|_| ()),
        TriggerType::Scheduled => ScheduleSpec::from_config(config).map(|_| ()),
        TriggerType::ApiEvent => {
            for key in ["secret", "token"] {
                if config.get(key).is_some_and(|v| !v.is_string()) {
                    return Err(TriggerError::InvalidConfig(format!("'{key}' must be a string")));
                }
            }
            Ok(())
        }
        TriggerType::Manual => Ok(()),
    }
}

/// Human-readable summary of what a workflow's trigger listens for.
pub fn describe_trigger(workflow: &Workflow) -> String {
    match workflow.trigger_type {
        TriggerType::DatabaseEvent => DatabaseTriggerSpec::from_config(&workflow.trigger_config)
            .map(|spec| spec.describe())
            .unwrap_or_else(|e| e.to_string()),
        TriggerType::Scheduled => ScheduleSpec::from_config(&workflow.trigger_config)
            .map(|spec| spec.describe())
            .unwrap_or_else(|e| e.to_string()),
        TriggerType::Manual => "manual".to_string(),
        TriggerType::ApiEvent => format!("POST /api/v1/events/{}", workflow.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_trigger_config_per_type() {
        assert!(validate_trigger_config(TriggerType::Manual, &json!({})).is_ok());
        assert!(validate_trigger_config(TriggerType::DatabaseEvent, &json!({})).is_err());
        assert!(validate_trigger_config(TriggerType::Scheduled, &json!({"interval": 1000})).is_ok());
        assert!(validate_trigger_config(TriggerType::ApiEvent, &json!({"secret": 5})).is_err());
        assert!(validate_trigger_config(TriggerType::Manual, &json!([1])).is_err());
    }
}
