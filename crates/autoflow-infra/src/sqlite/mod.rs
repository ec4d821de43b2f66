//! SQLite storage layer.
//!
//! Store implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod execution;
pub mod pool;
pub mod record;
pub mod workflow;

use autoflow_types::error::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

pub use execution::SqliteExecutionStore;
pub use pool::{DATABASE_FILE, DatabasePool, database_url};
pub use record::SqliteRecordStore;
pub use workflow::SqliteWorkflowStore;

// ---------------------------------------------------------------------------
// Shared column helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps so `ORDER BY` on the text column is chronological.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_json(s: &str, column: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

pub(crate) fn to_json(value: &impl serde::Serialize) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize: {e}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let pool = DatabasePool::open(dir.path()).await.unwrap();
    std::mem::forget(dir);
    pool
}

#[cfg(test)]
pub(crate) fn sample_workflow(name: &str) -> autoflow_types::workflow::Workflow {
    use autoflow_types::workflow::{Action, ActionKind, OnError, TriggerType, Workflow};
    use serde_json::json;

    Workflow {
        id: Uuid::now_v7(),
        name: name.to_string(),
        description: Some("Welcome new leads".to_string()),
        trigger_type: TriggerType::DatabaseEvent,
        trigger_config: json!({"table": "leads", "event": "insert"}),
        actions: vec![
            Action::new(ActionKind::SendEmail, json!({"to": "{{email}}", "subject": "Hi"}))
                .with_on_error(OnError::Continue),
            Action::new(ActionKind::Log, json!({"message": "done"})),
        ],
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
