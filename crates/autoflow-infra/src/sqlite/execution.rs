//! SQLite execution store: workflow runs and their append-only logs.
//!
//! Status updates are guarded in SQL so a terminal execution is never
//! rewritten, even when two writers race.

use autoflow_core::repository::execution::ExecutionStore;
use autoflow_types::error::RepositoryError;
use autoflow_types::execution::{Execution, ExecutionStatus, ExecutionUpdate, LogEntry, LogLevel};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json};

const SELECT_EXECUTION: &str = "SELECT id, workflow_id, status, trigger_data, result, error_message, started_at, completed_at FROM workflow_executions";

/// SQLite-backed implementation of `ExecutionStore`.
pub struct SqliteExecutionStore {
    pool: DatabasePool,
}

impl SqliteExecutionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: String,
    trigger_data: String,
    result: Option<String>,
    error_message: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            trigger_data: row.try_get("trigger_data")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_execution(self) -> Result<Execution, RepositoryError> {
        Ok(Execution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status: self
                .status
                .parse::<ExecutionStatus>()
                .map_err(RepositoryError::Query)?,
            trigger_data: parse_json(&self.trigger_data, "trigger_data")?,
            result: self
                .result
                .as_deref()
                .map(|s| parse_json(s, "result"))
                .transpose()?,
            error_message: self.error_message,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

struct LogRow {
    id: String,
    execution_id: String,
    level: String,
    message: String,
    metadata: String,
    timestamp: String,
}

impl LogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            level: row.try_get("level")?,
            message: row.try_get("message")?,
            metadata: row.try_get("metadata")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_entry(self) -> Result<LogEntry, RepositoryError> {
        Ok(LogEntry {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            level: self.level.parse::<LogLevel>().map_err(RepositoryError::Query)?,
            message: self.message,
            metadata: parse_json(&self.metadata, "metadata")?,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

fn rows_into_executions(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Execution>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_execution()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ExecutionStore impl
// ---------------------------------------------------------------------------

impl ExecutionStore for SqliteExecutionStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let result = execution.result.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, trigger_data, result, error_message, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.as_str())
        .bind(to_json(&execution.trigger_data)?)
        .bind(&result)
        .bind(&execution.error_message)
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> Result<(), RepositoryError> {
        let result = update.result.as_ref().map(to_json).transpose()?;

        let outcome = sqlx::query(
            r#"UPDATE workflow_executions
               SET status = ?, result = COALESCE(?, result), error_message = ?, completed_at = ?
               WHERE id = ? AND status NOT IN ('completed', 'failed')"#,
        )
        .bind(update.status.as_str())
        .bind(&result)
        .bind(&update.error_message)
        .bind(update.completed_at.as_ref().map(format_datetime))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if outcome.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing changed: either the row is missing or it is already terminal.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM workflow_executions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match status {
            None => Err(RepositoryError::NotFound),
            Some(status) => Err(RepositoryError::Conflict(format!(
                "execution {id} is already {status}"
            ))),
        }
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_EXECUTION} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_EXECUTION} WHERE workflow_id = ? ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(workflow_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_into_executions(&rows)
    }

    async fn list_running_executions(&self) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_EXECUTION} WHERE status = 'running' ORDER BY started_at ASC"
        ))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_into_executions(&rows)
    }

    async fn insert_log(&self, entry: &LogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO workflow_logs (id, execution_id, level, message, metadata, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.execution_id.to_string())
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(to_json(&entry.metadata)?)
        .bind(format_datetime(&entry.timestamp))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_logs(&self, execution_id: &Uuid) -> Result<Vec<LogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, execution_id, level, message, metadata, timestamp FROM workflow_logs WHERE execution_id = ? ORDER BY seq ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                LogRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_entry()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{SqliteWorkflowStore, sample_workflow, test_pool};
    use autoflow_core::repository::workflow::WorkflowStore;
    use serde_json::json;

    async fn stores() -> (SqliteWorkflowStore, SqliteExecutionStore, Uuid) {
        let pool = test_pool().await;
        let workflows = SqliteWorkflowStore::new(pool.clone());
        let wf = sample_workflow("exec-host");
        workflows.save_workflow(&wf).await.unwrap();
        (workflows, SqliteExecutionStore::new(pool), wf.id)
    }

    #[tokio::test]
    async fn test_insert_and_get_execution() {
        let (_, store, workflow_id) = stores().await;
        let exec = Execution::start(workflow_id, json!({"email": "a@example.com"}));
        store.insert_execution(&exec).await.unwrap();

        let loaded = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.trigger_data["email"], "a@example.com");
        assert!(loaded.result.is_none());
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_complete_then_refuse_second_transition() {
        let (_, store, workflow_id) = stores().await;
        let exec = Execution::start(workflow_id, json!({}));
        store.insert_execution(&exec).await.unwrap();

        store
            .update_execution(&exec.id, &ExecutionUpdate::completed(json!({"actions_completed": 2})))
            .await
            .unwrap();
        let done = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.result.unwrap()["actions_completed"], 2);
        assert!(done.completed_at.is_some());

        let err = store
            .update_execution(&exec.id, &ExecutionUpdate::failed("late", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        let still = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(still.status, ExecutionStatus::Completed);
        assert!(still.error_message.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_execution_is_not_found() {
        let (_, store, _) = stores().await;
        let err = store
            .update_execution(&Uuid::now_v7(), &ExecutionUpdate::failed("x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_executions_newest_first_with_limit() {
        let (_, store, workflow_id) = stores().await;
        let mut ids = Vec::new();
        for offset in 0..3 {
            let mut exec = Execution::start(workflow_id, json!({"n": offset}));
            exec.started_at += chrono::Duration::seconds(offset);
            store.insert_execution(&exec).await.unwrap();
            ids.push(exec.id);
        }

        let listed = store.list_executions(&workflow_id, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
    }

    #[tokio::test]
    async fn test_list_running_executions() {
        let (_, store, workflow_id) = stores().await;
        let running = Execution::start(workflow_id, json!({}));
        let finished = Execution::start(workflow_id, json!({}));
        store.insert_execution(&running).await.unwrap();
        store.insert_execution(&finished).await.unwrap();
        store
            .update_execution(&finished.id, &ExecutionUpdate::completed(json!({})))
            .await
            .unwrap();

        let left = store.list_running_executions().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, running.id);
    }

    #[tokio::test]
    async fn test_logs_keep_insertion_order() {
        let (_, store, workflow_id) = stores().await;
        let exec = Execution::start(workflow_id, json!({}));
        store.insert_execution(&exec).await.unwrap();

        for (i, level) in [LogLevel::Info, LogLevel::Warning, LogLevel::Error].into_iter().enumerate() {
            let entry = LogEntry::new(exec.id, level, format!("entry {i}"), json!({"i": i}));
            store.insert_log(&entry).await.unwrap();
        }

        let logs = store.list_logs(&exec.id).await.unwrap();
        let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 0", "entry 1", "entry 2"]);
        assert_eq!(logs[1].level, LogLevel::Warning);
        assert_eq!(logs[2].metadata["i"], 2);
    }

    #[tokio::test]
    async fn test_deleting_workflow_cascades() {
        let (workflows, store, workflow_id) = stores().await;
        let exec = Execution::start(workflow_id, json!({}));
        store.insert_execution(&exec).await.unwrap();
        store
            .insert_log(&LogEntry::new(exec.id, LogLevel::Info, "hello", json!({})))
            .await
            .unwrap();

        workflows.delete_workflow(&workflow_id).await.unwrap();
        assert!(store.get_execution(&exec.id).await.unwrap().is_none());
        assert!(store.list_logs(&exec.id).await.unwrap().is_empty());
    }
}
