//! SQLite workflow store.
//!
//! Workflow headers live in columns; `trigger_config` and `actions` are JSON
//! blobs that round-trip through serde.

use autoflow_core::repository::workflow::WorkflowStore;
use autoflow_types::error::RepositoryError;
use autoflow_types::workflow::{Action, TriggerType, Workflow};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json};

const SELECT_COLUMNS: &str = "SELECT id, name, description, trigger_type, trigger_config, actions, enabled, created_at, updated_at FROM workflows";

/// SQLite-backed implementation of `WorkflowStore`.
pub struct SqliteWorkflowStore {
    pool: DatabasePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    name: String,
    description: Option<String>,
    trigger_type: String,
    trigger_config: String,
    actions: String,
    enabled: bool,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            trigger_type: row.try_get("trigger_type")?,
            trigger_config: row.try_get("trigger_config")?,
            actions: row.try_get("actions")?,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        let trigger_type = self
            .trigger_type
            .parse::<TriggerType>()
            .map_err(RepositoryError::Query)?;
        let actions: Vec<Action> = serde_json::from_str(&self.actions)
            .map_err(|e| RepositoryError::Query(format!("invalid actions JSON: {e}")))?;

        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            trigger_type,
            trigger_config: parse_json(&self.trigger_config, "trigger_config")?,
            actions,
            enabled: self.enabled,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn rows_into_workflows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Workflow>, RepositoryError> {
    rows.iter()
        .map(|row| {
            WorkflowRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_workflow()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// WorkflowStore impl
// ---------------------------------------------------------------------------

impl WorkflowStore for SqliteWorkflowStore {
    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn list_enabled_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE enabled = 1 ORDER BY name ASC"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_into_workflows(&rows)
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY name ASC"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_into_workflows(&rows)
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let trigger_config = to_json(&workflow.trigger_config)?;
        let actions = to_json(&workflow.actions)?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, description, trigger_type, trigger_config, actions, enabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 trigger_type = excluded.trigger_type,
                 trigger_config = excluded.trigger_config,
                 actions = excluded.actions,
                 enabled = excluded.enabled,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger_type.as_str())
        .bind(&trigger_config)
        .bind(&actions)
        .bind(workflow.enabled)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn set_enabled(&self, id: &Uuid, enabled: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE workflows SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{sample_workflow, test_pool};
    use autoflow_types::workflow::OnError;

    #[tokio::test]
    async fn test_save_and_get_workflow() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        let wf = sample_workflow("lead-welcome");
        store.save_workflow(&wf).await.unwrap();

        let loaded = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "lead-welcome");
        assert_eq!(loaded.trigger_type, TriggerType::DatabaseEvent);
        assert_eq!(loaded.trigger_config["table"], "leads");
        assert_eq!(loaded.actions.len(), 2);
        assert_eq!(loaded.actions[0].on_error, Some(OnError::Continue));
        assert!(loaded.enabled);
    }

    #[tokio::test]
    async fn test_get_missing_workflow() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        assert!(store.get_workflow(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        let mut wf = sample_workflow("first");
        store.save_workflow(&wf).await.unwrap();

        wf.name = "renamed".to_string();
        wf.actions.clear();
        store.save_workflow(&wf).await.unwrap();

        let all = store.list_workflows().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "renamed");
        assert!(all[0].actions.is_empty());
    }

    #[tokio::test]
    async fn test_list_enabled_filters_disabled() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        let on = sample_workflow("b-on");
        let off = sample_workflow("a-off");
        store.save_workflow(&on).await.unwrap();
        store.save_workflow(&off).await.unwrap();
        store.set_enabled(&off.id, false).await.unwrap();

        let enabled = store.list_enabled_workflows().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, on.id);

        let names: Vec<String> = store.list_workflows().await.unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["a-off", "b-on"]);
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_is_not_found() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        let err = store.set_enabled(&Uuid::now_v7(), false).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_workflow() {
        let store = SqliteWorkflowStore::new(test_pool().await);
        let wf = sample_workflow("doomed");
        store.save_workflow(&wf).await.unwrap();

        assert!(store.delete_workflow(&wf.id).await.unwrap());
        assert!(!store.delete_workflow(&wf.id).await.unwrap());
        assert!(store.get_workflow(&wf.id).await.unwrap().is_none());
    }
}
