//! SQLite-backed generic datastore.
//!
//! Every logical table is a partition of the `records` table holding JSON
//! documents. Each successful write is published on the change feed so
//! `database_event` triggers observe it.

use std::sync::Arc;

use autoflow_core::collaborator::{ChangeFeed, Datastore};
use autoflow_types::error::{CollaboratorError, RepositoryError};
use autoflow_types::record::{ChangeEvent, ChangeKind, RecordQuery};
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_json, to_json};

/// JSON document store implementing `Datastore`, publishing row changes.
pub struct SqliteRecordStore {
    pool: DatabasePool,
    change_feed: Arc<dyn ChangeFeed>,
}

impl SqliteRecordStore {
    pub fn new(pool: DatabasePool, change_feed: Arc<dyn ChangeFeed>) -> Self {
        Self { pool, change_feed }
    }

    fn publish(&self, table: &str, kind: ChangeKind, record_id: &str, old: Option<Value>, new: Option<Value>) {
        tracing::debug!(table, record_id, event = kind.as_str(), "record changed");
        self.change_feed.publish(ChangeEvent {
            table: table.to_string(),
            kind,
            record_id: record_id.to_string(),
            old,
            new,
        });
    }

    async fn insert_row(&self, table: &str, data: Value) -> Result<Value, RepositoryError> {
        let Value::Object(mut fields) = data else {
            return Err(RepositoryError::Query("record data must be an object".to_string()));
        };

        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => Uuid::now_v7().to_string(),
        };
        let now = format_datetime(&Utc::now());
        fields.insert("id".to_string(), json!(id));
        fields.entry("created_at").or_insert_with(|| json!(now));
        fields.insert("updated_at".to_string(), json!(now));
        let row = Value::Object(fields);

        sqlx::query(
            "INSERT INTO records (table_name, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table)
        .bind(&id)
        .bind(to_json(&row)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("{table} record {id} already exists"))
            }
            _ => RepositoryError::Query(e.to_string()),
        })?;

        self.publish(table, ChangeKind::Insert, &id, None, Some(row.clone()));
        Ok(row)
    }

    async fn update_row(&self, table: &str, id: &str, data: Value) -> Result<Value, RepositoryError> {
        let Value::Object(changes) = data else {
            return Err(RepositoryError::Query("record data must be an object".to_string()));
        };

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT data FROM records WHERE table_name = ? AND id = ?")
                .bind(table)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let old = parse_json(&stored.ok_or(RepositoryError::NotFound)?, "data")?;

        let mut fields = old.as_object().cloned().unwrap_or_default();
        fields.extend(changes);
        // The key is immutable once assigned.
        fields.insert("id".to_string(), json!(id));
        let now = format_datetime(&Utc::now());
        fields.insert("updated_at".to_string(), json!(now));
        let new = Value::Object(fields);

        sqlx::query("UPDATE records SET data = ?, updated_at = ? WHERE table_name = ? AND id = ?")
            .bind(to_json(&new)?)
            .bind(&now)
            .bind(table)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        self.publish(table, ChangeKind::Update, id, Some(old), Some(new.clone()));
        Ok(new)
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<Value, RepositoryError> {
        let stored: Option<String> =
            sqlx::query_scalar("DELETE FROM records WHERE table_name = ? AND id = ? RETURNING data")
                .bind(table)
                .bind(id)
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let old = parse_json(&stored.ok_or(RepositoryError::NotFound)?, "data")?;

        self.publish(table, ChangeKind::Delete, id, Some(old.clone()), None);
        Ok(old)
    }

    async fn get_row(&self, table: &str, id: &str) -> Result<Option<Value>, RepositoryError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT data FROM records WHERE table_name = ? AND id = ?")
                .bind(table)
                .bind(id)
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        stored.as_deref().map(|s| parse_json(s, "data")).transpose()
    }

    async fn query_rows(&self, table: &str, query: &RecordQuery) -> Result<Vec<Value>, RepositoryError> {
        let (sql, binds) = build_query(table, query);

        let mut statement = sqlx::query(&sql);
        for bind in binds {
            statement = statement.bind(bind);
        }
        let rows = statement
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let data: String = row
                    .try_get("data")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                parse_json(&data, "data")
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// JSON path addressing a top-level field, quoted so dots and spaces in
/// field names are taken literally.
fn field_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// SQL text plus positional string binds for a table query.
///
/// Filter values are bound as JSON text and unwrapped with `json_extract(?, '$')`,
/// so numbers, booleans and strings compare with their JSON types.
fn build_query(table: &str, query: &RecordQuery) -> (String, Vec<String>) {
    let mut sql = String::from("SELECT data FROM records WHERE table_name = ?");
    let mut binds = vec![table.to_string()];

    for (field, expected) in &query.filters {
        if expected.is_null() {
            sql.push_str(" AND json_type(data, ?) = 'null'");
            binds.push(field_path(field));
        } else {
            sql.push_str(" AND json_extract(data, ?) = json_extract(?, '$')");
            binds.push(field_path(field));
            binds.push(expected.to_string());
        }
    }

    match &query.order_by {
        Some(field) => {
            let direction = if query.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY json_extract(data, ?) {direction}, seq {direction}"));
            binds.push(field_path(field));
        }
        None => sql.push_str(" ORDER BY seq ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    (sql, binds)
}

// ---------------------------------------------------------------------------
// Datastore impl
// ---------------------------------------------------------------------------

impl Datastore for SqliteRecordStore {
    fn insert<'a>(&'a self, table: &'a str, data: Value) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move { Ok(self.insert_row(table, data).await?) })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move { Ok(self.update_row(table, id, data).await?) })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move { Ok(self.delete_row(table, id).await?) })
    }

    fn get<'a>(&'a self, table: &'a str, id: &'a str) -> BoxFuture<'a, Result<Option<Value>, CollaboratorError>> {
        Box::pin(async move { Ok(self.get_row(table, id).await?) })
    }

    fn query<'a>(
        &'a self,
        table: &'a str,
        query: &'a RecordQuery,
    ) -> BoxFuture<'a, Result<Vec<Value>, CollaboratorError>> {
        Box::pin(async move { Ok(self.query_rows(table, query).await?) })
    }
}
