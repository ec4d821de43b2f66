//! Record CRUD actions against the generic datastore.
//!
//! Required fields are checked before touching the datastore, and datastore
//! failures are wrapped with the operation and table name.

use std::sync::Arc;

use autoflow_types::record::RecordQuery;
use autoflow_types::workflow::ActionKind;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use super::{
    ActionError, ActionExecutor, ActionRegistry, as_u64, check_object, check_required,
    optional_str, required_str,
};
use crate::collaborator::Datastore;
use crate::context::ExecutionContext;

/// Row payload from `data`, defaulting to an empty object.
fn record_data(config: &Value, kind: ActionKind) -> Result<Value, ActionError> {
    match config.get("data") {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(data @ Value::Object(_)) => Ok(data.clone()),
        Some(_) => Err(ActionError::invalid(kind, "'data' must be an object")),
    }
}

// ---------------------------------------------------------------------------
// create_record
// ---------------------------------------------------------------------------

pub struct CreateRecord {
    datastore: Arc<dyn Datastore>,
}

impl CreateRecord {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

impl ActionExecutor for CreateRecord {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateRecord
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["table"]);
        errors.extend(check_object(config, "data"));
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        _ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let table = required_str(&config, "table", self.kind())?;
            let data = record_data(&config, self.kind())?;

            let row = self
                .datastore
                .insert(&table, data)
                .await
                .map_err(|source| ActionError::Record {
                    operation: "create",
                    table: table.clone(),
                    source,
                })?;

            tracing::debug!(table = %table, "record created");
            Ok(row)
        })
    }
}

// ---------------------------------------------------------------------------
// update_record
// ---------------------------------------------------------------------------

pub struct UpdateRecord {
    datastore: Arc<dyn Datastore>,
}

impl UpdateRecord {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

impl ActionExecutor for UpdateRecord {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateRecord
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["table", "id"]);
        errors.extend(check_object(config, "data"));
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        _ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let table = required_str(&config, "table", self.kind())?;
            let id = required_str(&config, "id", self.kind())?;
            let data = record_data(&config, self.kind())?;

            self.datastore
                .update(&table, &id, data)
                .await
                .map_err(|source| ActionError::Record {
                    operation: "update",
                    table,
                    source,
                })
        })
    }
}

// ---------------------------------------------------------------------------
// delete_record
// ---------------------------------------------------------------------------

pub struct DeleteRecord {
    datastore: Arc<dyn Datastore>,
}

impl DeleteRecord {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

impl ActionExecutor for DeleteRecord {
    fn kind(&self) -> ActionKind {
        ActionKind::DeleteRecord
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        check_required(config, &["table", "id"])
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        _ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let table = required_str(&config, "table", self.kind())?;
            let id = required_str(&config, "id", self.kind())?;

            let removed = self
                .datastore
                .delete(&table, &id)
                .await
                .map_err(|source| ActionError::Record {
                    operation: "delete",
                    table,
                    source,
                })?;

            Ok(json!({"deleted": true, "id": id, "record": removed}))
        })
    }
}

// ---------------------------------------------------------------------------
// query_records
// ---------------------------------------------------------------------------

pub struct QueryRecords {
    datastore: Arc<dyn Datastore>,
}

impl QueryRecords {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }
}

/// Build a `RecordQuery` from `filters`, `order_by`, `ascending`, `limit`.
pub(crate) fn record_query(config: &Value, kind: ActionKind) -> Result<RecordQuery, ActionError> {
    let filters = match config.get("filters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(ActionError::invalid(kind, "'filters' must be an object")),
    };
    let ascending = match config.get("ascending") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.eq_ignore_ascii_case("false"),
        _ => true,
    };
    Ok(RecordQuery {
        filters,
        order_by: optional_str(config, "order_by"),
        ascending,
        limit: config.get("limit").and_then(as_u64).map(|l| l.min(u32::MAX as u64) as u32),
    })
}

impl ActionExecutor for QueryRecords {
    fn kind(&self) -> ActionKind {
        ActionKind::QueryRecords
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["table"]);
        errors.extend(check_object(config, "filters"));
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        _ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let table = required_str(&config, "table", self.kind())?;
            let query = record_query(&config, self.kind())?;

            let rows = self
                .datastore
                .query(&table, &query)
                .await
                .map_err(|source| ActionError::Record {
                    operation: "query",
                    table,
                    source,
                })?;

            Ok(json!({"count": rows.len(), "records": rows}))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServices;
    use autoflow_types::config::EngineConfig;
    use uuid::Uuid;

    fn setup() -> (MockServices, ActionRegistry, ExecutionContext) {
        let mocks = MockServices::new();
        let registry = ActionRegistry::with_defaults(mocks.services(), &EngineConfig::default());
        let ctx = ExecutionContext::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            "records",
            &json!({"data": {"id": "abc", "email": "ada@example.com"}}),
        );
        (mocks, registry, ctx)
    }

    fn action(kind: ActionKind, config: Value) -> autoflow_types::workflow::Action {
        autoflow_types::workflow::Action::new(kind, config)
    }

    #[tokio::test]
    async fn test_create_record_with_template_data() {
        let (mocks, registry, mut ctx) = setup();
        let out = registry
            .dispatch(
                &action(
                    ActionKind::CreateRecord,
                    json!({"table": "contacts", "data": {"email": "{{data.email}}"}}),
                ),
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(out["email"], "ada@example.com");
        let rows = mocks.datastore.rows("contacts");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_create_requires_table() {
        let (mocks, registry, mut ctx) = setup();
        let err = registry
            .dispatch(&action(ActionKind::CreateRecord, json!({"data": {}})), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig { .. }));
        assert_eq!(mocks.datastore.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (mocks, registry, mut ctx) = setup();
        let row = mocks
            .datastore
            .seed("jobs", json!({"id": "j1", "status": "open"}));
        assert_eq!(row["id"], "j1");

        let updated = registry
            .dispatch(
                &action(
                    ActionKind::UpdateRecord,
                    json!({"table": "jobs", "id": "j1", "data": {"status": "done"}}),
                ),
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(updated["status"], "done");

        let deleted = registry
            .dispatch(&action(ActionKind::DeleteRecord, json!({"table": "jobs", "id": "j1"})), &mut ctx)
            .await
            .unwrap();
        assert_eq!(deleted["deleted"], true);
        assert!(mocks.datastore.rows("jobs").is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_row_decorated_with_table() {
        let (_mocks, registry, mut ctx) = setup();
        let err = registry
            .dispatch(
                &action(ActionKind::UpdateRecord, json!({"table": "jobs", "id": "nope"})),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("table 'jobs'"), "{err}");
    }

    #[tokio::test]
    async fn test_query_records_filters() {
        let (mocks, registry, mut ctx) = setup();
        mocks.datastore.seed("jobs", json!({"id": "1", "status": "open"}));
        mocks.datastore.seed("jobs", json!({"id": "2", "status": "closed"}));
        mocks.datastore.seed("jobs", json!({"id": "3", "status": "open"}));

        let out = registry
            .dispatch(
                &action(
                    ActionKind::QueryRecords,
                    json!({"table": "jobs", "filters": {"status": "open"}, "limit": "5"}),
                ),
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["records"][1]["id"], "3");
    }

    #[test]
    fn test_record_query_parsing() {
        let q = record_query(
            &json!({"filters": {"a": 1}, "order_by": "created_at", "ascending": false, "limit": 10}),
            ActionKind::QueryRecords,
        )
        .unwrap();
        assert_eq!(q.order_by.as_deref(), Some("created_at"));
        assert!(!q.ascending);
        assert_eq!(q.limit, Some(10));
        assert!(record_query(&json!({"filters": []}), ActionKind::QueryRecords).is_err());
    }
}
