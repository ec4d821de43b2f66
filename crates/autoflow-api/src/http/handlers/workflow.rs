//! Workflow definition and manual trigger handlers.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use autoflow_core::repository::workflow::WorkflowStore;
use autoflow_core::trigger::describe_trigger;
use autoflow_infra::workflow_file::workflow_from_definition;
use autoflow_types::execution::Execution;
use autoflow_types::workflow::{ValidationReport, Workflow};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// A workflow plus its live trigger state.
#[derive(Debug, Serialize)]
pub struct WorkflowView {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub trigger: String,
    pub trigger_active: bool,
}

impl WorkflowView {
    fn new(workflow: Workflow, state: &AppState) -> Self {
        Self {
            trigger: describe_trigger(&workflow),
            trigger_active: state.scheduler.is_active(&workflow.id),
            workflow,
        }
    }
}

/// Mounted at `/api/v1` by the main router.
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/validate", post(validate_workflow))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/trigger", post(trigger_workflow))
        .route("/workflows/{id}/enable", post(enable_workflow))
        .route("/workflows/{id}/disable", post(disable_workflow))
}

/// GET /api/v1/workflows - List all workflows ordered by name.
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WorkflowView>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let workflows = state.engine.workflow_store().list_workflows().await?;
    let views = workflows
        .into_iter()
        .map(|wf| WorkflowView::new(wf, &state))
        .collect();

    Ok(Json(
        ApiResponse::success(views, request_id, start).with_link("self", "/api/v1/workflows"),
    ))
}

/// POST /api/v1/workflows - Validate, save and (re-)arm a workflow.
///
/// A body carrying an existing `id` replaces that workflow.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let report = state.engine.validate_workflow(&body);
    if !report.valid {
        return Err(AppError::InvalidDefinition(report.errors));
    }
    let workflow = workflow_from_definition(&body).map_err(|e| AppError::Validation(e.to_string()))?;

    state.engine.workflow_store().save_workflow(&workflow).await?;
    let armed = state.scheduler.setup_workflow_trigger(&workflow)?;
    tracing::info!(workflow_id = %workflow.id, workflow = %workflow.name, armed, "workflow saved");

    let link = format!("/api/v1/workflows/{}", workflow.id);
    Ok(Json(
        ApiResponse::success(WorkflowView::new(workflow, &state), request_id, start).with_link("self", &link),
    ))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let workflow = state
        .engine
        .workflow_store()
        .get_workflow(&id)
        .await?
        .ok_or(AppError::WorkflowNotFound(id))?;

    Ok(Json(
        ApiResponse::success(WorkflowView::new(workflow, &state), request_id, start)
            .with_link("self", &format!("/api/v1/workflows/{id}"))
            .with_link("executions", &format!("/api/v1/workflows/{id}/executions")),
    ))
}

/// POST /api/v1/workflows/{id}/enable - Enable and arm the trigger.
pub async fn enable_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    set_enabled(state, id, true).await
}

/// POST /api/v1/workflows/{id}/disable - Disable and tear down the trigger.
pub async fn disable_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    set_enabled(state, id, false).await
}

async fn set_enabled(
    state: AppState,
    id: Uuid,
    enabled: bool,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let store = state.engine.workflow_store();
    let mut workflow = store
        .get_workflow(&id)
        .await?
        .ok_or(AppError::WorkflowNotFound(id))?;
    store.set_enabled(&id, enabled).await?;
    workflow.enabled = enabled;

    // A disabled workflow is stopped here rather than armed.
    let armed = state.scheduler.setup_workflow_trigger(&workflow)?;
    tracing::info!(workflow_id = %id, enabled, armed, "workflow enabled flag changed");

    Ok(Json(
        ApiResponse::success(WorkflowView::new(workflow, &state), request_id, start)
            .with_link("self", &format!("/api/v1/workflows/{id}")),
    ))
}

/// POST /api/v1/workflows/validate - Check a definition without saving it.
pub async fn validate_workflow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<ApiResponse<ValidationReport>> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let report = state.engine.validate_workflow(&body);
    Json(ApiResponse::success(report, request_id, start))
}

/// POST /api/v1/workflows/{id}/trigger - Run a workflow now.
///
/// The run completes within the request; the finished execution is returned
/// whatever its status.
pub async fn trigger_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<Execution>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let data = trigger_payload(&body)?;

    let execution = state.engine.trigger_workflow_manually(&id, data).await?;
    let link = format!("/api/v1/executions/{}", execution.id);
    Ok(Json(
        ApiResponse::success(execution, request_id, start).with_link("self", &link),
    ))
}

/// Turn a raw request body into trigger data: empty becomes `{}`, a JSON
/// object is used as-is, any other JSON value is wrapped as `payload`.
pub(crate) fn trigger_payload(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("request body is not valid JSON: {e}")))?;
    Ok(match value {
        Value::Object(_) => value,
        Value::Null => serde_json::json!({}),
        other => serde_json::json!({ "payload": other }),
    })
}
