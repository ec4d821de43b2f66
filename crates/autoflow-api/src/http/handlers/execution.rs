//! Execution history and log handlers.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use autoflow_core::repository::workflow::WorkflowStore;
use autoflow_types::execution::{Execution, LogEntry};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for listing executions.
#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    /// Maximum number of executions to return (default: `[engine]
    /// execution_history_limit`).
    pub limit: Option<u32>,
}

pub fn execution_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows/{id}/executions", get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/logs", get(get_execution_logs))
}

/// GET /api/v1/workflows/{id}/executions - Newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<ApiResponse<Vec<Execution>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if state.engine.workflow_store().get_workflow(&id).await?.is_none() {
        return Err(AppError::WorkflowNotFound(id));
    }
    let executions = state.engine.get_workflow_executions(&id, query.limit).await?;

    Ok(Json(
        ApiResponse::success(executions, request_id, start)
            .with_link("workflow", &format!("/api/v1/workflows/{id}")),
    ))
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Execution>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let execution = state.engine.get_execution(&id).await?;
    let workflow_link = format!("/api/v1/workflows/{}", execution.workflow_id);

    Ok(Json(
        ApiResponse::success(execution, request_id, start)
            .with_link("logs", &format!("/api/v1/executions/{id}/logs"))
            .with_link("workflow", &workflow_link),
    ))
}

/// GET /api/v1/executions/{id}/logs - Oldest first.
pub async fn get_execution_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<LogEntry>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    // 404 for unknown executions rather than an empty list.
    state.engine.get_execution(&id).await?;
    let logs = state.engine.get_workflow_logs(&id).await?;

    Ok(Json(ApiResponse::success(logs, request_id, start)))
}
