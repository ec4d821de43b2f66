//! Trigger registry inspection and control.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use uuid::Uuid;

use autoflow_core::trigger::TriggerStats;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub fn trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/triggers", get(list_triggers))
        .route("/triggers/reload", post(reload_triggers))
        .route("/triggers/{id}", delete(stop_trigger))
}

/// GET /api/v1/triggers - Armed triggers grouped by type.
pub async fn list_triggers(State(state): State<AppState>) -> Json<ApiResponse<TriggerStats>> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let stats = state.scheduler.get_active_trigger_stats();
    Json(ApiResponse::success(stats, request_id, start).with_link("self", "/api/v1/triggers"))
}

/// POST /api/v1/triggers/reload - Disarm everything and re-arm every
/// enabled workflow from the store.
pub async fn reload_triggers(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let armed = state.scheduler.reload().await?;
    Ok(Json(ApiResponse::success(json!({ "armed": armed }), request_id, start)))
}

/// DELETE /api/v1/triggers/{id} - Disarm one workflow's trigger.
///
/// Idempotent: `stopped` is `false` when nothing was armed.
pub async fn stop_trigger(State(state): State<AppState>, Path(id): Path<Uuid>) -> Json<ApiResponse<Value>> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let stopped = state.scheduler.stop_workflow_trigger(&id);
    Json(ApiResponse::success(
        json!({ "workflow_id": id, "stopped": stopped }),
        request_id,
        start,
    ))
}
