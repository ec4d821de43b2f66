//! Inbound event receiver for `api_event` workflows.
//!
//! Verifies the delivery against the workflow's `trigger_config` (HMAC
//! signature in `X-Autoflow-Signature` and/or bearer token), then runs the
//! workflow within the request.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::post;
use axum::Router;
use uuid::Uuid;

use autoflow_core::repository::workflow::WorkflowStore;
use autoflow_infra::api_auth::{EventAuth, SIGNATURE_HEADER};
use autoflow_types::execution::Execution;
use autoflow_types::workflow::TriggerType;

use crate::http::error::AppError;
use crate::http::handlers::workflow::trigger_payload;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events/{id}", post(receive_event))
}

/// POST /api/v1/events/{id} - Deliver an event to an `api_event` workflow.
pub async fn receive_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<Execution>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let workflow = state
        .engine
        .workflow_store()
        .get_workflow(&id)
        .await?
        .ok_or(AppError::WorkflowNotFound(id))?;
    if workflow.trigger_type != TriggerType::ApiEvent {
        return Err(AppError::Validation(format!(
            "workflow {id} is triggered by {}, not api_event",
            workflow.trigger_type.as_str()
        )));
    }

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    EventAuth::from_trigger_config(&workflow.trigger_config)
        .verify(&body, signature, authorization)
        .inspect_err(|e| tracing::warn!(workflow_id = %id, error = %e, "rejected api event"))?;

    let data = trigger_payload(&body)?;
    tracing::info!(workflow_id = %id, bytes = body.len(), "api event received");

    let execution = state.engine.trigger_workflow_manually(&id, data).await?;
    let link = format!("/api/v1/executions/{}", execution.id);
    Ok(Json(
        ApiResponse::success(execution, request_id, start).with_link("execution", &link),
    ))
}
