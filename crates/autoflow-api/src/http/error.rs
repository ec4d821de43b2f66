//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use autoflow_core::engine::EngineError;
use autoflow_core::trigger::TriggerError;
use autoflow_infra::api_auth::ApiAuthError;
use autoflow_types::error::RepositoryError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine errors (missing/disabled workflow, unknown execution, store).
    Engine(EngineError),
    /// Direct store errors.
    Repository(RepositoryError),
    /// Trigger arming errors.
    Trigger(TriggerError),
    /// Unknown workflow referenced by path.
    WorkflowNotFound(uuid::Uuid),
    /// Inbound event authentication failure.
    Unauthorized(String),
    /// Single-message validation error.
    Validation(String),
    /// Workflow definition rejected with every problem found.
    InvalidDefinition(Vec<String>),
    /// Generic internal error.
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<TriggerError> for AppError {
    fn from(e: TriggerError) -> Self {
        AppError::Trigger(e)
    }
}

impl From<ApiAuthError> for AppError {
    fn from(e: ApiAuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl AppError {
    /// Status, machine-readable code and message for this error.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Engine(EngineError::WorkflowNotFound(_)) | AppError::WorkflowNotFound(_) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", self.message())
            }
            AppError::Engine(EngineError::ExecutionNotFound(_)) => {
                (StatusCode::NOT_FOUND, "EXECUTION_NOT_FOUND", self.message())
            }
            AppError::Engine(EngineError::WorkflowDisabled(_)) => {
                (StatusCode::CONFLICT, "WORKFLOW_DISABLED", self.message())
            }
            AppError::Engine(EngineError::Repository(e)) | AppError::Repository(e) => repository_parts(e),
            AppError::Trigger(TriggerError::Repository(e)) => repository_parts(e),
            AppError::Trigger(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidDefinition(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Invalid workflow definition".to_string())
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Engine(e) => e.to_string(),
            AppError::WorkflowNotFound(id) => format!("workflow {id} not found"),
            _ => String::new(),
        }
    }
}

fn repository_parts(e: &RepositoryError) -> (StatusCode, &'static str, String) {
    match e {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let details = match &self {
            AppError::InvalidDefinition(errors) => Some(json!(errors)),
            _ => None,
        };

        (status, Json(ApiResponse::<()>::error(code, message, details))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::now_v7();
        let cases = [
            (AppError::Engine(EngineError::WorkflowNotFound(id)), StatusCode::NOT_FOUND),
            (AppError::Engine(EngineError::ExecutionNotFound(id)), StatusCode::NOT_FOUND),
            (AppError::Engine(EngineError::WorkflowDisabled(id)), StatusCode::CONFLICT),
            (AppError::Repository(RepositoryError::Conflict("dup".into())), StatusCode::CONFLICT),
            (AppError::Repository(RepositoryError::Query("boom".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Trigger(TriggerError::InvalidSchedule("x".into())), StatusCode::BAD_REQUEST),
            (AppError::from(ApiAuthError::InvalidSignature), StatusCode::UNAUTHORIZED),
            (AppError::InvalidDefinition(vec!["a".into()]), StatusCode::BAD_REQUEST),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_not_found_message_names_workflow() {
        let id = Uuid::now_v7();
        let (_, code, message) = AppError::WorkflowNotFound(id).parts();
        assert_eq!(code, "WORKFLOW_NOT_FOUND");
        assert!(message.contains(&id.to_string()));
    }
}
