use thiserror::Error;

/// Errors from repository operations (used by trait definitions in autoflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors reported by external collaborators (datastore tables, transports,
/// HTTP endpoints, the agent service).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
