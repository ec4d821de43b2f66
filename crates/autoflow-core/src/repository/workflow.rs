//! Workflow store trait definition.
//!
//! The engine only reads definitions (`get_workflow`, `list_enabled_workflows`).
//! The write methods exist for the CLI and REST API, which author workflows.

use autoflow_types::error::RepositoryError;
use autoflow_types::workflow::Workflow;
use uuid::Uuid;

/// Repository trait for workflow definitions.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowStore: Send + Sync {
    /// Get a workflow by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List every enabled workflow (used to arm triggers at startup).
    fn list_enabled_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// List all workflows ordered by name.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Upsert a workflow by ID.
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Flip the `enabled` flag. Returns `NotFound` for unknown IDs.
    fn set_enabled(
        &self,
        id: &Uuid,
        enabled: bool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a workflow. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
