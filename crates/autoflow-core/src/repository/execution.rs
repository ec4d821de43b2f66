//! Execution store trait definition.
//!
//! Executions and their log entries are the only durable state the engine
//! writes. Implementations must refuse status updates on executions that
//! already reached a terminal state.

use autoflow_types::error::RepositoryError;
use autoflow_types::execution::{Execution, ExecutionUpdate, LogEntry};
use uuid::Uuid;

/// Repository trait for execution runs and their audit trail.
pub trait ExecutionStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Persist a newly created execution.
    fn insert_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Apply a status transition. Returns `Conflict` if the execution is
    /// already terminal and `NotFound` if it does not exist.
    fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// List executions of a workflow, newest first.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;

    /// Executions still marked `running` (left behind by a previous process).
    fn list_running_executions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    /// Append a log entry.
    fn insert_log(
        &self,
        entry: &LogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All log entries of an execution in insertion order.
    fn list_logs(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<LogEntry>, RepositoryError>> + Send;
}
