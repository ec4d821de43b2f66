//! Execution engine: runs one workflow's actions in order and records the
//! outcome.
//!
//! Each run is an `Execution` that moves `running -> completed | failed`.
//! Action failures never escape [`ExecutionEngine::execute_workflow`]; they
//! land in `Execution.error_message` and the caller inspects `status`. Only
//! missing/disabled workflows and store failures surface as [`EngineError`].

use std::sync::Arc;

use autoflow_types::config::EngineConfig;
use autoflow_types::error::RepositoryError;
use autoflow_types::execution::{Execution, ExecutionUpdate, LogEntry, LogLevel};
use autoflow_types::workflow::{OnError, ValidationReport};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::action::ActionRegistry;
use crate::context::ExecutionContext;
use crate::repository::execution::ExecutionStore;
use crate::repository::workflow::WorkflowStore;
use crate::validation::validate_definition;

/// Error message stamped on executions abandoned by a previous process.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by process restart";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} is disabled")]
    WorkflowDisabled(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Drives workflow executions against the workflow and execution stores.
///
/// Generic over the store traits so the API binary can plug in SQLite and
/// tests can plug in memory stores without dynamic dispatch.
pub struct ExecutionEngine<W, E> {
    workflows: Arc<W>,
    executions: Arc<E>,
    registry: Arc<ActionRegistry>,
    history_limit: u32,
}

impl<W: WorkflowStore, E: ExecutionStore> ExecutionEngine<W, E> {
    pub fn new(
        workflows: Arc<W>,
        executions: Arc<E>,
        registry: ActionRegistry,
        config: &EngineConfig,
    ) -> Self {
        Self {
            workflows,
            executions,
            registry: Arc::new(registry),
            history_limit: config.execution_history_limit,
        }
    }

    pub fn workflow_store(&self) -> &Arc<W> {
        &self.workflows
    }

    pub fn execution_store(&self) -> &Arc<E> {
        &self.executions
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run a workflow end to end and return the finished execution.
    pub async fn execute_workflow(
        &self,
        workflow_id: &Uuid,
        trigger_data: Value,
    ) -> Result<Execution, EngineError> {
        let workflow = self
            .workflows
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(*workflow_id))?;
        if !workflow.enabled {
            return Err(EngineError::WorkflowDisabled(*workflow_id));
        }

        let mut execution = Execution::start(workflow.id, trigger_data);
        self.executions.insert_execution(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            workflow = %workflow.name,
            actions = workflow.actions.len(),
            "execution started"
        );

        let mut ctx = ExecutionContext::new(
            execution.id,
            workflow.id,
            &workflow.name,
            &execution.trigger_data,
        );
        let mut results = Vec::with_capacity(workflow.actions.len());
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut abort: Option<String> = None;

        for (index, action) in workflow.actions.iter().enumerate() {
            let metadata = json!({
                "action_index": index,
                "action_type": action.kind,
                "action_name": action.name,
            });
            self.write_log(
                execution.id,
                LogLevel::Info,
                format!("Starting action {index} ({})", action.kind),
                metadata.clone(),
            )
            .await;

            let outcome = self.registry.dispatch(action, &mut ctx).await;
            self.flush_journal(&mut ctx).await;

            match outcome {
                Ok(output) => {
                    completed += 1;
                    ctx.record_result(index, action.name.as_deref(), &output);
                    results.push(json!({
                        "index": index,
                        "type": action.kind,
                        "name": action.name,
                        "status": "completed",
                        "output": output,
                    }));
                }
                Err(e) => {
                    failed += 1;
                    let message = format!("action {index} ({}) failed: {e}", action.kind);
                    tracing::warn!(
                        execution_id = %execution.id,
                        action = %action.kind,
                        index,
                        error = %e,
                        "action failed"
                    );
                    self.write_log(execution.id, LogLevel::Error, message.clone(), metadata)
                        .await;

                    let error_output = json!({"error": e.to_string()});
                    ctx.record_result(index, action.name.as_deref(), &error_output);
                    results.push(json!({
                        "index": index,
                        "type": action.kind,
                        "name": action.name,
                        "status": "failed",
                        "error": e.to_string(),
                    }));

                    // Exhausted retries fall through to `stop`.
                    if action.error_policy() != OnError::Continue {
                        abort = Some(message);
                        break;
                    }
                }
            }
        }

        let summary = json!({
            "actions_completed": completed,
            "actions_failed": failed,
            "results": results,
        });
        let update = match abort {
            None => ExecutionUpdate::completed(summary),
            Some(message) => ExecutionUpdate::failed(message, Some(summary)),
        };
        self.executions.update_execution(&execution.id, &update).await?;

        execution.status = update.status;
        execution.result = update.result;
        execution.error_message = update.error_message;
        execution.completed_at = update.completed_at;

        let summary_line = match &execution.error_message {
            None => format!("Execution completed: {completed} action(s) succeeded, {failed} failed"),
            Some(error) => format!("Execution failed: {error}"),
        };
        let level = if execution.error_message.is_some() {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        self.write_log(execution.id, level, summary_line, json!({})).await;

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            status = %execution.status,
            completed,
            failed,
            duration_ms = execution.duration_ms().unwrap_or_default(),
            "execution finished"
        );

        Ok(execution)
    }

    /// Entry point for `manual` and `api_event` workflows.
    pub async fn trigger_workflow_manually(
        &self,
        workflow_id: &Uuid,
        data: Value,
    ) -> Result<Execution, EngineError> {
        tracing::info!(workflow_id = %workflow_id, "manual trigger");
        self.execute_workflow(workflow_id, data).await
    }

    /// Check a raw workflow definition without persisting or running it.
    pub fn validate_workflow(&self, definition: &Value) -> ValidationReport {
        validate_definition(definition, &self.registry)
    }

    /// Recent executions of a workflow, newest first. `None` uses the
    /// configured history limit.
    pub async fn get_workflow_executions(
        &self,
        workflow_id: &Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<Execution>, EngineError> {
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.executions.list_executions(workflow_id, limit).await?)
    }

    pub async fn get_workflow_logs(&self, execution_id: &Uuid) -> Result<Vec<LogEntry>, EngineError> {
        Ok(self.executions.list_logs(execution_id).await?)
    }

    pub async fn get_execution(&self, execution_id: &Uuid) -> Result<Execution, EngineError> {
        self.executions
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(*execution_id))
    }

    /// Fail every execution still marked `running`. Call once at startup,
    /// before any trigger is armed. Returns the number of executions marked.
    pub async fn recover_interrupted_executions(&self) -> Result<usize, EngineError> {
        let stale = self.executions.list_running_executions().await?;
        let mut recovered = 0;

        for execution in stale {
            let update = ExecutionUpdate::failed(INTERRUPTED_MESSAGE, None);
            match self.executions.update_execution(&execution.id, &update).await {
                Ok(()) => {
                    recovered += 1;
                    self.write_log(
                        execution.id,
                        LogLevel::Warning,
                        format!("Execution marked failed: {INTERRUPTED_MESSAGE}"),
                        json!({"started_at": execution.started_at.to_rfc3339()}),
                    )
                    .await;
                }
                // Finished concurrently; nothing to recover.
                Err(RepositoryError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if recovered > 0 {
            tracing::warn!(count = recovered, "recovered interrupted executions");
        }
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Log helpers
    // -----------------------------------------------------------------------

    /// Append a log entry. Log writes are best effort: a failure is traced
    /// and never changes the execution outcome.
    async fn write_log(&self, execution_id: Uuid, level: LogLevel, message: String, metadata: Value) {
        let entry = LogEntry::new(execution_id, level, message, metadata);
        if let Err(e) = self.executions.insert_log(&entry).await {
            tracing::error!(execution_id = %execution_id, error = %e, "failed to write execution log");
        }
    }

    async fn flush_journal(&self, ctx: &mut ExecutionContext) {
        let execution_id = ctx.execution_id();
        for entry in ctx.drain_journal() {
            self.write_log(execution_id, entry.level, entry.message, entry.metadata)
                .await;
        }
    }
}
