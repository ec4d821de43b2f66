//! Closed dispatch table from `ActionKind` to executor.
//!
//! The registry is built once at startup. Dispatch interpolates the action
//! config against the current context, runs the executor, and applies the
//! `retry` policy (bounded attempts with a fixed delay). The `continue` and
//! `stop` policies belong to the caller: the engine for top-level actions,
//! [`ActionRegistry::execute_nested`] for control-flow bodies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use autoflow_types::config::EngineConfig;
use autoflow_types::execution::LogLevel;
use autoflow_types::workflow::{Action, ActionKind, OnError};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use super::{ActionError, ActionExecutor, ActionServices};
use crate::context::ExecutionContext;
use crate::template::interpolate_except;

pub struct ActionRegistry {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor>>,
    retry_delay: Duration,
    default_retry_count: u32,
    max_loop_iterations: usize,
}

impl ActionRegistry {
    /// An empty registry; executors are added with [`register`](Self::register).
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            executors: HashMap::new(),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            default_retry_count: config.default_retry_count,
            max_loop_iterations: config.max_loop_iterations,
        }
    }

    /// A registry with every built-in action kind wired to `services`.
    pub fn with_defaults(services: ActionServices, config: &EngineConfig) -> Self {
        use super::{control, delivery, outbound, record, utility};

        let mut registry = Self::new(config);
        let ds = &services.datastore;

        registry.register(Arc::new(record::CreateRecord::new(ds.clone())));
        registry.register(Arc::new(record::UpdateRecord::new(ds.clone())));
        registry.register(Arc::new(record::DeleteRecord::new(ds.clone())));
        registry.register(Arc::new(record::QueryRecords::new(ds.clone())));
        registry.register(Arc::new(delivery::SendNotification::new(
            services.notifications.clone(),
            ds.clone(),
        )));
        registry.register(Arc::new(delivery::SendMessage::email(
            services.email.clone(),
            ds.clone(),
        )));
        registry.register(Arc::new(delivery::SendMessage::sms(
            services.sms.clone(),
            ds.clone(),
        )));
        registry.register(Arc::new(outbound::Webhook::new(services.http.clone())));
        registry.register(Arc::new(outbound::AiAgent::new(services.agent.clone())));
        registry.register(Arc::new(control::Wait));
        registry.register(Arc::new(control::Conditional));
        registry.register(Arc::new(control::Loop));
        registry.register(Arc::new(utility::Log));
        registry.register(Arc::new(utility::SetVariable));
        registry.register(Arc::new(utility::Calculate));

        registry
    }

    /// Register (or replace) the executor for its kind.
    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.executors.contains_key(&kind)
    }

    pub fn max_loop_iterations(&self) -> usize {
        self.max_loop_iterations
    }

    /// Number of attempts the retry policy allows for `action`.
    pub fn attempts_for(&self, action: &Action) -> u32 {
        match action.error_policy() {
            OnError::Retry if action.retry_count == 0 => 1 + self.default_retry_count,
            OnError::Retry => 1 + action.retry_count,
            OnError::Continue | OnError::Stop => 1,
        }
    }

    /// Interpolate, execute, and retry one action.
    pub async fn dispatch(
        &self,
        action: &Action,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, ActionError> {
        let executor = self
            .executors
            .get(&action.kind)
            .ok_or(ActionError::Unregistered(action.kind))?;

        let attempts = self.attempts_for(action);
        let mut attempt = 1;
        loop {
            let config = interpolate_except(
                &action.config,
                ctx.as_value(),
                action.kind.nested_action_keys(),
            );

            match executor.execute(config, ctx, self).await {
                Ok(output) => return Ok(output),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    tracing::warn!(
                        execution_id = %ctx.execution_id(),
                        action = %action.kind,
                        attempt,
                        attempts,
                        error = %e,
                        "action failed, retrying"
                    );
                    ctx.push_log(
                        LogLevel::Warning,
                        format!("Retrying {} after attempt {attempt} failed: {e}", action.kind),
                        json!({"action_type": action.kind, "attempt": attempt}),
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a nested action list in order, honoring each action's `on_error`.
    ///
    /// Every nested action journals a start entry, and a failure journals one
    /// more. A `continue` failure is recorded as `{"error": ...}` in the
    /// returned results; any other failure aborts the list.
    pub fn execute_nested<'a>(
        &'a self,
        actions: &'a [Action],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<Vec<Value>, ActionError>> {
        Box::pin(async move {
            let mut results = Vec::with_capacity(actions.len());
            for (index, action) in actions.iter().enumerate() {
                let metadata = json!({"action_type": action.kind, "nested_index": index});
                tracing::debug!(
                    execution_id = %ctx.execution_id(),
                    index,
                    action = %action.kind,
                    "dispatching nested action"
                );
                ctx.push_log(
                    LogLevel::Info,
                    format!("Starting nested action {index} ({})", action.kind),
                    metadata.clone(),
                );

                match self.dispatch(action, ctx).await {
                    Ok(output) => results.push(output),
                    Err(e) if action.error_policy() == OnError::Continue => {
                        ctx.push_log(
                            LogLevel::Warning,
                            format!("Nested action {index} ({}) failed: {e}", action.kind),
                            metadata,
                        );
                        results.push(json!({"error": e.to_string()}));
                    }
                    Err(e) => {
                        ctx.push_log(
                            LogLevel::Error,
                            format!("Nested action {index} ({}) failed: {e}", action.kind),
                            metadata,
                        );
                        return Err(ActionError::Nested {
                            index,
                            kind: action.kind,
                            source: Box::new(e),
                        });
                    }
                }
            }
            Ok(results)
        })
    }

    /// Schema errors for one action, prefixed with its position label.
    pub fn validate_action(&self, label: &str, action: &Action) -> Vec<String> {
        match self.executors.get(&action.kind) {
            Some(executor) => executor
                .validate(&action.config, self)
                .into_iter()
                .map(|e| format!("{label} ({}): {e}", action.kind))
                .collect(),
            None => vec![format!("{label}: no executor registered for '{}'", action.kind)],
        }
    }
}
