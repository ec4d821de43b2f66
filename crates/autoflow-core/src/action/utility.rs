//! Utility actions: `log`, `set_variable` and `calculate`.

use autoflow_types::execution::LogLevel;
use autoflow_types::workflow::ActionKind;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use super::{ActionError, ActionExecutor, ActionRegistry, check_required, optional_str, required_str};
use crate::condition::{parse, try_evaluate};
use crate::context::ExecutionContext;

// ---------------------------------------------------------------------------
// log
// ---------------------------------------------------------------------------

/// Appends a line to the execution log via the context journal.
pub struct Log;

impl ActionExecutor for Log {
    fn kind(&self) -> ActionKind {
        ActionKind::Log
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["message"]);
        if let Some(level) = optional_str(config, "level") {
            if let Err(e) = level.parse::<LogLevel>() {
                errors.push(e);
            }
        }
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let message = required_str(&config, "message", self.kind())?;
            let level = match optional_str(&config, "level") {
                Some(level) => level
                    .parse::<LogLevel>()
                    .map_err(|e| ActionError::invalid(self.kind(), e))?,
                None => LogLevel::Info,
            };

            tracing::info!(execution_id = %ctx.execution_id(), %level, "{message}");
            let metadata = config.get("data").cloned().unwrap_or_else(|| json!({}));
            ctx.push_log(level, message.clone(), metadata);

            Ok(json!({"message": message, "level": level}))
        })
    }
}

// ---------------------------------------------------------------------------
// set_variable
// ---------------------------------------------------------------------------

pub struct SetVariable;

impl ActionExecutor for SetVariable {
    fn kind(&self) -> ActionKind {
        ActionKind::SetVariable
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        check_required(config, &["name"])
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let name = required_str(&config, "name", self.kind())?;
            let value = config.get("value").cloned().unwrap_or(Value::Null);
            ctx.set(&name, value.clone());
            Ok(json!({"name": name, "value": value}))
        })
    }
}

// ---------------------------------------------------------------------------
// calculate
// ---------------------------------------------------------------------------

/// Evaluates an arithmetic expression over context values, e.g.
/// `subtotal * 1.08`, and optionally stores the result.
pub struct Calculate;

impl ActionExecutor for Calculate {
    fn kind(&self) -> ActionKind {
        ActionKind::Calculate
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["expression"]);
        if let Some(expr) = optional_str(config, "expression") {
            if !expr.contains("{{") {
                if let Err(e) = parse(&expr) {
                    errors.push(format!("invalid expression: {e}"));
                }
            }
        }
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let expression = required_str(&config, "expression", self.kind())?;
            let result = try_evaluate(&expression, ctx.as_value())?;

            if let Some(variable) = optional_str(&config, "result_variable") {
                ctx.set(&variable, result.clone());
            }
            Ok(json!({"expression": expression, "result": result}))
        })
    }
}
