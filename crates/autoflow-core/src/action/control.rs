//! Control-flow actions: `wait`, `conditional` and `loop`.
//!
//! Nested action lists arrive un-interpolated and are dispatched through the
//! registry, so each nested action sees the context as it is at that moment
//! (including the loop's `item`).

use std::time::Duration;

use autoflow_types::workflow::{Action, ActionKind};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use super::{ActionError, ActionExecutor, ActionRegistry, as_u64, nested_actions, optional_str, required_str};
use crate::condition::{evaluate_condition, parse};
use crate::context::ExecutionContext;

/// Validate each nested action under `key`, labelling errors by position.
fn validate_nested(config: &Value, key: &str, registry: &ActionRegistry) -> Vec<String> {
    match config.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match serde_json::from_value::<Vec<Action>>(value.clone()) {
            Ok(actions) => actions
                .iter()
                .enumerate()
                .flat_map(|(i, action)| registry.validate_action(&format!("{key}[{i}]"), action))
                .collect(),
            Err(e) => vec![format!("'{key}' is not a valid action list: {e}")],
        },
    }
}

// ---------------------------------------------------------------------------
// wait
// ---------------------------------------------------------------------------

pub struct Wait;

impl Wait {
    /// Duration from `duration_ms` / `duration` (ms), `seconds`, or `minutes`.
    /// `None` when absent, negative, or too large to represent.
    fn duration(config: &Value) -> Option<Duration> {
        if let Some(ms) = config.get("duration_ms").or_else(|| config.get("duration")).and_then(as_u64) {
            return Some(Duration::from_millis(ms));
        }
        if let Some(secs) = config.get("seconds").and_then(as_u64) {
            return Some(Duration::from_secs(secs));
        }
        config
            .get("minutes")
            .and_then(as_u64)
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    }
}

impl ActionExecutor for Wait {
    fn kind(&self) -> ActionKind {
        ActionKind::Wait
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let templated = ["duration_ms", "duration", "seconds", "minutes"]
            .iter()
            .any(|k| config.get(*k).and_then(Value::as_str).is_some_and(|s| s.contains("{{")));
        if Self::duration(config).is_none() && !templated {
            if config.get("minutes").and_then(as_u64).is_some() {
                return vec!["'minutes' is out of range".to_string()];
            }
            return vec!["one of 'duration_ms', 'seconds' or 'minutes' is required".to_string()];
        }
        Vec::new()
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let duration = Self::duration(&config)
                .ok_or_else(|| ActionError::invalid(self.kind(), "a non-negative, representable duration is required"))?;

            tracing::debug!(execution_id = %ctx.execution_id(), ms = duration.as_millis() as u64, "waiting");
            tokio::time::sleep(duration).await;

            Ok(json!({"waited_ms": duration.as_millis() as u64}))
        })
    }
}

// ---------------------------------------------------------------------------
// conditional
// ---------------------------------------------------------------------------

pub struct Conditional;

impl ActionExecutor for Conditional {
    fn kind(&self) -> ActionKind {
        ActionKind::Conditional
    }

    fn validate(&self, config: &Value, registry: &ActionRegistry) -> Vec<String> {
        let mut errors = Vec::new();
        match optional_str(config, "condition") {
            None => errors.push("'condition' is required".to_string()),
            Some(expr) if !expr.contains("{{") => {
                if let Err(e) = parse(&expr) {
                    errors.push(format!("invalid condition: {e}"));
                }
            }
            Some(_) => {}
        }
        errors.extend(validate_nested(config, "then", registry));
        errors.extend(validate_nested(config, "else", registry));
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let condition = required_str(&config, "condition", self.kind())?;
            let then_actions = nested_actions(&config, "then", self.kind())?;
            let else_actions = nested_actions(&config, "else", self.kind())?;

            let result = evaluate_condition(&condition, ctx.as_value());
            let (branch, actions) = if result {
                ("then", &then_actions)
            } else {
                ("else", &else_actions)
            };

            let results = registry.execute_nested(actions, ctx).await?;
            Ok(json!({
                "condition": condition,
                "result": result,
                "branch": branch,
                "results": results,
            }))
        })
    }
}

// ---------------------------------------------------------------------------
// loop
// ---------------------------------------------------------------------------

pub struct Loop;

fn is_plain_key(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('.')
}

impl ActionExecutor for Loop {
    fn kind(&self) -> ActionKind {
        ActionKind::Loop
    }

    fn validate(&self, config: &Value, registry: &ActionRegistry) -> Vec<String> {
        let mut errors = Vec::new();
        match config.get("items") {
            Some(Value::Array(_)) => {}
            Some(Value::String(s)) if s.contains("{{") => {}
            _ => errors.push("'items' must be an array or a template resolving to one".to_string()),
        }
        if config.get("actions").is_none() {
            errors.push("'actions' is required".to_string());
        }
        if optional_str(config, "item_variable").is_some_and(|v| !is_plain_key(&v)) {
            errors.push("'item_variable' must be a plain name without dots".to_string());
        }
        errors.extend(validate_nested(config, "actions", registry));
        errors
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let items = match config.get("items") {
                Some(Value::Array(items)) => items.clone(),
                Some(other) => {
                    return Err(ActionError::invalid(
                        self.kind(),
                        format!("'items' did not resolve to an array: {other}"),
                    ));
                }
                None => return Err(ActionError::invalid(self.kind(), "'items' is required")),
            };
            let actions = nested_actions(&config, "actions", self.kind())?;
            let variable = optional_str(&config, "item_variable").unwrap_or_else(|| "item".to_string());
            // Saved and restored as a top-level key.
            if !is_plain_key(&variable) {
                return Err(ActionError::invalid(
                    self.kind(),
                    format!("'item_variable' must be a plain name without dots: {variable}"),
                ));
            }
            let cap = config
                .get("max_iterations")
                .and_then(as_u64)
                .map(|m| m as usize)
                .unwrap_or(registry.max_loop_iterations());

            if items.len() > cap {
                tracing::warn!(
                    execution_id = %ctx.execution_id(),
                    items = items.len(),
                    cap,
                    "loop truncated to max_iterations"
                );
            }

            let previous_item = ctx.take(&variable);
            let previous_index = ctx.take("index");

            let mut iterations = Vec::new();
            let mut outcome = Ok(());
            for (index, item) in items.into_iter().take(cap).enumerate() {
                ctx.set(&variable, item);
                ctx.set("index", json!(index));
                match registry.execute_nested(&actions, ctx).await {
                    Ok(results) => iterations.push(json!({"index": index, "results": results})),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            ctx.restore(&variable, previous_item);
            ctx.restore("index", previous_index);
            outcome?;

            Ok(json!({"iterations": iterations.len(), "results": iterations}))
        })
    }
}
