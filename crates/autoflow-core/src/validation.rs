//! Static validation of raw workflow definitions.
//!
//! Works on the untyped JSON so that every problem is reported at once,
//! instead of stopping at the first serde error.

use autoflow_types::workflow::{Action, ActionKind, TriggerType, ValidationReport};
use serde_json::Value;

use crate::action::ActionRegistry;
use crate::trigger::validate_trigger_config;

const ON_ERROR_VALUES: [&str; 3] = ["continue", "stop", "retry"];

/// Validate a workflow definition: name, trigger type and config, and each
/// action's type, error policy and kind-specific config.
pub fn validate_definition(definition: &Value, registry: &ActionRegistry) -> ValidationReport {
    let mut errors = Vec::new();

    let Some(fields) = definition.as_object() else {
        return ValidationReport::from_errors(vec!["definition must be an object".to_string()]);
    };

    match fields.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        _ => errors.push("'name' is required".to_string()),
    }

    let trigger_type = match fields.get("trigger_type").and_then(Value::as_str) {
        Some(raw) => match raw.parse::<TriggerType>() {
            Ok(trigger_type) => Some(trigger_type),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        None => {
            errors.push("'trigger_type' is required".to_string());
            None
        }
    };
    if let Some(trigger_type) = trigger_type {
        let config = fields.get("trigger_config").cloned().unwrap_or(Value::Null);
        let config = if config.is_null() { serde_json::json!({}) } else { config };
        if let Err(e) = validate_trigger_config(trigger_type, &config) {
            errors.push(format!("trigger_config: {e}"));
        }
    }

    match fields.get("actions") {
        Some(Value::Array(actions)) => {
            for (index, raw) in actions.iter().enumerate() {
                errors.extend(validate_raw_action(&format!("actions[{index}]"), raw, registry));
            }
        }
        None => errors.push("'actions' is required".to_string()),
        Some(_) => errors.push("'actions' must be an array".to_string()),
    }

    ValidationReport::from_errors(errors)
}

fn validate_raw_action(label: &str, raw: &Value, registry: &ActionRegistry) -> Vec<String> {
    let Some(fields) = raw.as_object() else {
        return vec![format!("{label}: action must be an object")];
    };

    let mut errors = Vec::new();
    match fields.get("type").and_then(Value::as_str) {
        Some(kind) => {
            if let Err(e) = kind.parse::<ActionKind>() {
                errors.push(format!("{label}: {e}"));
            }
        }
        None => errors.push(format!("{label}: 'type' is required")),
    }

    if let Some(policy) = fields.get("on_error") {
        if !policy.as_str().is_some_and(|p| ON_ERROR_VALUES.contains(&p)) {
            errors.push(format!("{label}: 'on_error' must be one of continue, stop, retry"));
        }
    }
    if let Some(count) = fields.get("retry_count") {
        if count.as_u64().is_none_or(|c| c > u32::MAX as u64) {
            errors.push(format!("{label}: 'retry_count' must be a non-negative integer"));
        }
    }
    if fields.get("config").is_some_and(|c| !c.is_object()) {
        errors.push(format!("{label}: 'config' must be an object"));
    }

    // Kind-specific checks only make sense once the envelope is sound.
    if errors.is_empty() {
        match serde_json::from_value::<Action>(raw.clone()) {
            Ok(action) => errors.extend(registry.validate_action(label, &action)),
            Err(e) => errors.push(format!("{label}: {e}")),
        }
    }
    errors
}
