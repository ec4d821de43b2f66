//! Mutable execution context shared by the actions of one workflow run.
//!
//! The context is a JSON object that templates and conditions resolve
//! against. It starts as the trigger payload and grows as actions run:
//! `set_variable` / `calculate` write into it, `loop` temporarily binds
//! `item`, and every action result is recorded under `results`.

use autoflow_types::execution::LogLevel;
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Top-level keys owned by the engine. Trigger fields with these names are
/// still reachable through `trigger.<key>`.
const RESERVED_KEYS: [&str; 4] = ["trigger", "workflow", "execution", "results"];

/// A log line produced by an action (e.g. `log`), persisted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Value,
}

/// Execution-scoped state visible to interpolation and conditions.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    execution_id: Uuid,
    workflow_id: Uuid,
    root: Value,
    journal: Vec<JournalEntry>,
}

impl ExecutionContext {
    /// Build the initial context for a run.
    ///
    /// Object payloads are also flattened into the root so `{{item.id}}` or
    /// `{{NEW.status}}`-style paths work without the `trigger.` prefix.
    pub fn new(
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: &str,
        trigger_data: &Value,
    ) -> Self {
        let mut root = Map::new();
        if let Value::Object(fields) = trigger_data {
            for (key, value) in fields {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    root.insert(key.clone(), value.clone());
                }
            }
        }
        root.insert("trigger".to_string(), trigger_data.clone());
        root.insert(
            "workflow".to_string(),
            json!({"id": workflow_id.to_string(), "name": workflow_name}),
        );
        root.insert("execution".to_string(), json!({"id": execution_id.to_string()}));
        root.insert("results".to_string(), Value::Object(Map::new()));

        Self {
            execution_id,
            workflow_id,
            root: Value::Object(root),
            journal: Vec::new(),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// The whole context as a JSON value, for interpolation and conditions.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        crate::template::resolve_path(&self.root, path)
    }

    /// Set a value at a dotted path, creating intermediate objects.
    /// Non-object intermediates are replaced.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in parents {
            if !current.get(*segment).is_some_and(Value::is_object) {
                if let Value::Object(map) = current {
                    map.insert((*segment).to_string(), Value::Object(Map::new()));
                }
            }
            current = match current {
                Value::Object(map) => match map.get_mut(*segment) {
                    Some(next) => next,
                    None => return,
                },
                _ => return,
            };
        }

        if let Value::Object(map) = current {
            map.insert((*last).to_string(), value);
        }
    }

    /// Remove a top-level key, returning its previous value.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        match &mut self.root {
            Value::Object(map) => map.remove(key),
            _ => None,
        }
    }

    /// Restore a top-level key to a previously taken value (or remove it).
    pub fn restore(&mut self, key: &str, previous: Option<Value>) {
        match previous {
            Some(value) => self.set(key, value),
            None => {
                self.take(key);
            }
        }
    }

    /// Record an action's output under `results.<index>` and, when the
    /// action is named, `results.<name>`.
    pub fn record_result(&mut self, index: usize, name: Option<&str>, output: &Value) {
        self.set(&format!("results.{index}"), output.clone());
        if let Some(name) = name {
            self.set(&format!("results.{name}"), output.clone());
        }
    }

    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>, metadata: Value) {
        self.journal.push(JournalEntry {
            level,
            message: message.into(),
            metadata,
        });
    }

    /// Take all journal entries accumulated since the last drain.
    pub fn drain_journal(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.journal)
    }
}
