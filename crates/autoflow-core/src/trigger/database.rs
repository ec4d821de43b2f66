//! `database_event` trigger config and event matching.

use autoflow_types::record::{ChangeEvent, ChangeKind};
use serde_json::{Map, Value, json};

use super::TriggerError;
use crate::condition::{evaluate_condition, parse};

/// Parsed `{table, event, condition?}` config.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseTriggerSpec {
    pub table: String,
    /// `None` matches every change kind (`event: "*"`).
    pub event: Option<ChangeKind>,
    pub condition: Option<String>,
}

impl DatabaseTriggerSpec {
    pub fn from_config(config: &Value) -> Result<Self, TriggerError> {
        let table = config
            .get("table")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TriggerError::InvalidConfig("'table' is required".to_string()))?
            .to_string();

        let event = match config.get("event").and_then(Value::as_str) {
            None | Some("*") | Some("all") | Some("any") => None,
            Some(kind) => Some(kind.parse::<ChangeKind>().map_err(TriggerError::InvalidConfig)?),
        };
        if config.get("event").is_some_and(|e| !e.is_string()) {
            return Err(TriggerError::InvalidConfig("'event' must be a string".to_string()));
        }

        let condition = match config.get("condition") {
            None | Some(Value::Null) => None,
            Some(Value::String(expr)) if expr.trim().is_empty() => None,
            Some(Value::String(expr)) => {
                parse(expr).map_err(|e| TriggerError::InvalidConfig(format!("invalid condition: {e}")))?;
                Some(expr.clone())
            }
            Some(_) => return Err(TriggerError::InvalidConfig("'condition' must be a string".to_string())),
        };

        Ok(Self { table, event, condition })
    }

    /// Whether the event is for this table and change kind.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && self.event.is_none_or(|kind| kind == event.kind)
    }

    /// Execution payload: the new row's fields flattened at the top level,
    /// plus `event`, `table`, `record_id`, `old` and `new`.
    pub fn trigger_data(event: &ChangeEvent) -> Value {
        let mut data = match &event.new {
            Some(Value::Object(fields)) => fields.clone(),
            _ => Map::new(),
        };
        data.insert("event".to_string(), json!(event.kind.as_str()));
        data.insert("table".to_string(), json!(event.table));
        data.insert("record_id".to_string(), json!(event.record_id));
        data.insert("old".to_string(), event.old.clone().unwrap_or(Value::Null));
        data.insert("new".to_string(), event.new.clone().unwrap_or(Value::Null));
        Value::Object(data)
    }

    /// Evaluate the optional condition against a payload built by
    /// [`trigger_data`](Self::trigger_data). Fails closed.
    pub fn should_fire(&self, trigger_data: &Value) -> bool {
        match &self.condition {
            Some(condition) => evaluate_condition(condition, trigger_data),
            None => true,
        }
    }

    pub fn describe(&self) -> String {
        let event = self.event.map(|k| k.as_str()).unwrap_or("*");
        match &self.condition {
            Some(condition) => format!("{event} on {} when {condition}", self.table),
            None => format!("{event} on {}", self.table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(old: Value, new: Value) -> ChangeEvent {
        ChangeEvent {
            table: "invoices".to_string(),
            kind: ChangeKind::Update,
            record_id: "inv-1".to_string(),
            old: Some(old),
            new: Some(new),
        }
    }

    #[test]
    fn test_from_config() {
        let spec = DatabaseTriggerSpec::from_config(&json!({"table": "invoices", "event": "UPDATE"})).unwrap();
        assert_eq!(spec.event, Some(ChangeKind::Update));
        let any = DatabaseTriggerSpec::from_config(&json!({"table": "invoices", "event": "*"})).unwrap();
        assert_eq!(any.event, None);

        assert!(DatabaseTriggerSpec::from_config(&json!({"event": "insert"})).is_err());
        assert!(DatabaseTriggerSpec::from_config(&json!({"table": "x", "event": "upsert"})).is_err());
        assert!(DatabaseTriggerSpec::from_config(&json!({"table": "x", "condition": "a =="})).is_err());
    }

    #[test]
    fn test_matches_table_and_kind() {
        let spec = DatabaseTriggerSpec::from_config(&json!({"table": "invoices", "event": "update"})).unwrap();
        assert!(spec.matches(&update(json!({}), json!({}))));

        let mut insert = update(json!({}), json!({}));
        insert.kind = ChangeKind::Insert;
        assert!(!spec.matches(&insert));

        let mut other_table = update(json!({}), json!({}));
        other_table.table = "jobs".to_string();
        assert!(!spec.matches(&other_table));
    }

    #[test]
    fn test_condition_against_row_images() {
        let spec = DatabaseTriggerSpec::from_config(&json!({
            "table": "invoices",
            "event": "update",
            "condition": "OLD.status != 'paid' && NEW.status == 'paid'"
        }))
        .unwrap();

        let paid = DatabaseTriggerSpec::trigger_data(&update(json!({"status": "sent"}), json!({"status": "paid", "total": 10})));
        assert!(spec.should_fire(&paid));
        assert_eq!(paid["total"], 10);
        assert_eq!(paid["event"], "update");

        let still_sent = DatabaseTriggerSpec::trigger_data(&update(json!({"status": "sent"}), json!({"status": "sent"})));
        assert!(!spec.should_fire(&still_sent));
    }

    #[test]
    fn test_delete_payload_has_null_new() {
        let event = ChangeEvent {
            table: "jobs".to_string(),
            kind: ChangeKind::Delete,
            record_id: "j1".to_string(),
            old: Some(json!({"id": "j1"})),
            new: None,
        };
        let data = DatabaseTriggerSpec::trigger_data(&event);
        assert_eq!(data["new"], Value::Null);
        assert_eq!(data["old"]["id"], "j1");
        assert_eq!(data["record_id"], "j1");
    }
}
