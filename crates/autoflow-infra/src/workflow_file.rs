//! Workflow definition files (YAML or JSON).
//!
//! Files are parsed into an untyped JSON value first so that the full
//! validation report can be produced before conversion into a [`Workflow`].

use std::path::Path;

use autoflow_types::workflow::Workflow;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid workflow: {0}")]
    Definition(String),
}

/// Source format of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
}

impl DefinitionFormat {
    /// `.json` is JSON; everything else (`.yaml`, `.yml`, no extension) is
    /// read as YAML, which also accepts JSON documents.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse definition text into an untyped value.
pub fn parse_definition(text: &str, format: DefinitionFormat) -> Result<Value, WorkflowFileError> {
    match format {
        DefinitionFormat::Json => {
            serde_json::from_str(text).map_err(|e| WorkflowFileError::Json(e.to_string()))
        }
        DefinitionFormat::Yaml => {
            serde_yaml_ng::from_str(text).map_err(|e| WorkflowFileError::Yaml(e.to_string()))
        }
    }
}

/// Read and parse a definition file.
pub async fn read_definition(path: &Path) -> Result<Value, WorkflowFileError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| WorkflowFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
    parse_definition(&text, DefinitionFormat::from_path(path))
}

/// Convert a validated definition into a `Workflow`, assigning a fresh
/// UUIDv7 when the definition carries no `id`.
pub fn workflow_from_definition(definition: &Value) -> Result<Workflow, WorkflowFileError> {
    let mut definition = definition.clone();
    let Some(fields) = definition.as_object_mut() else {
        return Err(WorkflowFileError::Definition("definition must be an object".to_string()));
    };

    if !fields.get("id").is_some_and(Value::is_string) {
        fields.insert("id".to_string(), Value::String(Uuid::now_v7().to_string()));
    }
    let now = Value::String(Utc::now().to_rfc3339());
    fields.entry("created_at").or_insert_with(|| now.clone());
    fields.insert("updated_at".to_string(), now);

    serde_json::from_value(definition).map_err(|e| WorkflowFileError::Definition(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_types::workflow::{ActionKind, TriggerType};

    const YAML: &str = r#"
name: nightly-cleanup
trigger_type: scheduled
trigger_config:
  cron: "0 3 * * *"
  table: sessions
  query:
    filters:
      expired: true
actions:
  - type: delete_record
    config:
      table: sessions
      id: "{{item.id}}"
    on_error: continue
"#;

    #[test]
    fn test_format_from_path() {
        assert_eq!(DefinitionFormat::from_path(Path::new("a.json")), DefinitionFormat::Json);
        assert_eq!(DefinitionFormat::from_path(Path::new("a.YML")), DefinitionFormat::Yaml);
        assert_eq!(DefinitionFormat::from_path(Path::new("workflow")), DefinitionFormat::Yaml);
    }

    #[test]
    fn test_yaml_definition_to_workflow() {
        let value = parse_definition(YAML, DefinitionFormat::Yaml).unwrap();
        let wf = workflow_from_definition(&value).unwrap();
        assert_eq!(wf.name, "nightly-cleanup");
        assert_eq!(wf.trigger_type, TriggerType::Scheduled);
        assert_eq!(wf.trigger_config["query"]["filters"]["expired"], true);
        assert_eq!(wf.actions[0].kind, ActionKind::DeleteRecord);
        assert!(wf.enabled);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let id = Uuid::now_v7();
        let value = serde_json::json!({"id": id.to_string(), "name": "n", "trigger_type": "manual"});
        assert_eq!(workflow_from_definition(&value).unwrap().id, id);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            parse_definition("{", DefinitionFormat::Json),
            Err(WorkflowFileError::Json(_))
        ));
        assert!(matches!(
            workflow_from_definition(&serde_json::json!({"name": "x", "trigger_type": "sometimes"})),
            Err(WorkflowFileError::Definition(_))
        ));
    }

    #[tokio::test]
    async fn test_read_definition_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleanup.yaml");
        tokio::fs::write(&path, YAML).await.unwrap();

        let value = read_definition(&path).await.unwrap();
        assert_eq!(value["trigger_type"], "scheduled");

        let missing = read_definition(&dir.path().join("missing.yaml")).await;
        assert!(matches!(missing, Err(WorkflowFileError::Io { .. })));
    }
}
