//! Outbound calls: `webhook` and `ai_agent`.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoflow_types::workflow::ActionKind;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use super::{
    ActionError, ActionExecutor, ActionRegistry, as_u64, check_object, check_required,
    optional_str, required_str,
};
use crate::collaborator::{AgentClient, HttpClient, HttpRequest};
use crate::context::ExecutionContext;
use crate::template::value_to_string;

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

// ---------------------------------------------------------------------------
// webhook
// ---------------------------------------------------------------------------

pub struct Webhook {
    http: Arc<dyn HttpClient>,
}

impl Webhook {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn build_request(config: &Value) -> Result<HttpRequest, ActionError> {
        let kind = ActionKind::Webhook;
        let url = required_str(config, "url", kind)?;
        let method = optional_str(config, "method")
            .unwrap_or_else(|| "POST".to_string())
            .to_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(ActionError::invalid(kind, format!("unsupported method '{method}'")));
        }

        let headers = match config.get("headers") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
            _ => BTreeMap::new(),
        };

        // `payload` is accepted as an alias of `body`.
        let body = config
            .get("body")
            .or_else(|| config.get("payload"))
            .filter(|b| !b.is_null())
            .cloned();

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
            timeout_secs: config.get("timeout_secs").and_then(as_u64),
        })
    }
}

impl ActionExecutor for Webhook {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        let mut errors = check_required(config, &["url"]);
        errors.extend(check_object(config, "headers"));
        if let Some(method) = optional_str(config, "method") {
            if !METHODS.contains(&method.to_uppercase().as_str()) {
                errors.push(format!("unsupported method '{method}'"));
            }
        }
        if let Some(url) = optional_str(config, "url") {
            if !url.contains("{{") && !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push("'url' must be an http(s) URL".to_string());
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
            let request = Self::build_request(&config)?;
            let method = request.method.clone();
            let url = request.url.clone();

            let response = self.http.send(request).await?;
            tracing::debug!(
                execution_id = %ctx.execution_id(),
                %method,
                %url,
                status = response.status,
                "webhook response"
            );

            if !response.is_success() {
                return Err(ActionError::WebhookStatus {
                    method,
                    url,
                    status: response.status,
                    body: value_to_string(&response.body),
                });
            }

            Ok(json!({"status": response.status, "body": response.body, "headers": response.headers}))
        })
    }
}

// ---------------------------------------------------------------------------
// ai_agent
// ---------------------------------------------------------------------------

pub struct AiAgent {
    client: Arc<dyn AgentClient>,
}

impl AiAgent {
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self { client }
    }
}

impl ActionExecutor for AiAgent {
    fn kind(&self) -> ActionKind {
        ActionKind::AiAgent
    }

    fn validate(&self, config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        check_required(config, &["agent", "task"])
    }

    fn execute<'a>(
        &'a self,
        config: Value,
        ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let agent = required_str(&config, "agent", self.kind())?;
            let task = required_str(&config, "task", self.kind())?;
            let data = config
                .get("data")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            let response = self
                .client
                .invoke(&agent, &task, data)
                .await
                .map_err(|source| ActionError::Agent {
                    agent: agent.clone(),
                    source,
                })?;

            if let Some(variable) = optional_str(&config, "result_variable") {
                ctx.set(&variable, response.clone());
            }

            Ok(json!({"agent": agent, "task": task, "response": response}))
        })
    }
}
