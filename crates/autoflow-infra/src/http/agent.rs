//! Client for the external AI agent service used by the `ai_agent` action.

use autoflow_core::collaborator::AgentClient;
use autoflow_types::config::AgentConfig;
use autoflow_types::error::CollaboratorError;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{parse_body, request_error};

/// POSTs `{task, data}` to `{base_url}/agents/{name}/invoke` and returns the
/// JSON answer.
///
/// Deliberately not `Debug`: the API key must never reach logs.
pub struct HttpAgentClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl HttpAgentClient {
    pub fn new(client: reqwest::Client, config: &AgentConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.as_deref().map(|k| SecretString::from(k.to_string())),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, agent_name: &str) -> String {
        format!("{}/agents/{agent_name}/invoke", self.base_url)
    }
}

impl AgentClient for HttpAgentClient {
    fn invoke<'a>(
        &'a self,
        agent_name: &'a str,
        task: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .post(self.url(agent_name))
                .json(&json!({"task": task, "data": data}));
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key.expose_secret());
            }

            tracing::debug!(agent = agent_name, "invoking agent");
            let response = builder.send().await.map_err(request_error)?;
            let status = response.status();
            let text = response.text().await.map_err(request_error)?;

            if !status.is_success() {
                return Err(CollaboratorError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }
            Ok(parse_body(&text))
        })
    }
}

/// Stand-in used when no `[agent]` section is configured.
pub struct DisabledAgent;

impl AgentClient for DisabledAgent {
    fn invoke<'a>(
        &'a self,
        _agent_name: &'a str,
        _task: &'a str,
        _data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::NotConfigured("agent service".to_string())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_url_trims_trailing_slash() {
        let client = HttpAgentClient::new(
            reqwest::Client::new(),
            &AgentConfig {
                base_url: "https://agents.example.com/".to_string(),
                api_key: Some("test-key".to_string()),
            },
        );
        assert_eq!(client.url("triage"), "https://agents.example.com/agents/triage/invoke");
        assert_eq!(client.api_key.as_ref().unwrap().expose_secret(), "test-key");
    }

    #[tokio::test]
    async fn test_disabled_agent_reports_not_configured() {
        let err = DisabledAgent.invoke("triage", "classify", Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "agent service is not configured");
    }
}
