//! Global configuration types for Autoflow.
//!
//! `AutoflowConfig` represents the top-level `config.toml` that controls the
//! API server, engine retry behavior, outbound HTTP, and the delivery
//! transports used by the action library.

use serde::{Deserialize, Serialize};

/// Top-level configuration for an Autoflow process.
///
/// Loaded from `~/.autoflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoflowConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Email provider endpoint. Email actions degrade to notifications when absent.
    #[serde(default)]
    pub email: Option<TransportConfig>,
    /// SMS provider endpoint. SMS actions degrade to notifications when absent.
    #[serde(default)]
    pub sms: Option<TransportConfig>,
    /// External AI agent service.
    #[serde(default)]
    pub agent: Option<AgentConfig>,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// REST API listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7840
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Execution engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed delay between retry attempts of an action with `on_error: retry`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Extra attempts used when an action asks for retry but sets `retry_count: 0`.
    #[serde(default = "default_retry_count")]
    pub default_retry_count: u32,
    /// Default number of executions returned by history queries.
    #[serde(default = "default_history_limit")]
    pub execution_history_limit: u32,
    /// Upper bound on loop iterations when an action sets none.
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_history_limit() -> u32 {
    50
}

fn default_max_loop_iterations() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            default_retry_count: default_retry_count(),
            execution_history_limit: default_history_limit(),
            max_loop_iterations: default_max_loop_iterations(),
        }
    }
}

/// Outbound HTTP client settings shared by webhooks and the agent client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("autoflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// HTTP endpoint of an email or SMS provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender address or phone number.
    #[serde(default)]
    pub from: Option<String>,
}

/// External AI agent service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Push delivery for `send_notification`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// When set, notifications are POSTed here; otherwise they are stored
    /// in the `notifications` table.
    #[serde(default)]
    pub push_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = AutoflowConfig::default();
        assert_eq!(config.server.port, 7840);
        assert_eq!(config.engine.retry_delay_ms, 1_000);
        assert_eq!(config.engine.default_retry_count, 3);
        assert!(config.email.is_none());
        assert!(config.notifications.push_url.is_none());
        assert!(config.http.user_agent.starts_with("autoflow/"));
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: AutoflowConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.engine.execution_history_limit, 50);
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[server]
port = 9000

[engine]
retry_delay_ms = 250

[email]
url = "https://mail.example.com/send"
api_key = "key-123"
from = "ops@example.com"

[agent]
base_url = "https://agents.example.com"

[notifications]
push_url = "https://hooks.example.com/notify"
"#;
        let config: AutoflowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.engine.retry_delay_ms, 250);
        assert_eq!(config.engine.default_retry_count, 3);
        let email = config.email.unwrap();
        assert_eq!(email.from.as_deref(), Some("ops@example.com"));
        assert!(config.sms.is_none());
        assert_eq!(config.agent.unwrap().base_url, "https://agents.example.com");
        assert!(config.notifications.push_url.is_some());
    }
}
