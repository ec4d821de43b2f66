//! Configuration loader for Autoflow.
//!
//! Reads `config.toml` from the data directory (`~/.autoflow/` by default)
//! and deserializes it into [`AutoflowConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use autoflow_types::config::AutoflowConfig;

/// Data directory from `AUTOFLOW_DATA_DIR`, else `~/.autoflow`.
pub fn default_data_dir() -> PathBuf {
    match std::env::var("AUTOFLOW_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".autoflow")
        }
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`AutoflowConfig::default()`].
/// - Unreadable or unparsable file: a warning, then the default.
pub async fn load_config(data_dir: &Path) -> AutoflowConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AutoflowConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AutoflowConfig::default();
        }
    };

    match toml::from_str::<AutoflowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            AutoflowConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 7840);
        assert!(config.email.is_none());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 8100

[engine]
retry_delay_ms = 50
default_retry_count = 1

[sms]
url = "https://sms.example.com/messages"
from = "+15550100"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 8100);
        assert_eq!(config.engine.retry_delay_ms, 50);
        assert_eq!(config.engine.default_retry_count, 1);
        assert_eq!(config.sms.unwrap().from.as_deref(), Some("+15550100"));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 7840);
    }

    #[test]
    fn default_data_dir_is_absolute_or_env() {
        let dir = default_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}
