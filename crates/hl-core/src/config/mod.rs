//! Configuration management for hostlink

mod agent;
mod backoff;
pub mod serde_utils;

pub use agent::{AgentConfig, AuthConfig, KeepaliveConfig, ProxyConfig, QueueConfig};
pub use backoff::BackoffConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hostlink")
}

/// Get the default agent configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("agent.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result = load_config::<AgentConfig>(&path);
        assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
            proxy_url = "ws://broker.internal:9345/v1/connectbackend"

            [auth]
            enabled = true
            shared_key = "s3cret"
            "#,
        )
        .unwrap();

        let loaded: AgentConfig = load_config(&path).unwrap();
        assert_eq!(loaded.proxy_url, "ws://broker.internal:9345/v1/connectbackend");
        assert!(loaded.auth.enabled);
        assert_eq!(loaded.auth.shared_key.as_deref(), Some("s3cret"));
        assert_eq!(
            loaded.keepalive.max_wait,
            AgentConfig::default().keepalive.max_wait
        );
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "proxy_url = [").unwrap();

        let result = load_config::<AgentConfig>(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
