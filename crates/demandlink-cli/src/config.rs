//! Configuration loading for the demandlink CLI.
//!
//! Sources, highest priority first:
//! 1. command-line flags (applied by the caller)
//! 2. environment variables
//! 3. TOML file (`--config`, or `demandlink.toml` in the working directory)
//! 4. built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use demandlink_commands::HttpGatewayConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "demandlink.toml";

/// Environment variable names.
pub mod env_vars {
    pub const GATEWAY_URL: &str = "DEMANDLINK_GATEWAY_URL";
    pub const GATEWAY_TOKEN: &str = "DEMANDLINK_GATEWAY_TOKEN";
    pub const GATEWAY_TIMEOUT_SECS: &str = "DEMANDLINK_GATEWAY_TIMEOUT_SECS";
    pub const DATA_DIR: &str = "DEMANDLINK_DATA_DIR";
    pub const LOG_JSON: &str = "DEMANDLINK_LOG_JSON";
}

/// Event storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Directory holding the event database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: HttpGatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from file and environment.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                info!(category = "config", "Loading config from: {}", path.display());
                Self::from_toml(&content)?
            }
            None => match Self::read_default_file(Path::new(DEFAULT_CONFIG_FILE))? {
                Some(content) => {
                    info!(category = "config", "Loading config from: {}", DEFAULT_CONFIG_FILE);
                    Self::from_toml(&content)?
                }
                None => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read the optional default config file. Only a missing file falls back to defaults.
    fn read_default_file(path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read config {}", path.display()))
            }
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    /// Override values from environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(env_vars::GATEWAY_URL) {
            self.gateway.base_url = url;
        }
        if let Some(token) = lookup(env_vars::GATEWAY_TOKEN) {
            self.gateway.auth_token = Some(token);
        }
        if let Some(timeout) = lookup(env_vars::GATEWAY_TIMEOUT_SECS) {
            self.gateway.timeout_secs = timeout.parse().with_context(|| {
                format!("{} must be a number of seconds", env_vars::GATEWAY_TIMEOUT_SECS)
            })?;
        }
        if let Some(dir) = lookup(env_vars::DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Whether JSON log output is requested.
pub fn json_logging() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.base_url, "http://localhost:8080");
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [gateway]
            base_url = "https://gw.example.net"
            auth_token = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.base_url, "https://gw.example.net");
        assert_eq!(config.gateway.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AppConfig::from_toml("[gateway\nbase_url = 1").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (env_vars::GATEWAY_URL, "http://10.0.0.5:9000"),
            (env_vars::GATEWAY_TIMEOUT_SECS, "3"),
            (env_vars::DATA_DIR, "/var/lib/demandlink"),
        ]);
        let mut config = AppConfig::default();

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.gateway.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.gateway.timeout_secs, 3);
        assert_eq!(
            config.storage.data_dir,
            PathBuf::from("/var/lib/demandlink")
        );
        assert!(config.gateway.auth_token.is_none());
    }

    #[test]
    fn test_missing_default_file_is_optional() {
        let dir = tempfile::TempDir::new().unwrap();
        let content = AppConfig::read_default_file(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert!(content.is_none());
    }

    #[test]
    fn test_unreadable_default_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::create_dir(&path).unwrap();

        let err = AppConfig::read_default_file(&path).unwrap_err();
        assert!(err.to_string().contains(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_bad_timeout_env() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|key| {
            (key == env_vars::GATEWAY_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
