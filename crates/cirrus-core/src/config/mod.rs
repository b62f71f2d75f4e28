//! Configuration management for Cirrus.
//!
//! This module handles loading, saving, and managing Cirrus configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/cirrus/config.toml` |
//! | macOS | `~/Library/Application Support/Cirrus/config.toml` |
//! | Windows | `%APPDATA%\Cirrus\config.toml` |
//!
//! Resumable-transfer session records live in a `sessions` subdirectory of
//! the same configuration directory; the persisted credential lives in
//! `credential.json` next to the config file.
//!
//! Endpoint URLs are explicit configuration fields rather than process-wide
//! overrides, so tests can point a client at a local fixture without
//! touching shared state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Cirrus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API endpoints and OAuth client settings
    pub api: ApiConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Retry policy for request execution
    pub retry: RetryConfig,
}

/// Remote API endpoints and OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the storage REST API
    pub base_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    /// OAuth2 device-code initiation endpoint
    pub devicecode_url: String,
    /// OAuth2 public client identifier
    pub client_id: String,
    /// Requested OAuth2 scopes
    pub scope: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0/me".to_string(),
            token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string(),
            devicecode_url: "https://login.microsoftonline.com/common/oauth2/v2.0/devicecode"
                .to_string(),
            client_id: String::new(),
            scope: "Files.ReadWrite offline_access".to_string(),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes; must be a multiple of the server's 320 KiB
    /// fragment granularity
    pub chunk_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical request
    pub max_attempts: u32,
    /// Base backoff delay in seconds
    pub base_delay_secs: u64,
    /// Backoff delay ceiling in seconds
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1,
            max_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    /// Base backoff delay as a [`Duration`].
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// Backoff delay ceiling as a [`Duration`].
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Internal(format!("failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::Internal(format!("failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("failed to create config directory: {e}")))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::Internal(format!("failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cirrus", "Cirrus")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Get the directory holding resumable-transfer session records.
    #[must_use]
    pub fn sessions_dir() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sessions")
    }

    /// Get the full path to the persisted credential file.
    #[must_use]
    pub fn credential_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("credential.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(10));
        assert_eq!(
            config.transfer.chunk_size % crate::UPLOAD_FRAGMENT_GRANULARITY,
            0
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let mut original = Config::default();
        original.api.client_id = "11111111-2222-3333-4444-555555555555".to_string();
        original.transfer.chunk_size = 640 * 1024;
        original.retry.max_attempts = 5;

        let content = toml::to_string_pretty(&original).expect("serialize");
        let loaded: Config = toml::from_str(&content).expect("parse");

        assert_eq!(
            loaded.api.client_id,
            "11111111-2222-3333-4444-555555555555"
        );
        assert_eq!(loaded.transfer.chunk_size, 640 * 1024);
        assert_eq!(loaded.retry.max_attempts, 5);
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[api]
client_id = "my-client"

[retry]
max_attempts = 7
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.api.client_id, "my-client");
        assert_eq!(config.retry.max_attempts, 7);

        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.retry.base_delay_secs, 1);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(
            path.ends_with("config.toml"),
            "Config path should end with config.toml"
        );
    }
}
