//! Configuration loading and management.
//!
//! Configuration is loaded with the following precedence:
//! 1. Environment variables (`PARLEY_*`)
//! 2. Config file (`~/.parley/config.toml`)
//! 3. Defaults

use crate::error::{Error, Result};
use crate::storage::get_parley_home;
use chrono::Duration;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Retention configuration.
    pub retention: RetentionConfig,

    /// Chat endpoint configuration.
    pub endpoint: EndpointConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the parley home directory.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: get_parley_home(),
        }
    }
}

/// How long archived and trashed conversations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days a conversation stays archived or trashed before it is purged.
    pub retention_days: u32,
}

impl RetentionConfig {
    /// Smallest accepted retention window.
    pub const MIN_DAYS: u32 = 1;

    /// Create a retention config, clamping to at least one day.
    #[must_use]
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention_days: retention_days.max(Self::MIN_DAYS),
        }
    }

    /// Return a copy with the clamp applied.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self::new(self.retention_days)
    }

    /// The retention window as a duration.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::days(i64::from(self.retention_days.max(Self::MIN_DAYS)))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

/// Chat endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL that answers with a server-sent event stream.
    pub stream_url: String,

    /// URL that answers with a single JSON object.
    pub complete_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            stream_url: "http://127.0.0.1:8080/api/chat/stream".to_string(),
            complete_url: "http://127.0.0.1:8080/api/chat".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for parley's own targets when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration with precedence: env vars → file → defaults.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    let config_path = get_config_path();
    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        config = parse_config(&contents)?;
    }

    apply_env_overrides(&mut config);
    config.retention = config.retention.clamped();

    Ok(config)
}

/// Parse a TOML config document.
///
/// # Errors
///
/// Returns an error if the document is not valid TOML for [`Config`].
pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
    config.retention = config.retention.clamped();
    Ok(config)
}

/// Get the path to the config file.
fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("PARLEY_CONFIG") {
        return PathBuf::from(path);
    }

    get_parley_home().join("config.toml")
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(path) = env::var("PARLEY_STORAGE_PATH") {
        config.storage.path = PathBuf::from(path);
    } else if let Ok(home) = env::var("PARLEY_HOME") {
        config.storage.path = PathBuf::from(home);
    }

    if let Ok(val) = env::var("PARLEY_RETENTION_DAYS") {
        if let Ok(days) = val.parse() {
            config.retention.retention_days = days;
        }
    }

    if let Ok(url) = env::var("PARLEY_STREAM_URL") {
        config.endpoint.stream_url = url;
    }

    if let Ok(url) = env::var("PARLEY_COMPLETE_URL") {
        config.endpoint.complete_url = url;
    }

    if let Ok(level) = env::var("PARLEY_LOG_LEVEL") {
        config.logging.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.retention.retention_days, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.endpoint.stream_url.ends_with("/stream"));
    }

    #[test]
    fn retention_is_clamped() {
        assert_eq!(RetentionConfig::new(0).retention_days, 1);
        assert_eq!(RetentionConfig::new(14).retention_days, 14);
        assert_eq!(RetentionConfig::new(2).window(), Duration::milliseconds(2 * 86_400_000));
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
            [retention]
            retention_days = 7

            [endpoint]
            stream_url = "https://chat.example/stream"
            complete_url = "https://chat.example/complete"

            [logging]
            level = "debug"
        "#;

        let config = parse_config(toml).unwrap();
        assert_eq!(config.retention.retention_days, 7);
        assert_eq!(config.endpoint.stream_url, "https://chat.example/stream");
        assert_eq!(config.endpoint.complete_url, "https://chat.example/complete");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn parse_config_clamps_zero_retention() {
        let config = parse_config("[retention]\nretention_days = 0\n").unwrap();
        assert_eq!(config.retention.retention_days, 1);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config = parse_config("[logging]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.retention.retention_days, 30);
    }

    #[test]
    fn invalid_config_is_a_config_error() {
        let err = parse_config("[retention]\nretention_days = \"soon\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
