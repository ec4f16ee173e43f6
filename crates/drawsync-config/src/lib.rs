#![deny(unsafe_code)]

//! Configuration loading and validation for drawsync.
//!
//! Loads TOML configuration files and validates them after parsing.
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working [`AppConfig`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest export deadline accepted: one hour.
pub const MAX_EXPORT_TIMEOUT_MS: u64 = 3_600_000;

/// Longest long-poll window accepted for editor commands.
pub const MAX_COMMAND_POLL_SECS: u64 = 3_600;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Diagram engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Conversation driver settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP bridge for the embedded editor.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Diagram engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long to wait for the editor to answer an export request.
    #[serde(default = "default_export_timeout_ms")]
    pub export_timeout_ms: u64,
}

impl EngineConfig {
    /// The export deadline as a [`Duration`].
    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            export_timeout_ms: default_export_timeout_ms(),
        }
    }
}

fn default_export_timeout_ms() -> u64 {
    10_000
}

/// Conversation driver configuration.
///
/// The provider itself (endpoint, credentials) lives outside this crate;
/// these values only shape the requests the driver builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-use round trips per user turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Model identifier passed through to the provider (empty = provider default).
    #[serde(default)]
    pub model: String,

    /// Maximum tokens to generate per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0–2.0).
    #[serde(default)]
    pub temperature: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            model: String::new(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

fn default_max_steps() -> usize {
    8
}

fn default_max_tokens() -> u32 {
    4096
}

/// HTTP bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the bridge listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the bridge listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// How long an editor command poll waits before answering "no content".
    #[serde(default = "default_command_poll_secs")]
    pub command_poll_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            command_poll_secs: default_command_poll_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    9210
}

fn default_command_poll_secs() -> u64 {
    25
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.export_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.export_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.engine.export_timeout_ms > MAX_EXPORT_TIMEOUT_MS {
            return Err(ConfigError::Validation(format!(
                "engine.export_timeout_ms must be at most {MAX_EXPORT_TIMEOUT_MS}, got {}",
                self.engine.export_timeout_ms
            )));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::Validation(
                "agent.max_steps must be at least 1".to_string(),
            ));
        }
        if self.agent.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "agent.max_tokens must be non-zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::Validation(format!(
                "agent.temperature must be in [0.0, 2.0], got {}",
                self.agent.temperature
            )));
        }

        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        if self.server.command_poll_secs == 0 {
            return Err(ConfigError::Validation(
                "server.command_poll_secs must be non-zero".to_string(),
            ));
        }
        if self.server.command_poll_secs > MAX_COMMAND_POLL_SECS {
            return Err(ConfigError::Validation(format!(
                "server.command_poll_secs must be at most {MAX_COMMAND_POLL_SECS}, got {}",
                self.server.command_poll_secs
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.export_timeout_ms, 10_000);
        assert_eq!(config.agent.max_steps, 8);
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 9210);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.engine.export_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [engine]
            export_timeout_ms = 2500

            [agent]
            max_steps = 3
            model = "gpt-4o"
            max_tokens = 8192
            temperature = 0.2

            [server]
            listen_addr = "0.0.0.0"
            listen_port = 8080
            command_poll_secs = 5

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.engine.export_timeout(), Duration::from_millis(2500));
        assert_eq!(config.agent.max_steps, 3);
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.max_tokens, 8192);
        assert_eq!(config.server.listen_addr, "0.0.0.0");
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.server.command_poll_secs, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_export_timeout() {
        let toml = r#"
            [engine]
            export_timeout_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_endless_waits() {
        let err = AppConfig::parse("[server]\ncommand_poll_secs = 9223372036854775807\n")
            .unwrap_err();
        assert!(err.to_string().contains("server.command_poll_secs"), "{err}");

        let err = AppConfig::parse("[engine]\nexport_timeout_ms = 3600001\n").unwrap_err();
        assert!(err.to_string().contains("engine.export_timeout_ms"), "{err}");

        let config = AppConfig::parse("[server]\ncommand_poll_secs = 3600\n").unwrap();
        assert_eq!(config.server.command_poll_secs, MAX_COMMAND_POLL_SECS);
    }

    #[test]
    fn test_validation_rejects_zero_steps() {
        let toml = r#"
            [agent]
            max_steps = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_hot_temperature() {
        let toml = r#"
            [agent]
            temperature = 3.5
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let toml = r#"
            [server]
            listen_port = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_addr() {
        let toml = r#"
            [server]
            listen_addr = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_level() {
        let toml = r#"
            [logging]
            level = "chatty"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = AppConfig::parse("not valid toml [[[");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drawsync.toml");
        tokio::fs::write(&path, b"[engine]\nexport_timeout_ms = 750\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.engine.export_timeout_ms, 750);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/drawsync.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&rendered).unwrap();
        assert_eq!(parsed.server.listen_port, config.server.listen_port);
    }
}
