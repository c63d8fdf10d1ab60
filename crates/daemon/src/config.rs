//! Configuration management for the WebShell daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/webshell/config.toml`.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_sessions must be between 1 and 10000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("history_limit must be at most 100000, got {0}")]
    InvalidHistoryLimit(usize),

    #[error("idle_timeout_secs must be greater than 0, got {0}")]
    InvalidIdleTimeout(u64),

    #[error("reap_interval_secs must be between 1 and idle_timeout_secs, got {0}")]
    InvalidReapInterval(u64),

    #[error("default terminal size must be non-zero, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("executor timeout_secs must be between 1 and 3600, got {0}")]
    InvalidExecutorTimeout(u64),

    #[error("shell must not be empty")]
    EmptyShell,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("on_disconnect must be one of: destroy, detach; got {0}")]
    InvalidDisconnectPolicy(String),

    #[error("executor kind must be one of: canned, shell; got {0}")]
    InvalidExecutorKind(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// What happens to a session when its connection goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Remove the session from the registry.
    #[default]
    Destroy,
    /// Keep the session so a later connection may reattach.
    Detach,
}

impl FromStr for DisconnectPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "destroy" => Ok(Self::Destroy),
            "detach" => Ok(Self::Detach),
            _ => Err(ConfigError::InvalidDisconnectPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => write!(f, "destroy"),
            Self::Detach => write!(f, "detach"),
        }
    }
}

/// Which command executor backs the terminal sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Fixed table of demo responses.
    #[default]
    Canned,
    /// Real commands through `<shell> -c`.
    Shell,
}

impl FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "canned" => Ok(Self::Canned),
            "shell" => Ok(Self::Shell),
            _ => Err(ConfigError::InvalidExecutorKind(s.to_string())),
        }
    }
}

/// Main configuration structure for the WebShell daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Session lifecycle configuration.
    pub session: SessionConfig,

    /// Command executor configuration.
    pub executor: ExecutorConfig,

    /// Static listings served by the metadata endpoints.
    pub metadata: MetadataConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: SocketAddr,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional log file; logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are reaped.
    pub idle_timeout_secs: u64,

    /// How often the reaper sweeps the registry.
    pub reap_interval_secs: u64,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// What to do with a session when its connection closes.
    pub on_disconnect: DisconnectPolicy,

    /// Prompt printed after every submitted line.
    pub prompt: String,

    /// Columns used when the handshake omits them.
    pub default_cols: u16,

    /// Rows used when the handshake omits them.
    pub default_rows: u16,

    /// Destroyed sessions kept for the history endpoint. Zero disables it.
    pub history_limit: usize,
}

/// Command executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Executor implementation.
    pub kind: ExecutorKind,

    /// Shell binary used by the shell executor.
    pub shell: String,

    /// Per-command timeout for the shell executor.
    pub timeout_secs: u64,
}

/// Static listings served by the metadata endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataConfig {
    pub environments: Vec<String>,
    pub products: Vec<String>,
    pub tags: Vec<String>,
    pub usernames: Vec<String>,
    pub nodes: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8025)),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300, // 5 minutes
            reap_interval_secs: 60,
            max_sessions: 100,
            on_disconnect: DisconnectPolicy::Destroy,
            prompt: "$ ".to_string(),
            default_cols: 80,
            default_rows: 24,
            history_limit: 1000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::Canned,
            shell: "/bin/sh".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            environments: list(&["dev", "test", "prod"]),
            products: list(&["product-a", "product-b", "product-c"]),
            tags: list(&["tag1", "tag2", "tag3"]),
            usernames: list(&["admin", "user1", "user2"]),
            nodes: list(&["node1", "node2", "node3"]),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("webshell")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - WEBSHELL_LISTEN_ADDR: Override the listen address
    /// - WEBSHELL_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - WEBSHELL_ON_DISCONNECT: Override the disconnect policy (destroy, detach)
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("WEBSHELL_LISTEN_ADDR") {
            if !addr.is_empty() {
                match addr.parse() {
                    Ok(parsed) => {
                        tracing::info!("Overriding listen_addr from environment: {}", addr);
                        self.daemon.listen_addr = parsed;
                    }
                    Err(e) => tracing::warn!("Ignoring WEBSHELL_LISTEN_ADDR={}: {}", addr, e),
                }
            }
        }

        if let Ok(level) = std::env::var("WEBSHELL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(policy) = std::env::var("WEBSHELL_ON_DISCONNECT") {
            if !policy.is_empty() {
                match policy.parse() {
                    Ok(parsed) => {
                        tracing::info!("Overriding on_disconnect from environment: {}", policy);
                        self.session.on_disconnect = parsed;
                    }
                    Err(e) => tracing::warn!("Ignoring WEBSHELL_ON_DISCONNECT: {}", e),
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.max_sessions < 1 || session.max_sessions > 10_000 {
            return Err(ConfigError::InvalidMaxSessions(session.max_sessions));
        }

        if session.history_limit > 100_000 {
            return Err(ConfigError::InvalidHistoryLimit(session.history_limit));
        }

        if session.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidIdleTimeout(session.idle_timeout_secs));
        }

        if session.reap_interval_secs == 0 || session.reap_interval_secs > session.idle_timeout_secs
        {
            return Err(ConfigError::InvalidReapInterval(session.reap_interval_secs));
        }

        if session.default_cols == 0 || session.default_rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                cols: session.default_cols,
                rows: session.default_rows,
            });
        }

        if self.executor.timeout_secs == 0 || self.executor.timeout_secs > 3600 {
            return Err(ConfigError::InvalidExecutorTimeout(self.executor.timeout_secs));
        }

        if self.executor.shell.trim().is_empty() {
            return Err(ConfigError::EmptyShell);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("WEBSHELL_LISTEN_ADDR");
        std::env::remove_var("WEBSHELL_LOG_LEVEL");
        std::env::remove_var("WEBSHELL_ON_DISCONNECT");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.listen_addr.port(), 8025);
        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
        assert_eq!(config.session.idle_timeout_secs, 300);
        assert_eq!(config.session.reap_interval_secs, 60);
        assert_eq!(config.session.max_sessions, 100);
        assert_eq!(config.session.on_disconnect, DisconnectPolicy::Destroy);
        assert_eq!(config.session.prompt, "$ ");
        assert_eq!(config.executor.kind, ExecutorKind::Canned);
        assert_eq!(config.metadata.environments, vec!["dev", "test", "prod"]);
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[session]
max_sessions = 5
on_disconnect = "detach"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.session.max_sessions, 5);
        assert_eq!(config.session.on_disconnect, DisconnectPolicy::Detach);
        assert_eq!(config.session.idle_timeout_secs, 300);
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
listen_addr = "127.0.0.1:9000"
log_level = "trace"
log_file = "/var/log/webshell.log"

[session]
idle_timeout_secs = 120
reap_interval_secs = 10
max_sessions = 20
on_disconnect = "detach"
prompt = "> "
default_cols = 132
default_rows = 50

[executor]
kind = "shell"
shell = "/bin/bash"
timeout_secs = 30

[metadata]
environments = ["staging"]
products = []
tags = ["a"]
usernames = ["root"]
nodes = ["n1", "n2"]
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.daemon.log_file,
            Some(PathBuf::from("/var/log/webshell.log"))
        );
        assert_eq!(config.session.idle_timeout_secs, 120);
        assert_eq!(config.session.reap_interval_secs, 10);
        assert_eq!(config.session.prompt, "> ");
        assert_eq!(config.session.default_cols, 132);
        assert_eq!(config.executor.kind, ExecutorKind::Shell);
        assert_eq!(config.executor.shell, "/bin/bash");
        assert_eq!(config.executor.timeout_secs, 30);
        assert_eq!(config.metadata.environments, vec!["staging"]);
        assert!(config.metadata.products.is_empty());
        assert_eq!(config.metadata.nodes.len(), 2);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_unknown_policy() {
        let toml = r#"
[session]
on_disconnect = "linger"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_from_toml_bad_listen_addr() {
        let toml = r#"
[daemon]
listen_addr = "not an address"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_to_toml_sections() {
        let toml = Config::default().to_toml().unwrap();

        assert!(toml.contains("[daemon]"));
        assert!(toml.contains("[session]"));
        assert!(toml.contains("[executor]"));
        assert!(toml.contains("[metadata]"));
        assert!(toml.contains("on_disconnect = \"destroy\""));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.daemon.log_file = Some(PathBuf::from("/tmp/webshell.log"));
        original.session.on_disconnect = DisconnectPolicy::Detach;
        original.executor.kind = ExecutorKind::Shell;
        original.metadata.tags = vec!["x".to_string()];

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.daemon.log_level = "debug".to_string();
        original.session.max_sessions = 15;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("webshell"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_disconnect_policy_from_str() {
        assert_eq!("destroy".parse(), Ok(DisconnectPolicy::Destroy));
        assert_eq!("DETACH".parse(), Ok(DisconnectPolicy::Detach));
        assert_eq!(
            "keep".parse::<DisconnectPolicy>(),
            Err(ConfigError::InvalidDisconnectPolicy("keep".to_string()))
        );
        assert_eq!(DisconnectPolicy::Detach.to_string(), "detach");
    }

    #[test]
    fn test_executor_kind_from_str() {
        assert_eq!("shell".parse(), Ok(ExecutorKind::Shell));
        assert_eq!("Canned".parse(), Ok(ExecutorKind::Canned));
        assert!("python".parse::<ExecutorKind>().is_err());
    }

    #[test]
    #[serial]
    fn test_env_override_listen_addr() {
        clear_env();
        std::env::set_var("WEBSHELL_LISTEN_ADDR", "127.0.0.1:9999");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.listen_addr, "127.0.0.1:9999".parse().unwrap());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_listen_addr_ignored() {
        clear_env();
        std::env::set_var("WEBSHELL_LISTEN_ADDR", "nowhere");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.listen_addr, DaemonConfig::default().listen_addr);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        clear_env();
        std::env::set_var("WEBSHELL_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("WEBSHELL_LOG_LEVEL", "");
        std::env::set_var("WEBSHELL_ON_DISCONNECT", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_on_disconnect() {
        clear_env();
        std::env::set_var("WEBSHELL_ON_DISCONNECT", "detach");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.session.on_disconnect, DisconnectPolicy::Detach);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_history_limit() {
        let mut config = Config::default();
        config.session.history_limit = 0;
        assert!(config.validate().is_ok());

        config.session.history_limit = 100_001;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidHistoryLimit(100_001))
        );
    }

    #[test]
    fn test_validate_max_sessions() {
        let mut config = Config::default();
        config.session.max_sessions = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSessions(0)));

        config.session.max_sessions = 1;
        assert!(config.validate().is_ok());

        config.session.max_sessions = 10_001;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxSessions(10_001))
        );
    }

    #[test]
    fn test_validate_idle_timeout_zero() {
        let mut config = Config::default();
        config.session.idle_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdleTimeout(0)));
    }

    #[test]
    fn test_validate_reap_interval() {
        let mut config = Config::default();
        config.session.reap_interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidReapInterval(0)));

        config.session.reap_interval_secs = 301;
        assert_eq!(config.validate(), Err(ConfigError::InvalidReapInterval(301)));

        config.session.reap_interval_secs = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_terminal_size() {
        let mut config = Config::default();
        config.session.default_rows = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTerminalSize { cols: 80, rows: 0 })
        );
    }

    #[test]
    fn test_validate_executor() {
        let mut config = Config::default();
        config.executor.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidExecutorTimeout(0)));

        config.executor.timeout_secs = 10;
        config.executor.shell = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyShell));
    }

    #[test]
    fn test_validate_log_level_case_insensitive() {
        let mut config = Config::default();

        config.daemon.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "Warn".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level_invalid() {
        let mut config = Config::default();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }
}
