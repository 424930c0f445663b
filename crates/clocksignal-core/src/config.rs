//! Configuration loading and typed config structures for the Clock Signal
//! service.
//!
//! The service configuration lives in `clocksignal-config.yaml`. Every field
//! has a default, so an empty or missing file yields a working service.
//! Run settings (dates, mode, time factor) are not part of this file; they
//! live in the settings store and can be changed at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`SettingsConfig::path`].
pub const ENV_SETTINGS_PATH: &str = "CLOCKSIGNAL_SETTINGS_PATH";

/// Environment variable overriding [`ServerConfig::port`].
pub const ENV_PORT: &str = "CLOCKSIGNAL_PORT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `clocksignal-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClockSignalConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where run settings are persisted.
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Lifecycle controller settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Paced session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClockSignalConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `CLOCKSIGNAL_SETTINGS_PATH` overrides `settings.path`
    /// - `CLOCKSIGNAL_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as a unit value, not a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override values from `lookup`, keyed by environment variable name.
    ///
    /// A port that does not parse as `u16` is ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_SETTINGS_PATH) {
            self.settings.path = PathBuf::from(path);
        }
        if let Some(port) = lookup(ENV_PORT) {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => {
                    tracing::warn!(value = %port, error = %e, "Ignoring invalid port override");
                }
            }
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Settings store location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SettingsConfig {
    /// Path of the run settings JSON file.
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

/// Lifecycle controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    /// How long `stop` waits for the run task, in milliseconds.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Notifications buffered per subscriber before it starts lagging.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl ServiceConfig {
    /// The stop timeout as a [`Duration`].
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

/// Paced session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Virtual-time step between ticks, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl SessionConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
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

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    5080
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("clocksignal-settings.json")
}

const fn default_stop_timeout_ms() -> u64 {
    3000
}

const fn default_notification_capacity() -> usize {
    1024
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}
