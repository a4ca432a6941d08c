//! Engine configuration.
//!
//! Configuration is loaded from TOML. Every section has defaults, so an empty
//! file is a valid configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [policy]
//! source = "policies.json"
//! max_action_segments = 16
//!
//! [reload]
//! debounce = "100ms"
//! periodic_refresh = "5m"
//! max_retry_attempts = 3
//! retry_backoff = "1s"
//!
//! [filter.fields]
//! "author.id" = "identifier"
//! created = "date"
//!
//! [logging]
//! level = "info"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::engine::EvaluatorConfig;
use crate::policy::filter::{FieldKind, SchemaCoercion};
use crate::policy::pattern::{DEFAULT_MAX_SEGMENTS, HARD_MAX_SEGMENTS};
use crate::policy::reload::ReloadConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AclConfig {
    /// Policy source and evaluation limits.
    pub policy: PolicyConfig,

    /// Hot-reload behaviour.
    pub reload: ReloadSettings,

    /// Filter derivation.
    pub filter: FilterConfig,

    /// Logging.
    pub logging: LoggingConfig,
}

/// Policy source and evaluation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path to the declarative policy document (JSON or TOML).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Upper bound on the number of segments in an action name.
    pub max_action_segments: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            source: None,
            max_action_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

/// Hot-reload settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Quiet period after the last reload request.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,

    /// Periodic refresh interval. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub periodic_refresh: Duration,

    /// Attempts per reload before giving up.
    pub max_retry_attempts: usize,

    /// Initial retry backoff, doubled on every retry.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            periodic_refresh: Duration::ZERO,
            max_retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Filter derivation settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Per-field coercion hints keyed by dotted object path.
    pub fields: HashMap<String, FieldKind>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration '{path}': {message}")]
    Read {
        /// The file path.
        path: String,
        /// The I/O error.
        message: String,
    },

    /// The configuration file is not valid TOML.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl From<ConfigError> for crate::AclError {
    fn from(err: ConfigError) -> Self {
        crate::AclError::configuration(err.to_string())
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl AclConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise the
    /// parse or validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `max_action_segments` is zero or above the hard limit
    /// - `max_retry_attempts` is zero
    /// - the log level is unknown
    pub fn validate(&self) -> Result<(), ConfigError> {
        let segments = self.policy.max_action_segments;
        if segments == 0 {
            return Err(ConfigError::InvalidValue(
                "policy.max_action_segments must be > 0".to_string(),
            ));
        }
        if segments > HARD_MAX_SEGMENTS {
            return Err(ConfigError::InvalidValue(format!(
                "policy.max_action_segments must be <= {HARD_MAX_SEGMENTS}, got {segments}"
            )));
        }

        if self.reload.max_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reload.max_retry_attempts must be > 0".to_string(),
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid log level: '{}'. Must be one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Evaluator settings derived from this configuration.
    #[must_use]
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            max_action_segments: self.policy.max_action_segments,
        }
    }

    /// Reload service settings derived from this configuration.
    #[must_use]
    pub fn reload_config(&self) -> ReloadConfig {
        ReloadConfig {
            debounce: self.reload.debounce,
            periodic_refresh: (!self.reload.periodic_refresh.is_zero())
                .then_some(self.reload.periodic_refresh),
            max_retry_attempts: self.reload.max_retry_attempts,
            retry_backoff: self.reload.retry_backoff,
        }
    }

    /// Filter coercion built from the configured field hints.
    #[must_use]
    pub fn coercion(&self) -> SchemaCoercion {
        SchemaCoercion::new(self.filter.fields.clone())
    }
}
