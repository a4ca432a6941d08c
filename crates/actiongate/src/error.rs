//! Access control error types.
//!
//! Decisions themselves never fail: a malformed action or session degrades to
//! a deny. The errors in this module are raised while loading, validating and
//! configuring policies.

/// Errors that can occur while managing access policies.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// The action name cannot be expanded into lookup patterns.
    #[error("Invalid action: {message}")]
    InvalidAction {
        /// Description of why the action is invalid.
        message: String,
    },

    /// A policy document failed validation or conversion.
    #[error("Invalid policy '{key}': {message}")]
    InvalidPolicy {
        /// Key of the offending policy (empty when the key itself is missing).
        key: String,
        /// Description of the problem.
        message: String,
    },

    /// Reading a policy source failed.
    #[error("Policy source error: {message}")]
    Source {
        /// Description of the I/O failure.
        message: String,
    },

    /// A policy source could not be decoded.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the decoding failure.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AclError {
    /// Creates a new `InvalidAction` error.
    #[must_use]
    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::InvalidAction {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPolicy` error.
    #[must_use]
    pub fn invalid_policy(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Source` error.
    #[must_use]
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AclError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<toml::de::Error> for AclError {
    fn from(err: toml::de::Error) -> Self {
        Self::parse(err.to_string())
    }
}
