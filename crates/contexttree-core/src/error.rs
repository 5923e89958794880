//! Error types for contexttree-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("limiter.max_active_users", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: limiter.max_active_users: must be at least 1"
        );
    }
}
