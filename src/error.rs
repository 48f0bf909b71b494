//! Crate-level error types.
//!
//! Lifecycle failures live in [`crate::tester::error`] and runtime failures
//! in [`crate::runtime::error`]; this module holds what is left.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}
