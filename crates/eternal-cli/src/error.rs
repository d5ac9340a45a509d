//! Error types for the command-line front end.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A flag value is out of range or malformed
    #[error("Invalid value for --{flag}: {reason}")]
    InvalidArgument {
        /// Flag name without dashes
        flag: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Backend client settings rejected
    #[error("API configuration error: {0}")]
    Api(String),

    /// Cache settings rejected
    #[error("Cache configuration error: {0}")]
    Cache(String),
}
