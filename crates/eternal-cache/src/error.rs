//! Error types for cache and query operations

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// Value could not be turned into its stored representation
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored representation could not be read back
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// IO error during cache operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value store specific error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Key cannot be represented by the backing store
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Payload failed shape validation at the cache boundary
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Storage quota exceeded
    #[error("Storage quota exceeded")]
    StorageQuotaExceeded,
}

impl From<hex::FromHexError> for CacheError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Deserialization(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure surfaced by a fetch through the query layer.
///
/// Cloneable because a single coalesced fetch hands its outcome to every
/// concurrent caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Input rejected before any cache or network I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport level failure
    #[error("Network error: {0}")]
    Network(String),

    /// A single attempt exceeded its deadline
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Backend answered with a server side failure
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Backend supplied detail
        message: String,
    },

    /// Authentication or authorization failure
    #[error("Unauthorized ({status})")]
    Unauthorized {
        /// HTTP status code (401 or 403)
        status: u16,
    },

    /// Backend answered with a body that does not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Offline with nothing cached for the request
    #[error("Offline: {0}")]
    Offline(String),
}

impl FetchError {
    /// Map an HTTP status and message to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            408 => Self::Network(message.into()),
            400..=499 if status != 429 => Self::Validation(message.into()),
            _ => Self::Server {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether another attempt may succeed
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }

    /// Whether this is an authentication failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<CacheError> for FetchError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidPayload(msg) | CacheError::InvalidKey(msg) => Self::Validation(msg),
            other => Self::Decode(other.to_string()),
        }
    }
}
