//! Error types for backend calls

use eternal_cache::FetchError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error category reported by the backend in its `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    ValidationError,
    ValueError,
    ServerError,
    NetworkError,
}

impl ApiErrorKind {
    /// Parse the backend `type` string; unknown kinds are server errors
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "validation_error" => Self::ValidationError,
            "value_error" => Self::ValueError,
            "network_error" => Self::NetworkError,
            _ => Self::ServerError,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ValueError => "value_error",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body the backend sends with non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Framework validation failures arrive here instead
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{kind} ({status}): {message}")]
    Status {
        status: StatusCode,
        kind: ApiErrorKind,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiError {
    /// Build an error from a failed response's status and raw body
    pub(crate) fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) else {
            return Self::Status {
                status,
                kind: ApiErrorKind::NetworkError,
                message: "Unable to connect to the server".to_string(),
            };
        };

        let message = parsed
            .message
            .clone()
            .or_else(|| parsed.error.clone())
            .or_else(|| parsed.detail_text())
            .unwrap_or_else(|| "Unknown error".to_string());
        let kind = match parsed.kind.as_deref() {
            Some(kind) => ApiErrorKind::from_type(kind),
            None if status == StatusCode::UNPROCESSABLE_ENTITY => ApiErrorKind::ValidationError,
            None => ApiErrorKind::ServerError,
        };

        Self::Status {
            status,
            kind,
            message,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Http(_) => ApiErrorKind::NetworkError,
            Self::Status { kind, .. } => *kind,
            Self::Parse(_) => ApiErrorKind::ValueError,
            Self::InvalidConfiguration(_) => ApiErrorKind::ValidationError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        let message = self.message();
        match self.kind() {
            ApiErrorKind::ValidationError => {
                if message.contains("date") {
                    "Please check your birth date format (YYYY-MM-DD)".to_string()
                } else if message.contains("timezone") {
                    "Please check your timezone format (+HH:MM or -HH:MM)".to_string()
                } else if message.contains("time") {
                    "Please check your birth time format (HH:MM)".to_string()
                } else if message.contains("latitude") || message.contains("longitude") {
                    "Unable to find your birth location. Please try a more specific place name."
                        .to_string()
                } else {
                    message
                }
            }
            ApiErrorKind::ValueError => format!("Data format issue: {message}"),
            ApiErrorKind::NetworkError => {
                "Connection problem. Please check your internet and try again.".to_string()
            }
            ApiErrorKind::ServerError => {
                if message.contains("ephemeris") || message.contains("chart") {
                    "Astrological calculation error. Please verify your birth details and try again."
                        .to_string()
                } else if message.contains("OpenAI") || message.contains("reflection") {
                    "Unable to generate insights right now. Please try again in a moment."
                        .to_string()
                } else {
                    "Something went wrong on our end. Please try again.".to_string()
                }
            }
        }
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) if e.is_decode() => Self::Decode(e.to_string()),
            ApiError::Http(e) => Self::Network(e.to_string()),
            ApiError::Status {
                status,
                kind: ApiErrorKind::ValidationError | ApiErrorKind::ValueError,
                message,
            } if !matches!(status.as_u16(), 401 | 403) => Self::Validation(message),
            ApiError::Status {
                status,
                kind: ApiErrorKind::NetworkError,
                message,
            } if status.is_server_error() => Self::Network(message),
            ApiError::Status {
                status, message, ..
            } => Self::from_status(status.as_u16(), message),
            ApiError::Parse(msg) => Self::Decode(msg),
            ApiError::InvalidConfiguration(msg) => Self::Validation(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
