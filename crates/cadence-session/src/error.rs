//! Session error types.

use cadence_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("HTTP {status} - {method} {path}")]
    Http {
        status: u16,
        method: String,
        path: String,
    },

    #[error("Response not in JSON format: {method} {path}")]
    Malformed { method: String, path: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("After {attempts} attempts failed to {method} {path}")]
    ConnectionFailed {
        attempts: u32,
        method: String,
        path: String,
    },

    #[error("Invalid rate limit pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid rate limit for '{0}': max_calls must be at least 1")]
    InvalidLimit(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Bad arguments for endpoint {endpoint}: {reason}")]
    BadArguments { endpoint: String, reason: String },

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl SessionError {
    /// Whether the request engine should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Http { .. } | SessionError::Malformed { .. } | SessionError::Transport(_)
        )
    }
}

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ConnectionFailed {
                attempts,
                method,
                path,
            } => CoreError::ConnectionFailed {
                attempts,
                method,
                path,
            },
            SessionError::UnknownEndpoint(key) => CoreError::UnknownEndpoint(key),
            other => CoreError::Request(other.to_string()),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
