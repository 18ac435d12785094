//! Core error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("After {attempts} attempts failed to {method} {path}")]
    ConnectionFailed {
        attempts: u32,
        method: String,
        path: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
