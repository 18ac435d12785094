//! Action error types.

use cadence_core::CoreError;
use cadence_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("API error: {0}")]
    Core(#[from] CoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Action failed: {0}")]
    Failed(String),
}

pub type ActionResult<T> = Result<T, ActionError>;
