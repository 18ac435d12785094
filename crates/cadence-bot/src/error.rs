//! Bot error types.

use crate::bot::ActionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Unknown action: {0}")]
    UnknownAction(ActionId),

    #[error("Action {0} is running")]
    ActionRunning(ActionId),

    #[error("Action {0} was lost by a panicked worker")]
    ActionLost(ActionId),

    #[error("Login rejected for {0}")]
    LoginRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(#[from] cadence_session::SessionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] cadence_telemetry::TelemetryError),

    #[error("Bot task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BotResult<T> = Result<T, BotError>;
