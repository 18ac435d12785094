//! cadence bot.
//!
//! Supervises a set of paced actions against one account session:
//! - `Bot`: registry of actions with start/stop/wait and a supervising loop
//! - `AppConfig`: TOML configuration for session, endpoints and actions
//! - `Application`: wires config into a session, client and bot

pub mod app;
pub mod bot;
pub mod config;
pub mod error;

pub use app::Application;
pub use bot::{ActionId, ActionStatus, Bot};
pub use config::{ActionConfig, AppConfig};
pub use error::{BotError, BotResult};
