//! Prometheus metrics and structured logging for cadence.
//!
//! - Structured logging with tracing (JSON in production)
//! - Request engine and scheduler metrics, rendered as Prometheus text

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
