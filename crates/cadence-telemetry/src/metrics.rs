//! Prometheus metrics for cadence.
//!
//! Covers the request engine (outcomes, circuit breaks, forced re-logins,
//! rate-limit waits) and the scheduler (commands executed, running actions).
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure there means a duplicate
//! metric name, which is a startup bug; it only happens during static
//! initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, register_int_gauge, Counter,
    CounterVec, Encoder, HistogramVec, IntGauge, TextEncoder,
};

/// Request attempts by outcome (ok/failed).
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_requests_total",
        "Total request attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Circuit breaks taken.
pub static CIRCUIT_BREAKS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_circuit_breaks_total",
        "Total circuit breaks after sustained request failure"
    )
    .unwrap()
});

/// Forced re-authentications.
pub static RELOGINS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_relogins_total",
        "Total forced re-authentications after repeated circuit breaks"
    )
    .unwrap()
});

/// Time spent blocked on a rate-limit bucket.
pub static RATE_LIMIT_WAIT_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cadence_rate_limit_wait_ms",
        "Time a request waited for its rate-limit bucket in milliseconds",
        &["bucket"],
        vec![10.0, 100.0, 1000.0, 10_000.0, 60_000.0, 600_000.0, 3_600_000.0]
    )
    .unwrap()
});

/// Commands executed by queued actions.
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_commands_total",
        "Total commands executed by queued actions",
        &["action"]
    )
    .unwrap()
});

/// Actions with a live worker.
pub static ACTIONS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("cadence_actions_running", "Number of actions currently running")
        .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a request attempt outcome.
    pub fn request_outcome(outcome: &str) {
        REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn circuit_break() {
        CIRCUIT_BREAKS_TOTAL.inc();
    }

    pub fn relogin() {
        RELOGINS_TOTAL.inc();
    }

    /// Record time spent waiting on the bucket matched by `bucket`.
    pub fn rate_limit_wait(bucket: &str, wait_ms: f64) {
        RATE_LIMIT_WAIT_MS
            .with_label_values(&[bucket])
            .observe(wait_ms);
    }

    /// Record a command drained from a queue.
    pub fn command_executed(action: &str) {
        COMMANDS_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn action_started() {
        ACTIONS_RUNNING.inc();
    }

    pub fn action_stopped() {
        ACTIONS_RUNNING.dec();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
