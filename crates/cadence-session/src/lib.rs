//! Request session for cadence.
//!
//! Wraps an opaque HTTP transport with:
//! - Per-endpoint-class sliding-window rate limiting
//! - Retry with exponential backoff
//! - Circuit breaks after sustained failure
//! - Forced re-authentication after repeated circuit breaks
//! - A credential-switch hold that no request may interleave with

pub mod circuit;
pub mod client;
pub mod credentials;
pub mod error;
pub mod rate_limiter;
pub mod session;
pub mod transport;

pub use circuit::{CircuitState, Escalation, RetryPolicy};
pub use client::{EndpointSpec, SessionApiClient};
pub use credentials::Credentials;
pub use error::{SessionError, SessionResult};
pub use rate_limiter::{RateLimitRule, RateLimiter, RateLimits};
pub use session::{Session, SessionConfig};
pub use transport::{
    DynTransport, HttpRequest, HttpResponse, HttpTransport, Method, MockTransport, Transport,
};
