//! Resilient request session.
//!
//! Every logical request goes through `request_safely`, which retries with
//! exponential backoff, circuit-breaks after sustained failure and forces a
//! re-authentication after repeated breaks. Each attempt first takes the
//! credential-switch hold, then its rate-limit bucket, then the session-wide
//! request mutex, so at most one network call is in flight per session.

use crate::circuit::{CircuitState, Escalation, RetryPolicy};
use crate::credentials::Credentials;
use crate::error::{SessionError, SessionResult};
use crate::rate_limiter::{RateLimitRule, RateLimits};
use crate::transport::{DynTransport, HttpRequest};
use cadence_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL every request path is joined onto.
    pub base_url: String,
    /// Retry/backoff/break tunables.
    pub retry: RetryPolicy,
    /// Ordered rate-limit buckets.
    pub rate_limits: Vec<RateLimitRule>,
    /// Attempts before a request fails for callers that don't specify (0 = never).
    pub default_max_attempts: u32,
    pub login_path: String,
    pub logout_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            retry: RetryPolicy::default(),
            rate_limits: RateLimitRule::defaults(),
            default_max_attempts: 10,
            login_path: "accounts/login/".to_string(),
            logout_path: "accounts/logout/".to_string(),
        }
    }
}

/// Request session for a single account.
pub struct Session {
    config: SessionConfig,
    transport: DynTransport,
    limits: RateLimits,
    credentials: RwLock<Credentials>,
    logged_in: AtomicBool,
    /// Held for a whole credential switch; every attempt passes through it.
    hold: TokioMutex<()>,
    /// Serializes network calls.
    request_mutex: TokioMutex<()>,
    circuit: Mutex<CircuitState>,
}

impl Session {
    /// Create a new session. Does not log in.
    pub fn new(
        config: SessionConfig,
        transport: DynTransport,
        credentials: Credentials,
    ) -> SessionResult<Self> {
        let limits = RateLimits::new(&config.rate_limits)?;
        Ok(Self {
            config,
            transport,
            limits,
            logged_in: AtomicBool::new(credentials.token().is_some()),
            credentials: RwLock::new(credentials),
            hold: TokioMutex::new(()),
            request_mutex: TokioMutex::new(()),
            circuit: Mutex::new(CircuitState::new()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn username(&self) -> String {
        self.credentials.read().username().to_string()
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.read().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Snapshot of the failure counters.
    pub fn circuit_state(&self) -> CircuitState {
        *self.circuit.lock()
    }

    pub fn rate_limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Absolute URL for a request path.
    pub fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if base.is_empty() {
            path.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    /// Single attempt: rate limit, then the transport under the request mutex.
    ///
    /// Does not take the credential-switch hold.
    pub async fn request(&self, request: &HttpRequest) -> SessionResult<Value> {
        self.limits.wait(&request.path).await;

        let request = self.authorize(request);
        let response = {
            let _guard = self.request_mutex.lock().await;
            self.transport.send(self.url(&request.path), &request).await?
        };

        if !response.is_success() {
            return Err(SessionError::Http {
                status: response.status,
                method: request.method.to_string(),
                path: request.path.clone(),
            });
        }

        serde_json::from_str(&response.body).map_err(|_| SessionError::Malformed {
            method: request.method.to_string(),
            path: request.path.clone(),
        })
    }

    /// Request that retries until it succeeds.
    ///
    /// Fails with `ConnectionFailed` once more than `max_attempts` attempts
    /// of this call have failed; `max_attempts == 0` retries forever.
    pub async fn request_safely(
        &self,
        request: &HttpRequest,
        max_attempts: u32,
    ) -> SessionResult<Value> {
        let span = info_span!("session", username = %self.username());
        self.request_safely_inner(request, max_attempts)
            .instrument(span)
            .await
    }

    async fn request_safely_inner(
        &self,
        request: &HttpRequest,
        max_attempts: u32,
    ) -> SessionResult<Value> {
        let mut failures = 0u32;

        loop {
            let result = {
                let _hold = self.hold.lock().await;
                self.request(request).await
            };

            let err = match result {
                Ok(value) => {
                    self.circuit.lock().record_success();
                    Metrics::request_outcome("ok");
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            error!(error = %err, method = %request.method, path = %request.path, "Request failed");
            Metrics::request_outcome("failed");
            failures += 1;

            let escalation = self.circuit.lock().record_failure(&self.config.retry);
            match escalation {
                Escalation::Backoff(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, failures, "Backing off");
                    tokio::time::sleep(delay).await;
                }
                Escalation::Break { pause, relogin } => {
                    warn!(
                        pause_secs = pause.as_secs(),
                        breaks = self.circuit_state().consecutive_breaks,
                        "Circuit break"
                    );
                    Metrics::circuit_break();
                    tokio::time::sleep(pause).await;

                    if relogin {
                        self.relogin().await;
                    }
                }
            }

            if max_attempts > 0 && failures > max_attempts {
                return Err(SessionError::ConnectionFailed {
                    attempts: max_attempts,
                    method: request.method.to_string(),
                    path: request.path.clone(),
                });
            }
        }
    }

    /// Log in with the current credentials.
    ///
    /// Returns `Ok(false)` if the service rejected the login.
    pub async fn login(&self) -> SessionResult<bool> {
        let body = self.credentials.read().login_body();
        let request = HttpRequest::post(self.config.login_path.clone(), body);
        let payload = self.request(&request).await?;

        if !status_ok(&payload) {
            info!(username = %self.username(), "Login failed");
            return Ok(false);
        }

        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.credentials.write().set_token(token);
        self.logged_in.store(true, Ordering::SeqCst);
        info!(username = %self.username(), "Login success");
        Ok(true)
    }

    /// Log out of the current account.
    pub async fn logout(&self) -> SessionResult<bool> {
        let request = HttpRequest::get(self.config.logout_path.clone());
        let payload = self.request(&request).await?;

        if !status_ok(&payload) {
            error!(username = %self.username(), "Logout failed");
            return Ok(false);
        }

        self.credentials.write().set_token(None);
        self.logged_in.store(false, Ordering::SeqCst);
        info!(username = %self.username(), "Logged out");
        Ok(true)
    }

    /// Switch the active account.
    ///
    /// Holds the credential-switch lock for the whole sequence so no request
    /// is attempted between logout and login.
    /// The incoming credentials' token is discarded, so a rejected login
    /// leaves the session without one.
    pub async fn switch_credentials(&self, mut credentials: Credentials) -> SessionResult<bool> {
        let _hold = self.hold.lock().await;

        if self.is_logged_in() {
            if let Err(e) = self.logout().await {
                warn!(error = %e, "Logout before switch failed");
            }
        }

        let same_account = self.credentials.read().same_account(&credentials);
        info!(username = %credentials.username(), same_account, "Switching to user");
        credentials.set_token(None);
        *self.credentials.write() = credentials;
        self.logged_in.store(false, Ordering::SeqCst);
        self.login().await
    }

    /// Forced re-authentication after repeated circuit breaks.
    async fn relogin(&self) {
        let _hold = self.hold.lock().await;
        warn!("Too many circuit breaks, re-authenticating");
        Metrics::relogin();

        if let Err(e) = self.logout().await {
            warn!(error = %e, "Logout during re-authentication failed");
        }
        self.credentials.write().set_token(None);
        self.logged_in.store(false, Ordering::SeqCst);
        tokio::time::sleep(self.config.retry.relog_wait).await;
        match self.login().await {
            Ok(true) => {}
            Ok(false) => warn!("Re-authentication rejected"),
            Err(e) => warn!(error = %e, "Login during re-authentication failed"),
        }
    }

    fn authorize(&self, request: &HttpRequest) -> HttpRequest {
        let mut request = request.clone();
        let credentials = self.credentials.read();
        if let Some(token) = credentials.token() {
            request
                .params
                .push(("token".to_string(), token.to_string()));
        }
        request
    }
}

/// A payload without a `status` field, or with `"ok"`, counts as success.
pub(crate) fn status_ok(payload: &Value) -> bool {
    payload
        .get("status")
        .and_then(Value::as_str)
        .map_or(true, |s| s == "ok")
}
