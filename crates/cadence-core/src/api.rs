//! Remote-service capability consumed by actions.
//!
//! The core never sees endpoint URLs or response shapes; it only needs
//! `send(endpoint_key, positional_args, options) -> (success, payload)`.

use crate::command::Command;
use crate::error::CoreResult;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    /// Give up after this many failed attempts (None = client default, Some(0) = never).
    pub max_attempts: Option<u32>,
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// JSON body sent to POST endpoints (an empty object when unset). GET endpoints ignore it.
    pub data: Option<Value>,
}

impl SendOptions {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Result of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    pub payload: Value,
}

impl ApiResponse {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
        }
    }

    pub fn failed(payload: Value) -> Self {
        Self {
            success: false,
            payload,
        }
    }
}

/// Opaque remote-service capability.
pub trait ApiClient: Send + Sync {
    /// Send a call to `endpoint` with positional `args`.
    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        args: &'a [Value],
        options: SendOptions,
    ) -> BoxFuture<'a, CoreResult<ApiResponse>>;

    /// Execute a queued command with default options.
    fn execute<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, CoreResult<ApiResponse>> {
        self.send(&command.endpoint, &command.args, SendOptions::default())
    }
}

/// Arc wrapper for ApiClient trait objects.
pub type DynApiClient = Arc<dyn ApiClient>;

/// A call recorded by `MockApiClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: String,
    pub args: Vec<Value>,
    pub options: SendOptions,
}

/// Scripted ApiClient for tests.
///
/// Responses are queued per endpoint; an endpoint with nothing queued
/// answers `{"status": "ok"}`.
#[derive(Debug, Default)]
pub struct MockApiClient {
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<String, VecDeque<CoreResult<ApiResponse>>>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response for `endpoint`.
    pub fn push_response(&self, endpoint: &str, response: CoreResult<ApiResponse>) {
        self.scripted
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a successful payload for `endpoint`.
    pub fn push_payload(&self, endpoint: &str, payload: Value) {
        self.push_response(endpoint, Ok(ApiResponse::ok(payload)));
    }

    /// Get recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls to a single endpoint.
    pub fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl ApiClient for MockApiClient {
    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        args: &'a [Value],
        options: SendOptions,
    ) -> BoxFuture<'a, CoreResult<ApiResponse>> {
        Box::pin(async move {
            self.calls.lock().push(RecordedCall {
                endpoint: endpoint.to_string(),
                args: args.to_vec(),
                options,
            });
            let next = self
                .scripted
                .lock()
                .get_mut(endpoint)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| Ok(ApiResponse::ok(serde_json::json!({"status": "ok"}))))
        })
    }
}
