//! HTTP transport capability.
//!
//! The session only needs "send this request, give me status and body".
//! `HttpTransport` is the reqwest-backed production implementation and
//! `MockTransport` scripts responses for tests.

use crate::error::{SessionError, SessionResult};
use cadence_core::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for transport requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A request relative to the session's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the base URL; also what rate-limit patterns match.
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params.extend(params);
        self
    }
}

/// Raw response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for sending raw HTTP requests.
pub trait Transport: Send + Sync {
    /// Send `request` to the absolute `url`.
    fn send<'a>(
        &'a self,
        url: String,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, SessionResult<HttpResponse>>;
}

/// Arc wrapper for Transport trait objects.
pub type DynTransport = Arc<dyn Transport>;

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> SessionResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> SessionResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        url: String,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, SessionResult<HttpResponse>> {
        Box::pin(async move {
            let mut builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
            };
            if !request.params.is_empty() {
                builder = builder.query(&request.params);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| SessionError::Transport(format!("HTTP request failed: {e}")))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| SessionError::Transport(format!("Failed to read body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// A request seen by `MockTransport`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub url: String,
    pub request: HttpRequest,
}

/// Scripted transport for tests.
///
/// Scripted results are consumed in order; once the script is empty every
/// request answers `200 {"status": "ok"}`.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentRequest>>,
    script: Mutex<VecDeque<SessionResult<HttpResponse>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result.
    pub fn push(&self, result: SessionResult<HttpResponse>) {
        self.script.lock().push_back(result);
    }

    /// Queue a successful JSON response.
    pub fn push_json(&self, body: Value) {
        self.push(Ok(HttpResponse::ok_json(&body)));
    }

    /// Queue `n` failing responses with the given status.
    pub fn push_failures(&self, n: usize, status: u16) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(Ok(HttpResponse::new(status, "")));
        }
    }

    /// Get recorded requests.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    /// Paths of recorded requests, in order.
    pub fn sent_paths(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|s| s.request.path.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for MockTransport {
    fn send<'a>(
        &'a self,
        url: String,
        request: &'a HttpRequest,
    ) -> BoxFuture<'a, SessionResult<HttpResponse>> {
        Box::pin(async move {
            self.sent.lock().push(SentRequest {
                url,
                request: request.clone(),
            });
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| Ok(HttpResponse::new(200, r#"{"status":"ok"}"#)))
        })
    }
}
