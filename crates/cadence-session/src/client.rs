//! `ApiClient` backed by a `Session` and an endpoint table.
//!
//! Endpoint keys resolve to a method and a path template; `{}` placeholders
//! in the template are filled from the positional arguments in order.

use crate::error::{SessionError, SessionResult};
use crate::session::{status_ok, Session};
use crate::transport::{HttpRequest, Method};
use cadence_core::{ApiClient, ApiResponse, BoxFuture, CoreResult, SendOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Placeholder for one positional argument in a path template.
const PLACEHOLDER: &str = "{}";

/// Method and path template for one endpoint key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default)]
    pub method: Method,
    pub path: String,
}

impl EndpointSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
        }
    }

    /// Number of positional arguments the template takes.
    pub fn arity(&self) -> usize {
        self.path.matches(PLACEHOLDER).count()
    }

    /// Fill the template with `args`.
    pub fn render(&self, key: &str, args: &[Value]) -> SessionResult<String> {
        if args.len() != self.arity() {
            return Err(SessionError::BadArguments {
                endpoint: key.to_string(),
                reason: format!("expected {} arguments, got {}", self.arity(), args.len()),
            });
        }

        let mut parts = self.path.split(PLACEHOLDER);
        let mut path = parts.next().unwrap_or_default().to_string();
        for (arg, rest) in args.iter().zip(parts) {
            path.push_str(&arg_to_segment(key, arg)?);
            path.push_str(rest);
        }
        Ok(path)
    }
}

fn arg_to_segment(key: &str, arg: &Value) -> SessionResult<String> {
    match arg {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(SessionError::BadArguments {
            endpoint: key.to_string(),
            reason: format!("argument {other} cannot be used in a path"),
        }),
    }
}

/// Endpoint-table client over a shared session.
pub struct SessionApiClient {
    session: Arc<Session>,
    endpoints: HashMap<String, EndpointSpec>,
}

impl SessionApiClient {
    pub fn new(session: Arc<Session>, endpoints: HashMap<String, EndpointSpec>) -> Self {
        Self { session, endpoints }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn endpoint(&self, key: &str) -> Option<&EndpointSpec> {
        self.endpoints.get(key)
    }

    /// Build the request for `key` without sending it.
    pub fn build_request(
        &self,
        key: &str,
        args: &[Value],
        options: &SendOptions,
    ) -> SessionResult<HttpRequest> {
        let spec = self
            .endpoints
            .get(key)
            .ok_or_else(|| SessionError::UnknownEndpoint(key.to_string()))?;
        let path = spec.render(key, args)?;

        let request = match spec.method {
            Method::Get => HttpRequest::get(path),
            Method::Post => HttpRequest::post(path, options.data.clone().unwrap_or(json!({}))),
        };
        Ok(request.with_params(options.params.clone()))
    }

    async fn send_inner(
        &self,
        key: &str,
        args: &[Value],
        options: SendOptions,
    ) -> SessionResult<ApiResponse> {
        let request = self.build_request(key, args, &options)?;
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.session.config().default_max_attempts);

        debug!(endpoint = key, method = %request.method, path = %request.path, "Sending");
        let payload = self.session.request_safely(&request, max_attempts).await?;

        Ok(ApiResponse {
            success: status_ok(&payload),
            payload,
        })
    }
}

impl ApiClient for SessionApiClient {
    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        args: &'a [Value],
        options: SendOptions,
    ) -> BoxFuture<'a, CoreResult<ApiResponse>> {
        Box::pin(async move { Ok(self.send_inner(endpoint, args, options).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::session::SessionConfig;
    use crate::transport::MockTransport;
    use cadence_core::{Command, CoreError};

    fn endpoints() -> HashMap<String, EndpointSpec> {
        HashMap::from([
            ("timeline".to_string(), EndpointSpec::get("feed/timeline/")),
            ("follow".to_string(), EndpointSpec::post("friendships/create/{}/")),
            (
                "comment".to_string(),
                EndpointSpec::post("media/{}/comment/{}/"),
            ),
        ])
    }

    fn client(transport: Arc<MockTransport>) -> SessionApiClient {
        let config = SessionConfig {
            base_url: "https://api.test".to_string(),
            rate_limits: Vec::new(),
            ..SessionConfig::default()
        };
        let session = Session::new(config, transport, Credentials::new("usr", "pwd").unwrap())
            .unwrap();
        SessionApiClient::new(Arc::new(session), endpoints())
    }

    #[test]
    fn test_render_fills_placeholders_in_order() {
        let spec = EndpointSpec::post("media/{}/comment/{}/");
        assert_eq!(spec.arity(), 2);
        assert_eq!(
            spec.render("comment", &[json!(12), json!("abc")]).unwrap(),
            "media/12/comment/abc/"
        );
    }

    #[test]
    fn test_render_rejects_wrong_arity() {
        let spec = EndpointSpec::post("friendships/create/{}/");
        assert!(matches!(
            spec.render("follow", &[]),
            Err(SessionError::BadArguments { .. })
        ));
        assert!(matches!(
            spec.render("follow", &[json!({"id": 1})]),
            Err(SessionError::BadArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_routes_through_session() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone());

        let resp = client
            .send("follow", &[json!(42)], SendOptions::default().param("src", "feed"))
            .await
            .unwrap();

        assert!(resp.success);
        let sent = transport.sent();
        assert_eq!(sent[0].url, "https://api.test/friendships/create/42/");
        assert_eq!(sent[0].request.method, Method::Post);
        assert!(sent[0]
            .request
            .params
            .contains(&("src".to_string(), "feed".to_string())));
    }

    #[test]
    fn test_data_is_the_post_body() {
        let client = client(Arc::new(MockTransport::new()));
        let options = SendOptions {
            data: Some(json!({"comment_text": "nice"})),
            ..SendOptions::default()
        };

        let post = client.build_request("comment", &[json!(1), json!(2)], &options).unwrap();
        assert_eq!(post.body, Some(json!({"comment_text": "nice"})));

        let bare = client
            .build_request("follow", &[json!(1)], &SendOptions::default())
            .unwrap();
        assert_eq!(bare.body, Some(json!({})));

        let get = client.build_request("timeline", &[], &options).unwrap();
        assert_eq!(get.body, None);
    }

    #[tokio::test]
    async fn test_success_follows_status_field() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(json!({"status": "fail", "message": "blocked"}));
        let client = client(transport);

        let cmd = Command::bare("timeline");
        let resp = client.execute(&cmd).await.unwrap();

        assert!(!resp.success);
        assert_eq!(resp.payload["message"], "blocked");
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let client = client(Arc::new(MockTransport::new()));
        let err = client
            .send("explore", &[], SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownEndpoint(key) if key == "explore"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_option_surfaces_connection_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_failures(5, 500);
        let client = client(transport.clone());

        let err = client
            .send("timeline", &[], SendOptions::with_max_attempts(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ConnectionFailed { attempts: 1, .. }));
        assert_eq!(transport.sent_count(), 2);
    }
}
