//! Account credentials.

use crate::error::{SessionError, SessionResult};
use serde_json::{json, Value};
use std::fmt;
use zeroize::Zeroizing;

/// Credentials for one account.
///
/// The password is wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
    /// Stable per-account device identifier sent with login.
    device_id: String,
    /// Auth token issued by a successful login.
    token: Option<String>,
}

impl Credentials {
    /// Create credentials with a fresh device id.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> SessionResult<Self> {
        let username = username.into();
        let password = Zeroizing::new(password.into());
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::Credentials(
                "Must provide username and password".to_string(),
            ));
        }
        Ok(Self {
            username,
            password,
            device_id: format!("device-{}", uuid::Uuid::new_v4().simple()),
            token: None,
        })
    }

    /// Restore a previously issued session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Body posted to the login endpoint.
    pub fn login_body(&self) -> Value {
        json!({
            "username": self.username,
            "password": self.password.as_str(),
            "device_id": self.device_id,
        })
    }

    /// Same account, same device.
    pub fn same_account(&self, other: &Credentials) -> bool {
        self.username == other.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
