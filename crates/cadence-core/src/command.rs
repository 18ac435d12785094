//! Queued command values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A parameterized call awaiting paced execution.
///
/// Commands compare by value so a queue can refuse to hold the same
/// `(endpoint, args)` pair twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Endpoint key understood by the `ApiClient` (e.g. "follow").
    pub endpoint: String,
    /// Positional arguments for the endpoint.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Command {
    pub fn new(endpoint: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            args,
        }
    }

    /// Command without arguments.
    pub fn bare(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, Vec::new())
    }

    /// Command with a single argument.
    pub fn with_arg(endpoint: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(endpoint, vec![arg.into()])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.endpoint)?;
        for arg in &self.args {
            match arg {
                Value::String(s) => write!(f, " {s}")?,
                other => write!(f, " {other}")?,
            }
        }
        Ok(())
    }
}
