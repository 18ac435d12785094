//! Application configuration.

use crate::error::{BotError, BotResult};
use cadence_actions::{DaylightWindow, PacingConfig};
use cadence_session::{
    Credentials, EndpointSpec, RateLimitRule, RateLimits, RetryPolicy, SessionConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CADENCE_CONFIG";
/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "CADENCE_PASSWORD";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// One rate-limit bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Regex searched for in request paths.
    pub pattern: String,
    pub max_calls: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    3600
}

impl From<&RateLimitSettings> for RateLimitRule {
    fn from(s: &RateLimitSettings) -> Self {
        RateLimitRule::new(s.pattern.clone(), s.max_calls, Duration::from_secs(s.window_secs))
    }
}

/// Session and request engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Transport timeout per request (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Backoff after the first failure (ms). Default: 500.
    #[serde(default = "default_sleep_on_page_ms")]
    pub sleep_on_page_ms: u64,
    /// Backoff multiplier. Default: 2.0.
    #[serde(default = "default_exponential_sleep_increase")]
    pub exponential_sleep_increase: f64,
    /// Consecutive failures before circuit breaks. Default: 10.
    #[serde(default = "default_requests_to_break")]
    pub requests_to_break: u32,
    /// Consecutive breaks before re-authenticating. Default: 5.
    #[serde(default = "default_relog_after_breaks")]
    pub relog_after_breaks: u32,
    /// Circuit break pause (s). Default: 600.
    #[serde(default = "default_sleep_on_break_secs")]
    pub sleep_on_break_secs: u64,
    /// Pause between logout and login on re-authentication (s). Default: 60.
    #[serde(default = "default_relog_wait_secs")]
    pub relog_wait_secs: u64,
    /// Attempts per request when the caller sets none. 0 = unbounded.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Ordered; first match wins.
    #[serde(default = "default_rate_limits")]
    pub rate_limits: Vec<RateLimitSettings>,
}

fn default_base_url() -> String {
    "https://i.instagram.com/api/v1/".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_sleep_on_page_ms() -> u64 {
    500
}

fn default_exponential_sleep_increase() -> f64 {
    2.0
}

fn default_requests_to_break() -> u32 {
    10
}

fn default_relog_after_breaks() -> u32 {
    5
}

fn default_sleep_on_break_secs() -> u64 {
    600
}

fn default_relog_wait_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    10
}

fn default_login_path() -> String {
    "accounts/login/".to_string()
}

fn default_logout_path() -> String {
    "accounts/logout/".to_string()
}

fn default_rate_limits() -> Vec<RateLimitSettings> {
    RateLimitRule::defaults()
        .into_iter()
        .map(|r| RateLimitSettings {
            pattern: r.pattern,
            max_calls: r.max_calls,
            window_secs: r.window.as_secs(),
        })
        .collect()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            sleep_on_page_ms: default_sleep_on_page_ms(),
            exponential_sleep_increase: default_exponential_sleep_increase(),
            requests_to_break: default_requests_to_break(),
            relog_after_breaks: default_relog_after_breaks(),
            sleep_on_break_secs: default_sleep_on_break_secs(),
            relog_wait_secs: default_relog_wait_secs(),
            default_max_attempts: default_max_attempts(),
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            rate_limits: default_rate_limits(),
        }
    }
}

impl SessionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(s: &SessionSettings) -> Self {
        SessionConfig {
            base_url: s.base_url.clone(),
            retry: RetryPolicy {
                sleep_on_page: Duration::from_millis(s.sleep_on_page_ms),
                exponential_sleep_increase: s.exponential_sleep_increase,
                requests_to_break: s.requests_to_break,
                relog_after_breaks: s.relog_after_breaks,
                sleep_on_break: Duration::from_secs(s.sleep_on_break_secs),
                relog_wait: Duration::from_secs(s.relog_wait_secs),
            },
            rate_limits: s.rate_limits.iter().map(RateLimitRule::from).collect(),
            default_max_attempts: s.default_max_attempts,
            login_path: s.login_path.clone(),
            logout_path: s.logout_path.clone(),
        }
    }
}

/// Feed pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingSettings {
    #[serde(default = "default_sleep_between_pages_ms")]
    pub sleep_between_pages_ms: u64,
    #[serde(default = "default_sleep_between_reads_secs")]
    pub sleep_between_reads_secs: u64,
}

fn default_sleep_between_pages_ms() -> u64 {
    500
}

fn default_sleep_between_reads_secs() -> u64 {
    900
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            sleep_between_pages_ms: default_sleep_between_pages_ms(),
            sleep_between_reads_secs: default_sleep_between_reads_secs(),
        }
    }
}

impl From<&PacingSettings> for PacingConfig {
    fn from(s: &PacingSettings) -> Self {
        PacingConfig {
            sleep_between_pages: Duration::from_millis(s.sleep_between_pages_ms),
            sleep_between_reads: Duration::from_secs(s.sleep_between_reads_secs),
        }
    }
}

/// Account settings. The password only ever comes from `CADENCE_PASSWORD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSettings {
    #[serde(default)]
    pub username: String,
}

impl CredentialSettings {
    /// Credentials for `username` with the password from the environment.
    pub fn resolve(&self) -> BotResult<Credentials> {
        let password = std::env::var(PASSWORD_ENV)
            .map_err(|_| BotError::Config(format!("{PASSWORD_ENV} is not set")))?;
        Ok(Credentials::new(self.username.clone(), password)?)
    }
}

/// A configured action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Log out and back in `n_relogs` times per period.
    PeriodicRelogin {
        #[serde(default = "default_n_relogs")]
        n_relogs: u32,
        #[serde(default = "default_relogin_period_secs")]
        period_secs: u64,
        #[serde(default)]
        daylight: Option<DaylightWindow>,
    },
    /// Run one command up to `per_interval` times per interval.
    Repeat {
        #[serde(default)]
        name: Option<String>,
        endpoint: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default = "default_per_interval")]
        per_interval: u32,
        #[serde(default = "default_interval_secs")]
        interval_secs: u64,
        #[serde(default)]
        daylight: Option<DaylightWindow>,
    },
    /// Commit a command on the lowest-scoring item of a feed.
    ScoredFeed {
        #[serde(default)]
        name: Option<String>,
        feed_endpoint: String,
        #[serde(default)]
        feed_args: Vec<Value>,
        #[serde(default = "default_item_keys")]
        item_keys: Vec<String>,
        score_field: String,
        command_endpoint: String,
        #[serde(default = "default_min_candidates")]
        min_candidates: usize,
        #[serde(default = "default_per_interval")]
        per_interval: u32,
        #[serde(default = "default_interval_secs")]
        interval_secs: u64,
        #[serde(default)]
        daylight: Option<DaylightWindow>,
    },
}

fn default_n_relogs() -> u32 {
    8
}

fn default_relogin_period_secs() -> u64 {
    24 * 3600
}

fn default_per_interval() -> u32 {
    1
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_item_keys() -> Vec<String> {
    vec!["items".to_string()]
}

fn default_min_candidates() -> usize {
    10
}

impl ActionConfig {
    /// Name used in logs and the dry-run plan.
    pub fn name(&self) -> String {
        match self {
            ActionConfig::PeriodicRelogin { .. } => "periodic_relogin".to_string(),
            ActionConfig::Repeat { name, endpoint, .. } => {
                name.clone().unwrap_or_else(|| format!("repeat_{endpoint}"))
            }
            ActionConfig::ScoredFeed {
                name,
                feed_endpoint,
                command_endpoint,
                ..
            } => name
                .clone()
                .unwrap_or_else(|| format!("{command_endpoint}_from_{feed_endpoint}")),
        }
    }

    pub fn daylight(&self) -> Option<DaylightWindow> {
        match self {
            ActionConfig::PeriodicRelogin { daylight, .. }
            | ActionConfig::Repeat { daylight, .. }
            | ActionConfig::ScoredFeed { daylight, .. } => *daylight,
        }
    }

    /// One-line summary for the dry-run plan.
    pub fn describe(&self) -> String {
        let schedule = match self {
            ActionConfig::PeriodicRelogin {
                n_relogs,
                period_secs,
                ..
            } => format!("{n_relogs} re-logins per {period_secs}s"),
            ActionConfig::Repeat {
                endpoint,
                args,
                per_interval,
                interval_secs,
                ..
            } => format!("{endpoint} {args:?} up to {per_interval} per {interval_secs}s"),
            ActionConfig::ScoredFeed {
                feed_endpoint,
                score_field,
                command_endpoint,
                per_interval,
                interval_secs,
                ..
            } => format!(
                "{command_endpoint} lowest {score_field} of {feed_endpoint}, \
                 up to {per_interval} per {interval_secs}s"
            ),
        };
        match self.daylight() {
            Some(w) => format!(
                "{}: {schedule}, {:02}h-{:02}h",
                self.name(),
                w.day_begins_at,
                w.day_ends_at
            ),
            None => format!("{}: {schedule}", self.name()),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionSettings,
    /// Endpoint key to method and path template.
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointSpec>,
    #[serde(default)]
    pub pacing: PacingSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl AppConfig {
    /// Load from `CADENCE_CONFIG` or the default path, else defaults.
    pub fn load() -> BotResult<Self> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> BotResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BotError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> BotResult<Self> {
        toml::from_str(content).map_err(|e| BotError::Config(format!("Failed to parse config: {e}")))
    }

    /// One line per configured action.
    pub fn plan(&self) -> Vec<String> {
        self.actions.iter().map(ActionConfig::describe).collect()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.session)
    }

    pub fn pacing_config(&self) -> PacingConfig {
        PacingConfig::from(&self.pacing)
    }

    /// Check everything that would otherwise only fail once running.
    pub fn validate(&self) -> BotResult<()> {
        if self.session.base_url.is_empty() {
            return Err(BotError::Config("session.base_url is empty".to_string()));
        }
        if self.session.exponential_sleep_increase < 1.0 {
            return Err(BotError::Config(
                "session.exponential_sleep_increase must be at least 1.0".to_string(),
            ));
        }
        RateLimits::new(&self.session_config().rate_limits)?;

        for action in &self.actions {
            self.validate_action(action)?;
        }
        Ok(())
    }

    fn validate_action(&self, action: &ActionConfig) -> BotResult<()> {
        let name = action.name();
        if let Some(w) = action.daylight() {
            if w.day_begins_at > w.day_ends_at || w.day_ends_at > 24 {
                return Err(BotError::Config(format!(
                    "{name}: invalid daylight window {}..{}",
                    w.day_begins_at, w.day_ends_at
                )));
            }
        }

        match action {
            ActionConfig::PeriodicRelogin {
                n_relogs,
                period_secs,
                ..
            } => {
                if *n_relogs == 0 || *period_secs == 0 {
                    return Err(BotError::Config(format!(
                        "{name}: n_relogs and period_secs must be positive"
                    )));
                }
            }
            ActionConfig::Repeat {
                endpoint,
                args,
                per_interval,
                interval_secs,
                ..
            } => {
                self.check_pacing(&name, *per_interval, *interval_secs)?;
                let spec = self.endpoint(&name, endpoint)?;
                spec.render(endpoint, args)?;
            }
            ActionConfig::ScoredFeed {
                feed_endpoint,
                feed_args,
                item_keys,
                command_endpoint,
                per_interval,
                interval_secs,
                ..
            } => {
                self.check_pacing(&name, *per_interval, *interval_secs)?;
                self.endpoint(&name, feed_endpoint)?.render(feed_endpoint, feed_args)?;
                if self.endpoint(&name, command_endpoint)?.arity() != 1 {
                    return Err(BotError::Config(format!(
                        "{name}: endpoint '{command_endpoint}' must take exactly one argument"
                    )));
                }
                if item_keys.is_empty() {
                    return Err(BotError::Config(format!("{name}: item_keys is empty")));
                }
            }
        }
        Ok(())
    }

    fn endpoint(&self, action: &str, key: &str) -> BotResult<&EndpointSpec> {
        self.endpoints
            .get(key)
            .ok_or_else(|| BotError::Config(format!("{action}: unknown endpoint '{key}'")))
    }

    fn check_pacing(&self, action: &str, per_interval: u32, interval_secs: u64) -> BotResult<()> {
        if per_interval == 0 || interval_secs == 0 {
            return Err(BotError::Config(format!(
                "{action}: per_interval and interval_secs must be positive"
            )));
        }
        Ok(())
    }
}
