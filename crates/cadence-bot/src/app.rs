//! Application wiring.
//!
//! Builds the session, the endpoint-table client and the bot from an
//! `AppConfig`, turns configured actions into runnable ones, and runs the
//! bot until Ctrl-C.

use crate::bot::{ActionId, Bot};
use crate::config::{ActionConfig, AppConfig};
use crate::error::{BotError, BotResult};
use cadence_actions::{
    Action, CandidateActions, DaylightWindow, PeriodicRelogin, QueuedActions, RepeatCommands,
    ScoredFeed,
};
use cadence_core::{Command, DynApiClient};
use cadence_session::{Credentials, DynTransport, HttpTransport, Session, SessionApiClient};
use cadence_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    session: Arc<Session>,
    bot: Arc<Bot>,
}

impl Application {
    /// Create an application talking HTTP to `session.base_url`.
    pub fn new(config: AppConfig, credentials: Credentials) -> BotResult<Self> {
        let transport = Arc::new(HttpTransport::with_timeout(config.session.timeout())?);
        Self::with_transport(config, credentials, transport)
    }

    /// Create an application over any transport.
    pub fn with_transport(
        config: AppConfig,
        credentials: Credentials,
        transport: DynTransport,
    ) -> BotResult<Self> {
        config.validate()?;

        let session = Arc::new(Session::new(config.session_config(), transport, credentials)?);
        let endpoints = config
            .endpoints
            .iter()
            .map(|(key, spec)| (key.clone(), spec.clone()))
            .collect();
        let api: DynApiClient = Arc::new(SessionApiClient::new(session.clone(), endpoints));
        let bot = Arc::new(Bot::new(api));

        Ok(Self {
            config,
            session,
            bot,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub async fn login(&self) -> BotResult<()> {
        let username = self.session.username();
        info!(%username, "Logging in");
        if self.session.login().await? {
            Ok(())
        } else {
            Err(BotError::LoginRejected(username))
        }
    }

    /// Register every configured action with the bot.
    pub fn install_actions(&self) -> Vec<ActionId> {
        self.config
            .actions
            .iter()
            .map(|cfg| {
                let id = self.bot.add_action(self.build_action(cfg));
                info!(action_id = id, plan = %cfg.describe(), "Action installed");
                id
            })
            .collect()
    }

    fn build_action(&self, cfg: &ActionConfig) -> Box<dyn Action> {
        let name = cfg.name();
        match cfg {
            ActionConfig::PeriodicRelogin {
                n_relogs,
                period_secs,
                daylight,
            } => {
                let action = PeriodicRelogin::new(
                    self.session.clone(),
                    *n_relogs,
                    Duration::from_secs(*period_secs),
                );
                match daylight {
                    Some(window) => Box::new(action.only_during(*window)),
                    None => Box::new(action),
                }
            }
            ActionConfig::Repeat {
                endpoint,
                args,
                per_interval,
                interval_secs,
                daylight,
                ..
            } => {
                let planner =
                    RepeatCommands::new(name, vec![Command::new(endpoint.clone(), args.clone())]);
                paced(planner, *per_interval, *interval_secs, *daylight)
            }
            ActionConfig::ScoredFeed {
                feed_endpoint,
                feed_args,
                item_keys,
                score_field,
                command_endpoint,
                min_candidates,
                per_interval,
                interval_secs,
                daylight,
                ..
            } => {
                let policy = ScoredFeed::new(
                    name,
                    feed_endpoint.clone(),
                    feed_args.clone(),
                    score_field.clone(),
                )
                .with_item_keys(item_keys.clone())
                .with_pacing(self.config.pacing_config());
                let planner = CandidateActions::new(
                    policy,
                    *min_candidates,
                    ScoredFeed::command_on_id(command_endpoint.clone()),
                );
                paced(planner, *per_interval, *interval_secs, *daylight)
            }
        }
    }

    /// Log in, run every configured action, and stop on Ctrl-C.
    pub async fn run(self) -> BotResult<()> {
        self.login().await?;
        let ids = self.install_actions();
        info!(actions = ids.len(), "Starting bot");

        let mut runner = self.bot.run_threaded();
        let result = tokio::select! {
            joined = &mut runner => joined,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown signal received");
                self.bot.stop();
                runner.await
            }
        };

        info!("Shutting down");
        match Metrics::render() {
            Ok(text) => info!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        result?
    }
}

fn paced<P>(
    planner: P,
    per_interval: u32,
    interval_secs: u64,
    daylight: Option<DaylightWindow>,
) -> Box<dyn Action>
where
    P: cadence_actions::Planner + 'static,
{
    let action = QueuedActions::new(planner, per_interval, Duration::from_secs(interval_secs));
    match daylight {
        Some(window) => Box::new(action.only_during(window)),
        None => Box::new(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_session::MockTransport;

    fn config() -> AppConfig {
        AppConfig::from_toml(
            r#"
[session]
base_url = "https://api.test/"
rate_limits = []

[endpoints.timeline]
path = "feed/timeline/"

[[actions]]
kind = "repeat"
endpoint = "timeline"

[[actions]]
kind = "periodic_relogin"
"#,
        )
        .unwrap()
    }

    fn app(transport: Arc<MockTransport>) -> Application {
        Application::with_transport(config(), Credentials::new("usr", "pwd").unwrap(), transport)
            .unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.endpoints.clear();

        let result = Application::with_transport(
            config,
            Credentials::new("usr", "pwd").unwrap(),
            Arc::new(MockTransport::new()),
        );

        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_install_actions() {
        let app = app(Arc::new(MockTransport::new()));

        let ids = app.install_actions();

        assert_eq!(ids, vec![0, 1]);
        assert_eq!(app.bot().len(), 2);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(serde_json::json!({"status": "fail", "message": "bad password"}));
        let app = app(transport);

        assert!(matches!(app.login().await, Err(BotError::LoginRejected(_))));
        assert!(!app.session().is_logged_in());
    }
}
