//! Periodic re-login to look like a person reopening the app.

use crate::action::{Action, ActionContext};
use crate::daylight::DaylightWindow;
use crate::error::ActionResult;
use crate::pacing::RandomIntervals;
use cadence_core::BoxFuture;
use cadence_session::Session;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Logs out and back in `n_relogs` times per `period`, at random offsets.
pub struct PeriodicRelogin {
    session: Arc<Session>,
    intervals: RandomIntervals,
    daylight: Option<DaylightWindow>,
    relogs: u64,
}

impl PeriodicRelogin {
    pub fn new(session: Arc<Session>, n_relogs: u32, period: Duration) -> Self {
        Self {
            session,
            intervals: RandomIntervals::new(n_relogs, period),
            daylight: None,
            relogs: 0,
        }
    }

    pub fn only_during(mut self, window: DaylightWindow) -> Self {
        self.daylight = Some(window);
        self
    }

    pub fn relogs(&self) -> u64 {
        self.relogs
    }

    async fn relog(&mut self) -> ActionResult<()> {
        let wait = self.intervals.next().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let credentials = self.session.credentials();
        if self.session.switch_credentials(credentials).await? {
            self.relogs += 1;
            info!(username = %self.session.username(), relogs = self.relogs, "Re-logged in");
        } else {
            warn!(username = %self.session.username(), "Periodic re-login rejected");
        }
        Ok(())
    }
}

impl Action for PeriodicRelogin {
    fn name(&self) -> &str {
        "periodic_relogin"
    }

    fn daylight(&self) -> Option<DaylightWindow> {
        self.daylight
    }

    fn step<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(self.relog())
    }
}
