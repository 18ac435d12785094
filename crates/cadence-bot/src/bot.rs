//! Action supervisor.
//!
//! The bot owns a registry of actions, each run by its own Tokio task.
//! Actions are identified by small integer ids; the lowest free id is
//! handed out first, so ids are reused after removal.

use crate::error::{BotError, BotResult};
use cadence_actions::{run_action, Action, ActionContext, ActionControl, LocalClock, WallClock};
use cadence_core::DynApiClient;
use cadence_telemetry::Metrics;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type ActionId = usize;

/// Poll interval of `wait` and blocking `stop_action`.
const WAIT_POLL: Duration = Duration::from_millis(1);
/// Poll interval of the supervising loop.
const SUPERVISE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// Registered, never started.
    Created,
    Running,
    /// Worker exited (finished, cancelled or crashed).
    Stopped,
}

/// Where an idle action lives. The worker takes it out while running and
/// puts it back when `run_action` returns.
type ActionSlot = Arc<Mutex<Option<Box<dyn Action>>>>;

struct Entry {
    name: String,
    slot: ActionSlot,
    control: ActionControl,
    worker: Option<JoinHandle<()>>,
}

impl Entry {
    fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn status(&self) -> ActionStatus {
        match &self.worker {
            None => ActionStatus::Created,
            Some(w) if !w.is_finished() => ActionStatus::Running,
            Some(_) => ActionStatus::Stopped,
        }
    }
}

pub struct Bot {
    api: DynApiClient,
    clock: Arc<dyn WallClock>,
    registry: Mutex<BTreeMap<ActionId, Entry>>,
    kill: CancellationToken,
}

impl Bot {
    pub fn new(api: DynApiClient) -> Self {
        Self {
            api,
            clock: Arc::new(LocalClock),
            registry: Mutex::new(BTreeMap::new()),
            kill: CancellationToken::new(),
        }
    }

    /// Clock used by the daylight windows of every action.
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn api(&self) -> &DynApiClient {
        &self.api
    }

    /// Whether the supervising loop has not been told to stop.
    pub fn running(&self) -> bool {
        !self.kill.is_cancelled()
    }

    /// Register an action without starting it.
    pub fn add_action(&self, action: Box<dyn Action>) -> ActionId {
        let mut registry = self.registry.lock();
        let id = (0..)
            .find(|id| !registry.contains_key(id))
            .unwrap_or(registry.len());
        let name = action.name().to_string();
        registry.insert(
            id,
            Entry {
                name: name.clone(),
                slot: Arc::new(Mutex::new(Some(action))),
                control: ActionControl::new(),
                worker: None,
            },
        );
        debug!(action_id = id, action = %name, "Action added");
        id
    }

    /// Unregister a stopped action and hand it back.
    pub fn remove_action(&self, id: ActionId) -> BotResult<Box<dyn Action>> {
        let mut registry = self.registry.lock();
        let entry = registry.get(&id).ok_or(BotError::UnknownAction(id))?;
        if entry.is_alive() {
            return Err(BotError::ActionRunning(id));
        }
        let Some(entry) = registry.remove(&id) else {
            return Err(BotError::UnknownAction(id));
        };
        debug!(action_id = id, action = %entry.name, "Action removed");
        let action = entry.slot.lock().take();
        action.ok_or(BotError::ActionLost(id))
    }

    pub fn ids(&self) -> Vec<ActionId> {
        self.registry.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    pub fn status(&self, id: ActionId) -> BotResult<ActionStatus> {
        self.with_entry(id, Entry::status)
    }

    pub fn is_alive(&self, id: ActionId) -> BotResult<bool> {
        self.with_entry(id, Entry::is_alive)
    }

    pub fn is_done(&self, id: ActionId) -> BotResult<bool> {
        self.with_entry(id, |e| e.control.is_done())
    }

    pub fn control(&self, id: ActionId) -> BotResult<ActionControl> {
        self.with_entry(id, |e| e.control.clone())
    }

    fn with_entry<T>(&self, id: ActionId, f: impl FnOnce(&Entry) -> T) -> BotResult<T> {
        self.registry
            .lock()
            .get(&id)
            .map(f)
            .ok_or(BotError::UnknownAction(id))
    }

    /// Spawn a worker for the action. A previously run action is restarted.
    pub fn start_action(&self, id: ActionId) -> BotResult<()> {
        let mut registry = self.registry.lock();
        let entry = registry.get_mut(&id).ok_or(BotError::UnknownAction(id))?;
        if entry.is_alive() {
            return Err(BotError::ActionRunning(id));
        }
        let Some(action) = entry.slot.lock().take() else {
            return Err(BotError::ActionLost(id));
        };
        if entry.worker.is_some() {
            entry.control.restart();
        }

        let ctx = ActionContext::new(self.api.clone(), entry.control.clone())
            .with_clock(self.clock.clone());
        entry.worker = Some(tokio::spawn(run_worker(id, action, entry.slot.clone(), ctx)));
        info!(action_id = id, action = %entry.name, "Action started");
        Ok(())
    }

    /// Cancel the action. With `block`, wait until its worker has exited.
    ///
    /// The step in progress always completes first.
    pub async fn stop_action(&self, id: ActionId, block: bool) -> BotResult<()> {
        self.control(id)?.cancel();
        if block {
            while self.is_alive(id)? {
                tokio::time::sleep(WAIT_POLL).await;
            }
        }
        Ok(())
    }

    /// Start every registered action that is not running.
    pub fn start(&self) -> BotResult<()> {
        for id in self.ids() {
            if !self.is_alive(id)? {
                self.start_action(id)?;
            }
        }
        Ok(())
    }

    /// Tell the supervising loop to exit.
    pub fn stop(&self) {
        if self.running() {
            info!("Bot stop requested");
        }
        self.kill.cancel();
    }

    /// Wait until the action is done.
    ///
    /// A crashed action never sets `done`; check `status` to tell it apart.
    pub async fn wait(&self, id: ActionId) -> BotResult<()> {
        while !self.is_done(id)? {
            tokio::time::sleep(WAIT_POLL).await;
        }
        Ok(())
    }

    /// Stop the loop, then cancel and remove every action.
    ///
    /// Every action is cancelled before any is waited on. Without `block`,
    /// workers are detached and finish their current step on their own.
    pub async fn close(&self, block: bool) {
        self.stop();
        let ids = self.ids();
        for &id in &ids {
            if let Err(e) = self.stop_action(id, false).await {
                warn!(action_id = id, error = %e, "Failed to stop action");
            }
        }
        for id in ids {
            if block {
                if let Err(e) = self.stop_action(id, true).await {
                    warn!(action_id = id, error = %e, "Failed to stop action");
                }
            }
            if let Some(entry) = self.registry.lock().remove(&id) {
                debug!(action_id = id, action = %entry.name, "Action closed");
            }
        }
        info!("Bot closed");
    }

    /// Start all actions and supervise until `stop`, then `close`.
    ///
    /// Actions added while running are started by the loop.
    pub async fn run(&self) -> BotResult<()> {
        info!(actions = self.len(), "Bot running");
        let result = self.supervise().await;
        self.close(true).await;
        result
    }

    /// `run` on its own task.
    pub fn run_threaded(self: &Arc<Self>) -> JoinHandle<BotResult<()>> {
        let bot = Arc::clone(self);
        tokio::spawn(async move { bot.run().await })
    }

    async fn supervise(&self) -> BotResult<()> {
        self.start()?;
        loop {
            tokio::select! {
                _ = self.kill.cancelled() => return Ok(()),
                _ = tokio::time::sleep(SUPERVISE_POLL) => self.start_created()?,
            }
        }
    }

    fn start_created(&self) -> BotResult<()> {
        let created: Vec<ActionId> = self
            .registry
            .lock()
            .iter()
            .filter(|(_, e)| e.worker.is_none())
            .map(|(id, _)| *id)
            .collect();
        for id in created {
            self.start_action(id)?;
        }
        Ok(())
    }
}

/// Counts a worker in `cadence_actions_running` for as long as it lives,
/// including when it unwinds from a panic.
struct RunningGuard;

impl RunningGuard {
    fn enter() -> Self {
        Metrics::action_started();
        Self
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        Metrics::action_stopped();
    }
}

/// Runs one action to completion and returns it to its slot.
///
/// Errors are logged; `done` stays unset so a crash is visible to `wait`.
async fn run_worker(id: ActionId, mut action: Box<dyn Action>, slot: ActionSlot, ctx: ActionContext) {
    let name = action.name().to_string();
    let _running = RunningGuard::enter();

    match run_action(action.as_mut(), &ctx).await {
        Ok(()) => info!(action_id = id, action = %name, "Action finished"),
        Err(e) => error!(action_id = id, action = %name, error = %e, "Action crashed"),
    }

    *slot.lock() = Some(action);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_actions::ActionResult;
    use cadence_core::{BoxFuture, MockApiClient};

    struct Idle;

    impl Action for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        fn step<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
        }
    }

    fn bot() -> Bot {
        Bot::new(Arc::new(MockApiClient::new()))
    }

    #[test]
    fn test_ids_are_first_fit() {
        let bot = bot();
        let ids: Vec<_> = (0..4).map(|_| bot.add_action(Box::new(Idle))).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        bot.remove_action(2).unwrap();
        bot.remove_action(0).unwrap();

        assert_eq!(bot.add_action(Box::new(Idle)), 0);
        assert_eq!(bot.add_action(Box::new(Idle)), 2);
        assert_eq!(bot.add_action(Box::new(Idle)), 4);
    }

    #[test]
    fn test_unknown_id() {
        let bot = bot();
        assert!(matches!(bot.status(7), Err(BotError::UnknownAction(7))));
        assert!(matches!(bot.remove_action(7), Err(BotError::UnknownAction(7))));
        assert!(matches!(bot.start_action(7), Err(BotError::UnknownAction(7))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_action_cannot_be_removed_or_restarted() {
        let bot = bot();
        let id = bot.add_action(Box::new(Idle));
        assert_eq!(bot.status(id).unwrap(), ActionStatus::Created);

        bot.start_action(id).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(bot.status(id).unwrap(), ActionStatus::Running);
        assert!(matches!(bot.remove_action(id), Err(BotError::ActionRunning(_))));
        assert!(matches!(bot.start_action(id), Err(BotError::ActionRunning(_))));

        bot.stop_action(id, true).await.unwrap();
        assert_eq!(bot.status(id).unwrap(), ActionStatus::Stopped);
        assert_eq!(bot.remove_action(id).unwrap().name(), "idle");
    }

    #[test]
    fn test_stop_clears_running() {
        let bot = bot();
        assert!(bot.running());
        bot.stop();
        assert!(!bot.running());
    }
}
