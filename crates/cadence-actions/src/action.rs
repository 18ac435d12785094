//! The base unit of scheduled work.
//!
//! An action runs `begin`, then `step` until its control reports done, then
//! `end`. Cancellation is cooperative: it is only observed between steps, so
//! a step already in progress always completes.

use crate::daylight::{DaylightWindow, LocalClock, WallClock};
use crate::error::ActionResult;
use cadence_core::{BoxFuture, DynApiClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared `done` flag of one action.
///
/// Cloned into the supervisor so any task may cancel the action.
#[derive(Debug, Clone, Default)]
pub struct ActionControl {
    done: Arc<AtomicBool>,
}

impl ActionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the action to stop at its next step boundary.
    pub fn cancel(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Clear `done` so a finished action can run again.
    pub fn restart(&self) {
        self.done.store(false, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Everything a running action may use.
#[derive(Clone)]
pub struct ActionContext {
    pub api: DynApiClient,
    pub control: ActionControl,
    pub clock: Arc<dyn WallClock>,
}

impl ActionContext {
    pub fn new(api: DynApiClient, control: ActionControl) -> Self {
        Self {
            api,
            control,
            clock: Arc::new(LocalClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }
}

/// A cancellable, time-sliced task.
pub trait Action: Send {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Window of hours the action may step in. `None` = any time.
    fn daylight(&self) -> Option<DaylightWindow> {
        None
    }

    fn begin<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn step<'a>(&'a mut self, ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>>;

    fn end<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Drive `action` to completion.
///
/// Errors from any hook are returned as-is; `done` is left untouched so a
/// crashed action is distinguishable from a finished one.
pub async fn run_action(action: &mut dyn Action, ctx: &ActionContext) -> ActionResult<()> {
    action.begin(ctx).await?;

    while !ctx.control.is_done() {
        if let Some(window) = action.daylight() {
            window.wait(ctx.clock.as_ref(), &ctx.control).await;
            if ctx.control.is_done() {
                break;
            }
        }
        action.step(ctx).await?;
    }

    debug!(action = action.name(), "Action done");
    action.end(ctx).await
}
