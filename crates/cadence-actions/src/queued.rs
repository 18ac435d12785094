//! Queued actions: plan commands, then drain them at a capped rate.
//!
//! Each step runs one planning cycle (`Planner::update`), then spreads the
//! time left in the interval over `per_interval` randomized slots and
//! executes at most one queued command per slot. The step always lasts at
//! least `interval`, so no more than `per_interval` commands run in any
//! interval even if planning and execution are instant.

use crate::action::{Action, ActionContext};
use crate::daylight::DaylightWindow;
use crate::error::ActionResult;
use crate::pacing::random_intervals;
use crate::queue::CommandQueue;
use cadence_core::{BoxFuture, Command};
use cadence_telemetry::Metrics;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Decides what a queued action should do next.
pub trait Planner: Send {
    fn name(&self) -> &str;

    fn begin<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// One planning cycle: add zero or more commands to `queue`.
    fn update<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
        queue: &'a mut CommandQueue,
    ) -> BoxFuture<'a, ActionResult<()>>;

    fn end<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// An action that paces the commands its planner queues.
pub struct QueuedActions<P> {
    name: String,
    planner: P,
    queue: CommandQueue,
    per_interval: u32,
    interval: Duration,
    daylight: Option<DaylightWindow>,
}

impl<P: Planner> QueuedActions<P> {
    /// Run at most `per_interval` commands every `interval`.
    pub fn new(planner: P, per_interval: u32, interval: Duration) -> Self {
        Self {
            name: planner.name().to_string(),
            planner,
            queue: CommandQueue::new(),
            per_interval: per_interval.max(1),
            interval,
            daylight: None,
        }
    }

    /// `per_hour` commands per hour.
    pub fn per_hour(planner: P, per_hour: u32) -> Self {
        Self::new(planner, per_hour, Duration::from_secs(3600))
    }

    pub fn only_during(mut self, window: DaylightWindow) -> Self {
        self.daylight = Some(window);
        self
    }

    /// Enqueue a command directly.
    pub fn add(&mut self, command: Command) -> bool {
        self.queue.add(command)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn per_interval(&self) -> u32 {
        self.per_interval
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn paced_step(&mut self, ctx: &ActionContext) -> ActionResult<()> {
        let step_start = Instant::now();

        self.planner.update(ctx, &mut self.queue).await?;
        let planned_at = Instant::now();
        let time_left = self.interval.saturating_sub(planned_at - step_start);
        debug!(
            action = %self.name,
            queued = self.queue.len(),
            time_left_ms = time_left.as_millis() as u64,
            "Planned"
        );

        // Deadlines accumulate from one base so timer rounding never drifts.
        let mut deadline = planned_at;
        for slot in random_intervals(self.per_interval, time_left) {
            deadline += slot;

            match self.queue.pop() {
                Some(command) => execute_command(&self.name, ctx, &command).await,
                None => debug!(action = %self.name, "Queue empty, skipping slot"),
            }

            tokio::time::sleep_until(deadline).await;
        }

        tokio::time::sleep_until(step_start + self.interval).await;
        Ok(())
    }
}

/// Failed commands are logged and dropped.
async fn execute_command(name: &str, ctx: &ActionContext, command: &Command) {
    match ctx.api.execute(command).await {
        Ok(response) if response.success => {
            Metrics::command_executed(name);
            info!(action = name, command = %command, "Executed");
        }
        Ok(response) => {
            warn!(action = name, command = %command, payload = %response.payload, "Command rejected");
        }
        Err(e) => {
            warn!(action = name, command = %command, error = %e, "Command failed");
        }
    }
}

impl<P: Planner> Action for QueuedActions<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn daylight(&self) -> Option<DaylightWindow> {
        self.daylight
    }

    fn begin<'a>(&'a mut self, ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        self.planner.begin(ctx)
    }

    fn step<'a>(&'a mut self, ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(self.paced_step(ctx))
    }

    fn end<'a>(&'a mut self, ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        self.planner.end(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{run_action, ActionControl};
    use crate::error::ActionError;
    use cadence_core::{CoreError, MockApiClient};
    use std::sync::Arc;

    /// Queues a fresh numbered command per cycle after an optional delay.
    struct Numbered {
        next: u32,
        per_cycle: u32,
        update_takes: Duration,
        cycles: u32,
        stop_after: u32,
    }

    impl Numbered {
        fn new(per_cycle: u32) -> Self {
            Self {
                next: 0,
                per_cycle,
                update_takes: Duration::ZERO,
                cycles: 0,
                stop_after: 1,
            }
        }
    }

    impl Planner for Numbered {
        fn name(&self) -> &str {
            "numbered"
        }

        fn update<'a>(
            &'a mut self,
            ctx: &'a ActionContext,
            queue: &'a mut CommandQueue,
        ) -> BoxFuture<'a, ActionResult<()>> {
            Box::pin(async move {
                tokio::time::sleep(self.update_takes).await;
                for _ in 0..self.per_cycle {
                    queue.add(Command::with_arg("like", self.next));
                    self.next += 1;
                }
                self.cycles += 1;
                if self.cycles >= self.stop_after {
                    ctx.control.cancel();
                }
                Ok(())
            })
        }
    }

    fn context(api: Arc<MockApiClient>) -> ActionContext {
        ActionContext::new(api, ActionControl::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_time_is_split_into_slots() {
        let api = Arc::new(MockApiClient::new());
        let ctx = context(api.clone());
        let mut planner = Numbered::new(5);
        planner.update_takes = Duration::from_secs(2);
        let mut action = QueuedActions::new(planner, 5, Duration::from_secs(10));

        let start = Instant::now();
        run_action(&mut action, &ctx).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        let args: Vec<_> = api.calls().into_iter().map(|c| c.args[0].clone()).collect();
        assert_eq!(args, (0..5).map(serde_json::Value::from).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_cap_with_instant_work() {
        let api = Arc::new(MockApiClient::new());
        let ctx = context(api.clone());
        let mut planner = Numbered::new(20);
        planner.stop_after = 3;
        let mut action = QueuedActions::new(planner, 4, Duration::from_secs(60));

        let start = Instant::now();
        run_action(&mut action, &ctx).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(180));
        assert_eq!(api.call_count(), 12);
        // Leftovers stay queued, bounded by capacity
        assert_eq!(action.queue().len(), 48);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_skips_slots() {
        let api = Arc::new(MockApiClient::new());
        let ctx = context(api.clone());
        let mut action = QueuedActions::new(Numbered::new(1), 3, Duration::from_secs(30));

        let start = Instant::now();
        run_action(&mut action, &ctx).await.unwrap();

        assert_eq!(api.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_do_not_drift_across_cycles() {
        let api = Arc::new(MockApiClient::new());
        let ctx = context(api.clone());
        let mut planner = Numbered::new(7);
        planner.update_takes = Duration::from_millis(1300);
        planner.stop_after = 4;
        let mut action = QueuedActions::new(planner, 7, Duration::from_secs(10));

        let start = Instant::now();
        run_action(&mut action, &ctx).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(40));
        assert_eq!(api.call_count(), 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executed_commands_are_counted_per_action() {
        use cadence_telemetry::metrics::COMMANDS_TOTAL;

        let before = COMMANDS_TOTAL.with_label_values(&["numbered"]).get();
        let ctx = context(Arc::new(MockApiClient::new()));
        let mut action = QueuedActions::new(Numbered::new(3), 3, Duration::from_secs(3));

        run_action(&mut action, &ctx).await.unwrap();

        assert!(COMMANDS_TOTAL.with_label_values(&["numbered"]).get() - before >= 3.0);
        assert_eq!(COMMANDS_TOTAL.with_label_values(&["like"]).get(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_does_not_stop_draining() {
        let api = Arc::new(MockApiClient::new());
        api.push_response("like", Err(CoreError::Request("boom".into())));
        let ctx = context(api.clone());
        let mut action = QueuedActions::new(Numbered::new(3), 3, Duration::from_secs(3));

        run_action(&mut action, &ctx).await.unwrap();

        assert_eq!(api.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_planner_error_ends_run() {
        struct Broken;
        impl Planner for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn update<'a>(
                &'a mut self,
                _ctx: &'a ActionContext,
                _queue: &'a mut CommandQueue,
            ) -> BoxFuture<'a, ActionResult<()>> {
                Box::pin(async { Err(ActionError::Failed("no plan".into())) })
            }
        }

        let ctx = context(Arc::new(MockApiClient::new()));
        let mut action = QueuedActions::new(Broken, 1, Duration::from_secs(1));

        assert!(run_action(&mut action, &ctx).await.is_err());
        assert!(!ctx.control.is_done());
    }

    #[test]
    fn test_direct_add_dedups() {
        let mut action = QueuedActions::per_hour(Numbered::new(0), 30);
        assert!(action.add(Command::with_arg("follow", 1)));
        assert!(!action.add(Command::with_arg("follow", 1)));
        assert_eq!(action.interval(), Duration::from_secs(3600));
        assert_eq!(action.per_interval(), 30);
    }
}
