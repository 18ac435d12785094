//! Config-driven planner that re-queues a fixed command list.

use crate::action::ActionContext;
use crate::error::ActionResult;
use crate::queue::CommandQueue;
use crate::queued::Planner;
use cadence_core::{BoxFuture, Command};

/// Queues every configured command each cycle.
///
/// Commands still pending from an earlier cycle are not queued twice.
#[derive(Debug, Clone)]
pub struct RepeatCommands {
    name: String,
    commands: Vec<Command>,
}

impl RepeatCommands {
    pub fn new(name: impl Into<String>, commands: Vec<Command>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl Planner for RepeatCommands {
    fn name(&self) -> &str {
        &self.name
    }

    fn update<'a>(
        &'a mut self,
        _ctx: &'a ActionContext,
        queue: &'a mut CommandQueue,
    ) -> BoxFuture<'a, ActionResult<()>> {
        for command in &self.commands {
            queue.add(command.clone());
        }
        Box::pin(async { Ok(()) })
    }
}
