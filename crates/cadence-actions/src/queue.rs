//! Bounded, de-duplicating command queue.

use cadence_core::Command;
use std::collections::VecDeque;

/// Default queue capacity.
pub const QUEUE_CAPACITY: usize = 100;

/// FIFO of pending commands.
///
/// Adding a command that is already pending is a no-op; adding past
/// capacity drops the oldest entry. Owned by a single action, so no locking.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    items: VecDeque<Command>,
    capacity: usize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Enqueue `command`.
    ///
    /// Returns `false` if an equal command was already pending.
    pub fn add(&mut self, command: Command) -> bool {
        if self.items.contains(&command) {
            return false;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(command);
        true
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.items.pop_front()
    }

    pub fn contains(&self, command: &Command) -> bool {
        self.items.contains(command)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
