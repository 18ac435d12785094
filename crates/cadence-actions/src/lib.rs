//! Paced, cancellable actions for cadence.
//!
//! - `Action` / `run_action`: begin, step until done, end
//! - `QueuedActions`: bounded command queue drained at `per_interval` per `interval`
//! - `CandidateActions`: commits to the best-scoring candidate from a lazy source
//! - Feed cursors, periodic re-login and config-driven behaviors

pub mod action;
pub mod candidate;
pub mod daylight;
pub mod error;
pub mod feed;
pub mod pacing;
pub mod queue;
pub mod queued;
pub mod relogin;
pub mod repeat;
pub mod scored;

pub use action::{run_action, Action, ActionContext, ActionControl};
pub use candidate::{CandidateActions, CandidatePolicy, CandidateSource, CommandFactory};
pub use daylight::{DaylightWindow, FixedClock, LocalClock, WallClock};
pub use error::{ActionError, ActionResult};
pub use feed::{FeedCursor, FeedReader, PacingConfig};
pub use pacing::{random_intervals, RandomIntervals};
pub use queue::{CommandQueue, QUEUE_CAPACITY};
pub use queued::{Planner, QueuedActions};
pub use relogin::PeriodicRelogin;
pub use repeat::RepeatCommands;
pub use scored::ScoredFeed;
