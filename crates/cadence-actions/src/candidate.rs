//! Candidate selection over a lazy source.
//!
//! Each planning cycle pulls candidates until more than `min_candidates`
//! scored ones are held, then commits to the lowest score seen so far. Ties
//! go to the candidate seen first.

use crate::action::ActionContext;
use crate::error::{ActionError, ActionResult};
use crate::queue::CommandQueue;
use crate::queued::Planner;
use cadence_core::{BoxFuture, Command};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, info};

/// Pull-based candidate stream. `None` means the stream is exhausted.
pub trait CandidateSource<C>: Send {
    fn next_candidate(&mut self) -> BoxFuture<'_, ActionResult<Option<C>>>;
}

/// Builds the command committed for a winning candidate.
pub type CommandFactory<C> = Arc<dyn Fn(&C) -> Command + Send + Sync>;

/// Domain policy for a `CandidateActions` planner.
pub trait CandidatePolicy: Send {
    type Candidate: Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Create the candidate source. Called once, from `begin`.
    fn create_source<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, ActionResult<Box<dyn CandidateSource<Self::Candidate>>>>;

    /// Lower is better. `None` excludes the candidate.
    fn score<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
        candidate: &'a Self::Candidate,
    ) -> BoxFuture<'a, ActionResult<Option<f64>>>;

    /// Hook run at the start of every planning cycle.
    fn before_update<'a>(&'a mut self, _ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct Scored<C> {
    score: f64,
    seq: u64,
    candidate: C,
}

impl<C> PartialEq for Scored<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C> Eq for Scored<C> {}

impl<C> PartialOrd for Scored<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Scored<C> {
    // Reversed: BinaryHeap is a max-heap and the lowest score must surface.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Planner that commits to the best-scoring candidate each cycle.
pub struct CandidateActions<P: CandidatePolicy> {
    policy: P,
    min_candidates: usize,
    command_for: CommandFactory<P::Candidate>,
    source: Option<Box<dyn CandidateSource<P::Candidate>>>,
    heap: BinaryHeap<Scored<P::Candidate>>,
    seen: u64,
}

impl<P: CandidatePolicy> CandidateActions<P> {
    pub fn new(policy: P, min_candidates: usize, command_for: CommandFactory<P::Candidate>) -> Self {
        Self {
            policy,
            min_candidates,
            command_for,
            source: None,
            heap: BinaryHeap::new(),
            seen: 0,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Scored candidates currently held.
    pub fn held(&self) -> usize {
        self.heap.len()
    }

    async fn plan(&mut self, ctx: &ActionContext, queue: &mut CommandQueue) -> ActionResult<()> {
        self.policy.before_update(ctx).await?;

        let Some(source) = self.source.as_mut() else {
            return Err(ActionError::Failed(format!(
                "{}: candidate source used before begin",
                self.policy.name()
            )));
        };

        while self.heap.len() <= self.min_candidates {
            let Some(candidate) = source.next_candidate().await? else {
                debug!(
                    action = self.policy.name(),
                    held = self.heap.len(),
                    "Candidate source exhausted"
                );
                break;
            };
            if let Some(score) = self.policy.score(ctx, &candidate).await? {
                self.heap.push(Scored {
                    score,
                    seq: self.seen,
                    candidate,
                });
                self.seen += 1;
            }
        }

        match self.heap.pop() {
            Some(best) => {
                let command = (self.command_for)(&best.candidate);
                debug!(action = self.policy.name(), score = best.score, command = %command, "Committed");
                queue.add(command);
            }
            None => {
                info!(action = self.policy.name(), "No candidates left, finishing");
                ctx.control.cancel();
            }
        }
        Ok(())
    }
}

impl<P: CandidatePolicy> Planner for CandidateActions<P> {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn begin<'a>(&'a mut self, ctx: &'a ActionContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            self.source = Some(self.policy.create_source(ctx).await?);
            Ok(())
        })
    }

    fn update<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
        queue: &'a mut CommandQueue,
    ) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(self.plan(ctx, queue))
    }
}
