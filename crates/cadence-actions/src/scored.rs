//! Candidate policy over a feed scored by one numeric field.
//!
//! For example, liking the least-liked posts of a timeline: read
//! `timeline`, score by `like_count`, commit `like <id>`.

use crate::action::ActionContext;
use crate::candidate::{CandidatePolicy, CandidateSource, CommandFactory};
use crate::error::ActionResult;
use crate::feed::{FeedCursor, FeedReader, PacingConfig};
use cadence_core::{BoxFuture, Command};
use serde_json::Value;
use std::sync::Arc;

pub struct ScoredFeed {
    name: String,
    feed_endpoint: String,
    feed_args: Vec<Value>,
    item_keys: Vec<String>,
    score_field: String,
    pacing: PacingConfig,
}

impl ScoredFeed {
    pub fn new(
        name: impl Into<String>,
        feed_endpoint: impl Into<String>,
        feed_args: Vec<Value>,
        score_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            feed_endpoint: feed_endpoint.into(),
            feed_args,
            item_keys: vec!["items".to_string()],
            score_field: score_field.into(),
            pacing: PacingConfig::default(),
        }
    }

    pub fn with_item_keys(mut self, keys: Vec<String>) -> Self {
        self.item_keys = keys;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Commit `endpoint <item id>` for the winning item.
    pub fn command_on_id(endpoint: impl Into<String>) -> CommandFactory<Value> {
        let endpoint = endpoint.into();
        Arc::new(move |item: &Value| {
            Command::new(endpoint.clone(), vec![item.get("id").cloned().unwrap_or(Value::Null)])
        })
    }
}

impl CandidatePolicy for ScoredFeed {
    type Candidate = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn create_source<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, ActionResult<Box<dyn CandidateSource<Value>>>> {
        let keys: Vec<&str> = self.item_keys.iter().map(String::as_str).collect();
        let cursor = FeedCursor::new(ctx.api.clone(), self.feed_endpoint.clone(), self.feed_args.clone())
            .with_item_keys(&keys)
            .with_pacing(self.pacing);
        Box::pin(async move { Ok(Box::new(FeedReader::new(cursor)) as Box<dyn CandidateSource<Value>>) })
    }

    /// Items without a numeric score field are skipped.
    fn score<'a>(
        &'a mut self,
        _ctx: &'a ActionContext,
        candidate: &'a Value,
    ) -> BoxFuture<'a, ActionResult<Option<f64>>> {
        let score = candidate.get(&self.score_field).and_then(Value::as_f64);
        Box::pin(async move { Ok(score) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionControl;
    use crate::candidate::CandidateActions;
    use crate::queue::CommandQueue;
    use crate::queued::Planner;
    use cadence_core::MockApiClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_least_liked_post_wins() {
        let api = Arc::new(MockApiClient::new());
        api.push_payload(
            "timeline",
            json!({"items": [
                {"id": "p1", "like_count": 40},
                {"id": "p2", "like_count": 3},
                {"id": "ad"},
                {"id": "p3", "like_count": 12},
            ]}),
        );
        let ctx = ActionContext::new(api.clone(), ActionControl::new());
        let policy = ScoredFeed::new("like_least_liked", "timeline", vec![], "like_count");
        let mut planner = CandidateActions::new(policy, 2, ScoredFeed::command_on_id("like"));
        let mut queue = CommandQueue::new();

        planner.begin(&ctx).await.unwrap();
        planner.update(&ctx, &mut queue).await.unwrap();

        assert_eq!(queue.pop(), Some(Command::with_arg("like", "p2")));
    }
}
