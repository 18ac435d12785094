//! Candidate pipeline integration tests.
//!
//! Runs a feed-backed candidate policy through the queued pacer, first over
//! a scripted API client and then over a real session with a mock transport.

use cadence_actions::{
    run_action, ActionContext, ActionControl, ActionResult, CandidateActions, CandidatePolicy,
    CandidateSource, FeedCursor, FeedReader, QueuedActions,
};
use cadence_core::{BoxFuture, Command, DynApiClient, MockApiClient};
use cadence_session::{
    Credentials, EndpointSpec, HttpResponse, MockTransport, Session, SessionApiClient,
    SessionConfig,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Prefers users who follow many and are followed by few.
struct FollowBackLikelihood;

impl CandidatePolicy for FollowBackLikelihood {
    type Candidate = Value;

    fn name(&self) -> &str {
        "follow_back"
    }

    fn create_source<'a>(
        &'a mut self,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, ActionResult<Box<dyn CandidateSource<Value>>>> {
        let api: DynApiClient = ctx.api.clone();
        Box::pin(async move {
            let cursor = FeedCursor::new(api, "followers", vec![]).with_item_keys(&["users"]);
            Ok(Box::new(FeedReader::new(cursor)) as Box<dyn CandidateSource<Value>>)
        })
    }

    fn score<'a>(
        &'a mut self,
        _ctx: &'a ActionContext,
        candidate: &'a Value,
    ) -> BoxFuture<'a, ActionResult<Option<f64>>> {
        Box::pin(async move {
            let followers = candidate["followers"].as_f64();
            let following = candidate["following"].as_f64().filter(|f| *f > 0.0);
            Ok(followers.zip(following).map(|(a, b)| a / b))
        })
    }
}

fn follow_command() -> Arc<dyn Fn(&Value) -> Command + Send + Sync> {
    Arc::new(|user: &Value| Command::new("follow", vec![user["id"].clone()]))
}

fn users_page() -> Value {
    json!({
        "status": "ok",
        "users": [
            {"id": 1, "followers": 500, "following": 100},
            {"id": 2, "followers": 10, "following": 1000},
            {"id": 3, "followers": 80, "following": 0},
            {"id": 4, "followers": 900, "following": 90},
        ],
        "more_available": false,
    })
}

#[tokio::test(start_paused = true)]
async fn test_best_candidate_is_followed_within_interval() {
    let api = Arc::new(MockApiClient::new());
    api.push_payload("followers", users_page());
    let ctx = ActionContext::new(api.clone(), ActionControl::new());

    let planner = CandidateActions::new(FollowBackLikelihood, 2, follow_command());
    let mut action = QueuedActions::new(planner, 1, Duration::from_secs(3600));

    let control = ctx.control.clone();
    let handle = tokio::spawn(async move {
        run_action(&mut action, &ctx).await?;
        Ok::<_, cadence_actions::ActionError>(action)
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    control.cancel();
    let action = handle.await.unwrap().unwrap();

    // User 3 is unscored; of 1, 2 and 4 the lowest ratio (user 2) wins
    let follows = api.calls_to("follow");
    assert_eq!(follows.len(), 1);
    assert_eq!(follows[0].args, vec![json!(2)]);
    assert!(action.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_over_session_survives_flaky_service() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failures(2, 502);
    transport.push(Ok(HttpResponse::ok_json(&users_page())));
    let config = SessionConfig {
        base_url: "https://api.test".to_string(),
        rate_limits: Vec::new(),
        ..SessionConfig::default()
    };
    let session = Arc::new(
        Session::new(config, transport.clone(), Credentials::new("usr", "pwd").unwrap()).unwrap(),
    );
    let endpoints = HashMap::from([
        ("followers".to_string(), EndpointSpec::get("friendships/followers/")),
        ("follow".to_string(), EndpointSpec::post("friendships/create/{}/")),
    ]);
    let api: DynApiClient = Arc::new(SessionApiClient::new(session.clone(), endpoints));
    let ctx = ActionContext::new(api, ActionControl::new());

    let planner = CandidateActions::new(FollowBackLikelihood, 2, follow_command());
    let mut action = QueuedActions::new(planner, 1, Duration::from_secs(600));

    let control = ctx.control.clone();
    let start = Instant::now();
    let handle = tokio::spawn(async move { run_action(&mut action, &ctx).await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    control.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(600));
    let paths = transport.sent_paths();
    assert_eq!(
        paths,
        vec![
            "friendships/followers/",
            "friendships/followers/",
            "friendships/followers/",
            "friendships/create/2/",
        ]
    );
    assert_eq!(session.circuit_state().consecutive_failures, 0);
}
