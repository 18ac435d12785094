//! Paginated feeds as candidate sources.
//!
//! `FeedCursor` walks one pass of a paginated endpoint; `FeedReader` wraps a
//! cursor into an endless, de-duplicated stream that restarts the cursor
//! whenever a pass ends.

use crate::candidate::CandidateSource;
use crate::error::ActionResult;
use cadence_core::{BoxFuture, DynApiClient, SendOptions};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Attempts per page request before the error surfaces.
const PAGE_MAX_ATTEMPTS: u32 = 3;

/// Feed pacing, injected instead of global tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Minimum gap between two page fetches of one cursor.
    pub sleep_between_pages: Duration,
    /// Pause before re-reading a feed whose last pass yielded nothing new.
    pub sleep_between_reads: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            sleep_between_pages: Duration::from_millis(500),
            sleep_between_reads: Duration::from_secs(900),
        }
    }
}

/// One pass over a paginated endpoint.
///
/// Pages are objects holding item arrays under `item_keys`, a boolean
/// `more_available` flag and a `next_max_id` cursor.
pub struct FeedCursor {
    api: DynApiClient,
    endpoint: String,
    args: Vec<Value>,
    item_keys: Vec<String>,
    pacing: PacingConfig,
    buffer: VecDeque<Value>,
    next_max_id: Option<String>,
    more_available: bool,
    last_request: Option<Instant>,
    pages: u32,
}

impl FeedCursor {
    pub fn new(api: DynApiClient, endpoint: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            args,
            item_keys: vec!["items".to_string()],
            pacing: PacingConfig::default(),
            buffer: VecDeque::new(),
            next_max_id: None,
            more_available: true,
            last_request: None,
            pages: 0,
        }
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Keys whose arrays hold the page's items, read in order.
    pub fn with_item_keys(mut self, keys: &[&str]) -> Self {
        self.item_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// Start a new pass from the first page.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_max_id = None;
        self.more_available = true;
    }

    /// Next item of this pass, fetching pages as needed.
    pub async fn next_item(&mut self) -> ActionResult<Option<Value>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if !self.more_available {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> ActionResult<()> {
        if let Some(last) = self.last_request {
            tokio::time::sleep_until(last + self.pacing.sleep_between_pages).await;
        }
        self.last_request = Some(Instant::now());

        let mut options = SendOptions::with_max_attempts(PAGE_MAX_ATTEMPTS);
        if let Some(max_id) = &self.next_max_id {
            options = options.param("max_id", max_id.clone());
        }

        let response = self.api.send(&self.endpoint, &self.args, options).await?;
        self.pages += 1;

        if !response.success {
            warn!(endpoint = %self.endpoint, payload = %response.payload, "Feed page rejected");
            self.more_available = false;
            return Ok(());
        }

        let payload = response.payload;
        for key in &self.item_keys {
            if let Some(items) = payload.get(key).and_then(Value::as_array) {
                self.buffer.extend(items.iter().cloned());
            }
        }
        self.next_max_id = payload.get("next_max_id").and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        self.more_available = payload
            .get("more_available")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        debug!(
            endpoint = %self.endpoint,
            items = self.buffer.len(),
            more = self.more_available,
            "Fetched page"
        );
        Ok(())
    }
}

impl CandidateSource<Value> for FeedCursor {
    fn next_candidate(&mut self) -> BoxFuture<'_, ActionResult<Option<Value>>> {
        Box::pin(self.next_item())
    }
}

/// Endless, de-duplicated reader over a feed.
///
/// Never yields an item id twice. When a pass ends the cursor restarts,
/// after `sleep_between_reads` if that pass produced nothing new.
pub struct FeedReader {
    cursor: FeedCursor,
    id_key: String,
    seen: HashSet<String>,
    has_new_items: bool,
}

impl FeedReader {
    pub fn new(cursor: FeedCursor) -> Self {
        Self {
            cursor,
            id_key: "id".to_string(),
            seen: HashSet::new(),
            has_new_items: false,
        }
    }

    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub async fn next_item(&mut self) -> ActionResult<Value> {
        loop {
            match self.cursor.next_item().await? {
                Some(item) => {
                    let id = self.identity(&item);
                    if self.seen.insert(id) {
                        self.has_new_items = true;
                        return Ok(item);
                    }
                }
                None => {
                    if !self.has_new_items {
                        debug!(
                            endpoint = %self.cursor.endpoint,
                            sleep_secs = self.cursor.pacing.sleep_between_reads.as_secs(),
                            "Nothing new in feed, sleeping"
                        );
                        tokio::time::sleep(self.cursor.pacing.sleep_between_reads).await;
                    }
                    self.has_new_items = false;
                    self.cursor.reset();
                }
            }
        }
    }

    fn identity(&self, item: &Value) -> String {
        match item.get(&self.id_key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => item.to_string(),
        }
    }
}

impl CandidateSource<Value> for FeedReader {
    fn next_candidate(&mut self) -> BoxFuture<'_, ActionResult<Option<Value>>> {
        Box::pin(async move { self.next_item().await.map(Some) })
    }
}
