//! Sliding-window rate limiting per endpoint class.
//!
//! Each bucket allows at most `max_calls` calls started within any trailing
//! `window`. A request path is matched against the buckets in order and the
//! first matching pattern governs; a path no pattern matches is not throttled.

use crate::error::{SessionError, SessionResult};
use cadence_telemetry::Metrics;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Sliding-window rate limiter.
pub struct RateLimiter {
    /// Maximum calls per window.
    max_calls: u32,
    /// Window size.
    window: Duration,
    /// Start times of calls still inside the window.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `max_calls` - Maximum calls per window (clamped to at least 1)
    /// * `window` - Window length
    pub fn new(max_calls: u32, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_calls.min(4096) as usize)),
        }
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check if a call could start now.
    pub fn can_acquire(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window, Instant::now());
        timestamps.len() < self.max_calls as usize
    }

    /// Record a call start if the window has room.
    ///
    /// Returns how long to wait for the oldest call to expire otherwise.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window, now);

        if timestamps.len() < self.max_calls as usize {
            timestamps.push_back(now);
            return Ok(());
        }

        let oldest = timestamps.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Wait until a call may start, then record it.
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => return started.elapsed(),
                Err(wait) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        max_calls = self.max_calls,
                        "Rate limit reached, waiting for window"
                    );
                    // A zero wait still has to yield so the window can roll over.
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Get current call count in window.
    pub fn current_count(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window, Instant::now());
        timestamps.len() as u32
    }

    /// Get remaining capacity.
    pub fn remaining_capacity(&self) -> u32 {
        self.max_calls.saturating_sub(self.current_count())
    }

    /// Reset rate limiter state.
    pub fn reset(&self) {
        self.timestamps.lock().clear();
    }

    fn cleanup(timestamps: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            timestamps.pop_front();
        }
    }
}

/// Pattern-to-bucket rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRule {
    /// Regular expression searched for in the request path.
    pub pattern: String,
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(pattern: impl Into<String>, max_calls: u32, window: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            max_calls,
            window,
        }
    }

    /// Default buckets: login/logout, social writes, and a catch-all.
    pub fn defaults() -> Vec<Self> {
        let hour = Duration::from_secs(3600);
        vec![
            Self::new(r"accounts/(login|logout)", 100, hour),
            Self::new(r"(like|follow|comment)", 60, hour),
            Self::new(r".*", 5000, hour),
        ]
    }
}

struct Bucket {
    pattern: String,
    regex: Regex,
    limiter: RateLimiter,
}

/// Ordered set of pattern buckets.
pub struct RateLimits {
    buckets: Vec<Bucket>,
}

impl RateLimits {
    /// Compile rules in order. More specific patterns must come first.
    pub fn new(rules: &[RateLimitRule]) -> SessionResult<Self> {
        let mut buckets = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.max_calls == 0 {
                return Err(SessionError::InvalidLimit(rule.pattern.clone()));
            }
            let regex = Regex::new(&rule.pattern).map_err(|e| SessionError::InvalidPattern {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            })?;
            buckets.push(Bucket {
                pattern: rule.pattern.clone(),
                regex,
                limiter: RateLimiter::new(rule.max_calls, rule.window),
            });
        }
        Ok(Self { buckets })
    }

    /// Pattern of the bucket governing `path`.
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        self.find(path).map(|b| b.pattern.as_str())
    }

    /// Limiter governing `path`.
    pub fn limiter_for(&self, path: &str) -> Option<&RateLimiter> {
        self.find(path).map(|b| &b.limiter)
    }

    /// Wait until `path` may be requested, recording the call in its bucket.
    pub async fn wait(&self, path: &str) {
        let Some(bucket) = self.find(path) else {
            return;
        };

        let waited = bucket.limiter.acquire().await;
        if !waited.is_zero() {
            warn!(
                pattern = %bucket.pattern,
                waited_ms = waited.as_millis() as u64,
                "Request delayed by rate limit"
            );
            Metrics::rate_limit_wait(&bucket.pattern, waited.as_secs_f64() * 1000.0);
        }
    }

    fn find(&self, path: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.regex.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));

        assert!(limiter.can_acquire());
        assert_eq!(limiter.current_count(), 0);

        for _ in 0..5 {
            assert!(limiter.try_acquire().is_ok());
        }

        assert!(limiter.can_acquire());
        assert_eq!(limiter.current_count(), 5);
        assert_eq!(limiter.remaining_capacity(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_at_limit_reports_wait() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        limiter.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.try_acquire().unwrap();

        assert!(!limiter.can_acquire());
        let wait = limiter.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_until_oldest_expires() {
        let limiter = RateLimiter::new(3, Duration::from_secs(30));
        for _ in 0..3 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        let waited = limiter.acquire().await;

        assert_eq!(waited, Duration::from_secs(30));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(limiter.current_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_max_calls_in_any_window() {
        let window = Duration::from_secs(10);
        let limiter = RateLimiter::new(4, window);
        let mut starts = Vec::new();

        for _ in 0..12 {
            limiter.acquire().await;
            starts.push(Instant::now());
        }

        for (i, &start) in starts.iter().enumerate() {
            let in_window = starts[i..]
                .iter()
                .filter(|&&t| t.duration_since(start) < window)
                .count();
            assert!(in_window <= 4, "window starting at call {i} saw {in_window} calls");
        }
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.try_acquire().unwrap();
        assert!(!limiter.can_acquire());

        limiter.reset();
        assert!(limiter.can_acquire());
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let limits = RateLimits::new(&RateLimitRule::defaults()).unwrap();

        assert_eq!(
            limits.matching_pattern("accounts/login/"),
            Some(r"accounts/(login|logout)")
        );
        assert_eq!(
            limits.matching_pattern("friendships/create/12/follow"),
            Some("(like|follow|comment)")
        );
        assert_eq!(limits.matching_pattern("media/1/like/"), Some("(like|follow|comment)"));
        assert_eq!(limits.matching_pattern("feed/timeline"), Some(".*"));
    }

    #[test]
    fn test_unmatched_path_is_unthrottled() {
        let rules = vec![RateLimitRule::new("^media/", 1, Duration::from_secs(60))];
        let limits = RateLimits::new(&rules).unwrap();

        assert!(limits.limiter_for("feed/timeline").is_none());
        assert!(limits.limiter_for("media/1/like/").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_independent() {
        let rules = vec![
            RateLimitRule::new("^like", 1, Duration::from_secs(100)),
            RateLimitRule::new(".*", 10, Duration::from_secs(100)),
        ];
        let limits = RateLimits::new(&rules).unwrap();

        limits.wait("like/1").await;
        let start = Instant::now();
        limits.wait("feed/1").await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limits.wait("like/2").await;
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let bad_regex = vec![RateLimitRule::new("(unclosed", 1, Duration::from_secs(1))];
        assert!(matches!(
            RateLimits::new(&bad_regex),
            Err(SessionError::InvalidPattern { .. })
        ));

        let zero = vec![RateLimitRule::new(".*", 0, Duration::from_secs(1))];
        assert!(matches!(
            RateLimits::new(&zero),
            Err(SessionError::InvalidLimit(_))
        ));
    }
}
