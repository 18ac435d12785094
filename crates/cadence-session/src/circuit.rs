//! Failure escalation for the request engine.
//!
//! Three tiers: exponential backoff between retries, a long circuit break
//! once `requests_to_break` consecutive failures pile up, and a forced
//! re-authentication after `relog_after_breaks` consecutive breaks.

use std::time::Duration;

/// Tunables for the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay after the first failure since the last break.
    pub sleep_on_page: Duration,
    /// Backoff multiplier per further failure.
    pub exponential_sleep_increase: f64,
    /// Consecutive failures before each further failure is circuit-broken.
    pub requests_to_break: u32,
    /// Consecutive breaks before forcing re-authentication.
    pub relog_after_breaks: u32,
    /// Pause taken on every circuit break.
    pub sleep_on_break: Duration,
    /// Pause between logout and login when re-authenticating.
    pub relog_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            sleep_on_page: Duration::from_millis(500),
            exponential_sleep_increase: 2.0,
            requests_to_break: 10,
            relog_after_breaks: 5,
            sleep_on_break: Duration::from_secs(600),
            relog_wait: Duration::from_secs(60),
        }
    }
}

/// What the engine must do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Sleep, then retry.
    Backoff(Duration),
    /// Sleep the break pause; re-authenticate afterwards if `relogin` is set.
    Break { pause: Duration, relogin: bool },
}

/// Session-wide failure counters. Reset on any successful request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub consecutive_breaks: u32,
    /// Failures since the last break; the backoff exponent.
    pub attempts_since_last_break: u32,
}

impl CircuitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the next non-break failure would sleep.
    pub fn current_backoff(&self, policy: &RetryPolicy) -> Duration {
        let factor = policy
            .exponential_sleep_increase
            .max(1.0)
            .powi(self.attempts_since_last_break.min(i32::MAX as u32) as i32);
        let secs = policy.sleep_on_page.as_secs_f64() * factor;
        let cap = policy.sleep_on_break.max(policy.sleep_on_page);
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(cap))
            .unwrap_or(cap)
    }

    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Count a failure and decide how to escalate.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Escalation {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures < policy.requests_to_break {
            let delay = self.current_backoff(policy);
            self.attempts_since_last_break += 1;
            return Escalation::Backoff(delay);
        }

        self.consecutive_breaks += 1;
        self.attempts_since_last_break = 0;

        let relogin = self.consecutive_breaks >= policy.relog_after_breaks;
        if relogin {
            self.consecutive_failures = 0;
            self.consecutive_breaks = 0;
        }

        Escalation::Break {
            pause: policy.sleep_on_break,
            relogin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            sleep_on_page: Duration::from_millis(500),
            exponential_sleep_increase: 2.0,
            requests_to_break: 10,
            relog_after_breaks: 5,
            sleep_on_break: Duration::from_secs(600),
            relog_wait: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_doubles_until_break() {
        let policy = policy();
        let mut state = CircuitState::new();

        let delays: Vec<_> = (0..9).map(|_| state.record_failure(&policy)).collect();

        assert_eq!(delays[0], Escalation::Backoff(Duration::from_millis(500)));
        assert_eq!(delays[1], Escalation::Backoff(Duration::from_millis(1000)));
        assert_eq!(delays[2], Escalation::Backoff(Duration::from_millis(2000)));
        assert_eq!(delays[8], Escalation::Backoff(Duration::from_millis(128_000)));
        assert_eq!(state.consecutive_failures, 9);
        assert_eq!(state.consecutive_breaks, 0);
    }

    #[test]
    fn test_break_after_exactly_requests_to_break_failures() {
        let policy = policy();
        let mut state = CircuitState::new();

        for _ in 0..9 {
            assert!(matches!(state.record_failure(&policy), Escalation::Backoff(_)));
        }

        assert_eq!(
            state.record_failure(&policy),
            Escalation::Break {
                pause: Duration::from_secs(600),
                relogin: false
            }
        );
        assert_eq!(state.consecutive_breaks, 1);
        assert_eq!(state.attempts_since_last_break, 0);
        assert_eq!(state.current_backoff(&policy), Duration::from_millis(500));
    }

    #[test]
    fn test_relogin_after_five_breaks_resets_counters() {
        let policy = policy();
        let mut state = CircuitState::new();

        for _ in 0..9 {
            state.record_failure(&policy);
        }
        for expected_breaks in 1..5 {
            let escalation = state.record_failure(&policy);
            assert_eq!(
                escalation,
                Escalation::Break {
                    pause: policy.sleep_on_break,
                    relogin: false
                }
            );
            assert_eq!(state.consecutive_breaks, expected_breaks);
        }

        let escalation = state.record_failure(&policy);
        assert_eq!(
            escalation,
            Escalation::Break {
                pause: policy.sleep_on_break,
                relogin: true
            }
        );
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.consecutive_breaks, 0);
    }

    #[test]
    fn test_success_resets_everything() {
        let policy = policy();
        let mut state = CircuitState::new();
        for _ in 0..12 {
            state.record_failure(&policy);
        }

        state.record_success();

        assert_eq!(state, CircuitState::default());
    }

    #[test]
    fn test_backoff_capped_by_break_pause() {
        let policy = RetryPolicy {
            requests_to_break: 100,
            ..policy()
        };
        let mut state = CircuitState::new();
        state.attempts_since_last_break = 80;

        assert_eq!(state.current_backoff(&policy), policy.sleep_on_break);
    }
}
