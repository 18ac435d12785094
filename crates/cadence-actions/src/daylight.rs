//! Daylight gating: only step during waking hours.

use crate::action::ActionControl;
use chrono::Timelike;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// How often the hour is re-checked while outside the window.
const DAYLIGHT_POLL: Duration = Duration::from_secs(1);

/// Source of the current wall-clock hour.
pub trait WallClock: Send + Sync {
    /// Hour of day, 0..=23.
    fn hour(&self) -> u32;
}

/// Local time via chrono.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// Settable clock for tests and dry runs.
#[derive(Debug, Default)]
pub struct FixedClock {
    hour: AtomicU32,
}

impl FixedClock {
    pub fn new(hour: u32) -> Self {
        Self {
            hour: AtomicU32::new(hour),
        }
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.store(hour, Ordering::SeqCst);
    }
}

impl WallClock for FixedClock {
    fn hour(&self) -> u32 {
        self.hour.load(Ordering::SeqCst)
    }
}

fn default_day_begins_at() -> u32 {
    7
}

fn default_day_ends_at() -> u32 {
    24
}

/// Hours during which an action may step, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaylightWindow {
    #[serde(default = "default_day_begins_at")]
    pub day_begins_at: u32,
    #[serde(default = "default_day_ends_at")]
    pub day_ends_at: u32,
    /// Upper bound of the random extra delay before each step.
    #[serde(default)]
    pub random_interval_minutes: u32,
}

impl Default for DaylightWindow {
    fn default() -> Self {
        Self {
            day_begins_at: default_day_begins_at(),
            day_ends_at: default_day_ends_at(),
            random_interval_minutes: 0,
        }
    }
}

impl DaylightWindow {
    pub fn contains(&self, hour: u32) -> bool {
        (self.day_begins_at..=self.day_ends_at).contains(&hour)
    }

    /// Block until the clock is inside the window, then sleep a random
    /// extra delay of up to `random_interval_minutes`.
    ///
    /// Returns early if the action is cancelled while waiting.
    pub async fn wait(&self, clock: &dyn WallClock, control: &ActionControl) {
        while !self.contains(clock.hour()) {
            if control.is_done() {
                return;
            }
            tokio::time::sleep(DAYLIGHT_POLL).await;
        }

        if self.random_interval_minutes > 0 {
            let max = Duration::from_secs(u64::from(self.random_interval_minutes) * 60);
            let extra = max.mul_f64(rand::thread_rng().gen::<f64>());
            tokio::time::sleep(extra).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_window_is_inclusive() {
        let window = DaylightWindow::default();
        assert!(!window.contains(6));
        assert!(window.contains(7));
        assert!(window.contains(23));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let window: DaylightWindow = serde_json::from_str(r#"{"day_begins_at": 9}"#).unwrap();
        assert_eq!(window.day_begins_at, 9);
        assert_eq!(window.day_ends_at, 24);
        assert_eq!(window.random_interval_minutes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inside_window_without_jitter_does_not_wait() {
        let clock = FixedClock::new(12);
        let start = Instant::now();

        DaylightWindow::default()
            .wait(&clock, &ActionControl::new())
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_morning() {
        let clock = Arc::new(FixedClock::new(3));
        let waker = {
            let clock = clock.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                clock.set_hour(7);
            })
        };

        let start = Instant::now();
        DaylightWindow::default()
            .wait(clock.as_ref(), &ActionControl::new())
            .await;

        assert!(start.elapsed() >= Duration::from_secs(30));
        waker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_is_bounded() {
        let window = DaylightWindow {
            random_interval_minutes: 2,
            ..DaylightWindow::default()
        };
        let start = Instant::now();

        window.wait(&FixedClock::new(10), &ActionControl::new()).await;

        assert!(start.elapsed() <= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_ends_night_wait() {
        let control = ActionControl::new();
        control.cancel();

        DaylightWindow::default()
            .wait(&FixedClock::new(2), &control)
            .await;
    }
}
