//! Randomized pacing helpers.

use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;

/// Split `total` into `n` randomized slots that sum to exactly `total`.
///
/// Each slot is `total / n` give or take half a slot, clamped so the running
/// sum never exceeds `total`; the last slot takes whatever remains.
pub fn random_intervals(n: u32, total: Duration) -> Vec<Duration> {
    if n == 0 {
        return Vec::new();
    }

    let total_nanos = total.as_nanos();
    let step = total_nanos / u128::from(n);
    let max_variation = step / 2;
    let mut rng = rand::thread_rng();
    let mut remaining = total_nanos;
    let mut slots = Vec::with_capacity(n as usize);

    for _ in 1..n {
        let low = step - max_variation;
        let high = step + max_variation;
        let slot = if high > low {
            rng.gen_range(low..=high)
        } else {
            step
        };
        let slot = slot.min(remaining);
        remaining -= slot;
        slots.push(nanos_to_duration(slot));
    }
    slots.push(nanos_to_duration(remaining));
    slots
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = (nanos / 1_000_000_000) as u64;
    let sub = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, sub)
}

/// Endless sequence of `random_intervals(n, period)` batches.
#[derive(Debug, Clone)]
pub struct RandomIntervals {
    n: u32,
    period: Duration,
    pending: VecDeque<Duration>,
}

impl RandomIntervals {
    pub fn new(n: u32, period: Duration) -> Self {
        Self {
            n: n.max(1),
            period,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for RandomIntervals {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.pending.is_empty() {
            self.pending.extend(random_intervals(self.n, self.period));
        }
        self.pending.pop_front()
    }
}
