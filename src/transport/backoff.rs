//! Exponential backoff state machine used by [`RetryTransport`](super::RetryTransport).

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Default base delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Default absolute deadline for retrying a single batch.
pub const DEFAULT_BACKOFF_DEADLINE: Duration = Duration::from_secs(60);

/// Exponential backoff policy for retried deliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            deadline: DEFAULT_BACKOFF_DEADLINE,
        }
    }
}

/// Tracks retry attempts for one batch and produces jittered delays.
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
    failure_since: Option<Instant>,
    rng: StdRng,
}

impl BackoffState {
    /// Create a new state machine from the supplied policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base,
            failure_since: None,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Calculate the next jittered sleep duration following a failure.
    ///
    /// Returns `None` once the deadline measured from the first failure has
    /// passed.
    pub fn next_sleep(&mut self, now: Instant) -> Option<Duration> {
        let start = *self.failure_since.get_or_insert(now);

        if now.duration_since(start) >= self.policy.deadline {
            return None;
        }

        if now != start {
            self.current = self.current.saturating_mul(2).min(self.policy.cap);
        }

        const MIN_SLEEP_MS: u64 = 10;

        let max_ms = self.current.as_millis().min(u128::from(u64::MAX)) as u64;
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };
        let remaining = self.policy.deadline - now.duration_since(start);
        Some(Duration::from_millis(sleep_ms).min(remaining))
    }
}
