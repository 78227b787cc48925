//! Periodic flush signal for the dispatcher.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, tick};

/// Fixed-rate ticker. Size-triggered flushes do not reset it, so a partial
/// batch waits at most one interval after its first message arrives.
pub(crate) struct FlushTimer {
    interval: Duration,
    ticks: Receiver<Instant>,
}

impl FlushTimer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticks: tick(interval),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Channel that yields once per interval, for use in `select!`.
    pub(crate) fn ticks(&self) -> &Receiver<Instant> {
        &self.ticks
    }
}
