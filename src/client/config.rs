//! Configuration structures consumed by the client lifecycle.
//!
//! [`AnalyticsBuilder`](crate::AnalyticsBuilder) validates user input and
//! resolves it into a [`ClientConfig`] before the engine threads start.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Default number of messages that triggers an immediate flush.
pub const DEFAULT_FLUSH_QUEUE_SIZE: usize = 250;
/// Default period of the flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
/// Shortest flush interval accepted by the builder.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Default bounded capacity of the message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default number of delivery threads.
pub const DEFAULT_DELIVERY_WORKERS: usize = 1;
/// Default number of formed batches that may wait for a delivery thread.
pub const DEFAULT_MAX_PENDING_BATCHES: usize = 16;
/// Default bound on how long `shutdown` waits for in-flight deliveries.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default bound on how long `flush` waits for the dispatcher.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default prefix for engine thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "femtoanalytics";

/// Determines how `enqueue` reacts when the queue is full.
///
/// Both policies reject the new message; queued messages are never evicted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Reject immediately with `QueueFull`.
    #[default]
    Drop,
    /// Wait up to the given duration for space, then reject.
    Timeout(Duration),
}

/// Resolved engine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Batch size that triggers an immediate flush; also the batch size cap.
    pub flush_queue_size: usize,
    /// Period of the flush timer.
    pub flush_interval: Duration,
    /// Bounded capacity of the message queue.
    pub queue_capacity: usize,
    /// Policy to apply when the queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Number of delivery threads.
    pub delivery_workers: usize,
    /// Formed batches allowed to wait for a free delivery thread.
    pub max_pending_batches: usize,
    /// Upper bound on the shutdown drain; `None` waits indefinitely.
    pub shutdown_timeout: Option<Duration>,
    /// Upper bound on waiting for a flush acknowledgement.
    pub flush_timeout: Duration,
    /// Prefix for the dispatcher and delivery thread names.
    pub thread_name_prefix: String,
    /// Interval between rate-limited queue-full warnings.
    pub warn_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            flush_queue_size: DEFAULT_FLUSH_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            delivery_workers: DEFAULT_DELIVERY_WORKERS,
            max_pending_batches: DEFAULT_MAX_PENDING_BATCHES,
            shutdown_timeout: Some(DEFAULT_SHUTDOWN_TIMEOUT),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}
