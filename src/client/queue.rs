//! Bounded ingestion queue shared by producers and the dispatcher.
//!
//! Producers push through a single `crossbeam-channel` sender held behind a
//! read/write lock. Pushes take the read side, so they run concurrently;
//! [`MessageQueue::close`] takes the write side and drops the sender, which
//! guarantees that every message accepted before the close is visible to the
//! dispatcher's final drain and none can slip in afterwards.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use parking_lot::RwLock;

use super::config::OverflowPolicy;
use crate::error::AnalyticsError;
use crate::log_sink::{EventLog, emit};
use crate::message::Message;
use crate::rate_limited_warner::RateLimitedWarner;

/// A message plus the instant it was accepted.
#[derive(Debug)]
pub struct QueueEntry {
    pub message: Message,
    pub enqueued_at: Instant,
}

pub(crate) struct MessageQueue {
    tx: RwLock<Option<Sender<QueueEntry>>>,
    policy: OverflowPolicy,
    warner: RateLimitedWarner,
    log: Arc<dyn EventLog>,
}

impl MessageQueue {
    pub(crate) fn new(
        capacity: usize,
        policy: OverflowPolicy,
        warner: RateLimitedWarner,
        log: Arc<dyn EventLog>,
    ) -> (Self, Receiver<QueueEntry>) {
        let (tx, rx) = bounded(capacity);
        let queue = Self {
            tx: RwLock::new(Some(tx)),
            policy,
            warner,
            log,
        };
        (queue, rx)
    }

    /// Accept a message or report why it was rejected.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::QueueFull`] - no space within the overflow policy
    /// * [`AnalyticsError::ClientShutdown`] - the queue has been closed
    pub(crate) fn push(&self, message: Message) -> Result<(), AnalyticsError> {
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            return Err(AnalyticsError::ClientShutdown);
        };
        let entry = QueueEntry {
            message,
            enqueued_at: Instant::now(),
        };
        let full = match self.policy {
            OverflowPolicy::Drop => match tx.try_send(entry) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            },
            OverflowPolicy::Timeout(timeout) => match tx.send_timeout(entry, timeout) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(_)) => true,
                Err(SendTimeoutError::Disconnected(_)) => false,
            },
        };
        drop(guard);
        if !full {
            emit!(self.log, Error, "dispatcher gone; dropped message");
            return Err(AnalyticsError::ClientShutdown);
        }
        // Only overflow drops are counted, so the aggregated line names one cause.
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            emit!(self.log, Error, "queue full; dropped {count} messages");
        });
        Err(AnalyticsError::QueueFull)
    }

    /// Stop accepting messages. Idempotent.
    pub(crate) fn close(&self) {
        self.tx.write().take();
        self.warner.flush(|count| {
            emit!(self.log, Error, "queue full; dropped {count} messages since the last report");
        });
    }

    /// Messages currently waiting for the dispatcher.
    pub(crate) fn len(&self) -> usize {
        self.tx.read().as_ref().map_or(0, Sender::len)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::message::MessageBuilder;
    use crate::test_utils::CollectingLog;

    fn message(event: &str) -> Message {
        MessageBuilder::track(event)
            .user_id("u")
            .build()
            .expect("valid message")
    }

    fn queue(
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (MessageQueue, Receiver<QueueEntry>, CollectingLog) {
        let log = CollectingLog::new();
        let (queue, rx) = MessageQueue::new(
            capacity,
            policy,
            RateLimitedWarner::new(Duration::ZERO),
            Arc::new(log.clone()),
        );
        (queue, rx, log)
    }

    #[test]
    fn preserves_fifo_order() {
        let (queue, rx, _log) = queue(4, OverflowPolicy::Drop);
        for event in ["a", "b", "c"] {
            queue.push(message(event)).expect("space available");
        }
        assert_eq!(queue.len(), 3);
        let events: Vec<_> = rx
            .try_iter()
            .map(|entry| entry.message.kind().clone())
            .collect();
        assert_eq!(
            events,
            ["a", "b", "c"].map(|e| crate::message::MessageKind::Track { event: e.into() })
        );
    }

    #[rstest]
    #[case(OverflowPolicy::Drop)]
    #[case(OverflowPolicy::Timeout(Duration::from_millis(20)))]
    fn rejects_when_full(#[case] policy: OverflowPolicy) {
        let (queue, _rx, log) = queue(1, policy);
        queue.push(message("a")).expect("first fits");
        assert_eq!(queue.push(message("b")), Err(AnalyticsError::QueueFull));
        assert!(log.contains("queue full; dropped 1 messages"));
    }

    #[test]
    fn timeout_policy_waits_for_space() {
        let (queue, rx, _log) = queue(1, OverflowPolicy::Timeout(Duration::from_secs(2)));
        queue.push(message("a")).expect("first fits");
        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            rx.recv().expect("entry");
            rx
        });
        queue.push(message("b")).expect("space freed in time");
        let rx = consumer.join().expect("consumer");
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn dispatcher_loss_is_not_counted_as_overflow() {
        let log = CollectingLog::new();
        let (queue, rx) = MessageQueue::new(
            1,
            OverflowPolicy::Drop,
            RateLimitedWarner::new(Duration::from_secs(60)),
            Arc::new(log.clone()),
        );
        queue.push(message("a")).expect("first fits");
        assert_eq!(queue.push(message("b")), Err(AnalyticsError::QueueFull));
        assert!(log.contains("queue full; dropped 1 messages"));
        rx.try_recv().expect("queued entry");
        drop(rx);
        assert_eq!(queue.push(message("c")), Err(AnalyticsError::ClientShutdown));
        assert!(log.contains("dispatcher gone; dropped message"));

        queue.close();
        assert!(!log.contains("since the last report"));
    }

    #[test]
    fn closed_queue_reports_shutdown() {
        let (queue, rx, _log) = queue(4, OverflowPolicy::Drop);
        queue.push(message("a")).expect("open");
        queue.close();
        queue.close();
        assert_eq!(queue.push(message("b")), Err(AnalyticsError::ClientShutdown));
        assert_eq!(queue.len(), 0);
        assert_eq!(rx.try_iter().count(), 1);
        assert!(rx.recv().is_err());
    }
}
