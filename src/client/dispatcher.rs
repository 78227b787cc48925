//! Dispatcher thread: turns queued messages into batches.
//!
//! The loop waits on the queue, a command channel, and the flush timer using
//! `select!`. Entries accumulate until `flush_queue_size` is reached, at which
//! point a full batch is cut and submitted. Timer ticks submit whatever is
//! pending. A `Flush` command drains everything currently queued before
//! acknowledging. On shutdown (command or closed queue) the loop drains the
//! closed queue, submits the remainder, and drops its [`BatchSubmitter`] so
//! the delivery workers can finish and exit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select};

use super::executor::BatchSubmitter;
use super::queue::QueueEntry;
use super::timer::FlushTimer;
use crate::batch::Batch;
use crate::log_sink::{EventLog, emit};

/// Commands sent from the client to the dispatcher.
#[derive(Debug)]
pub(crate) enum DispatchCommand {
    /// Drain and submit everything queued, then acknowledge.
    Flush(Sender<()>),
    /// Drain the closed queue and stop.
    Shutdown,
}

/// What caused a batch to be cut.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FlushReason {
    Size,
    Interval,
    Requested,
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size threshold",
            Self::Interval => "flush interval",
            Self::Requested => "flush requested",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Collects queue entries into size-bounded batches in arrival order.
pub(crate) struct BatchAccumulator {
    max_size: usize,
    pending: Vec<QueueEntry>,
    next_sequence: u64,
}

impl BatchAccumulator {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            max_size,
            pending: Vec::with_capacity(max_size),
            next_sequence: 0,
        }
    }

    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.pending.push(entry);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.pending.len() >= self.max_size
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// How long the oldest pending entry has waited.
    pub(crate) fn oldest_wait(&self) -> Option<Duration> {
        self.pending.first().map(|entry| entry.enqueued_at.elapsed())
    }

    /// Cut a batch of at most `max_size` entries. `None` when empty.
    pub(crate) fn take(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        let count = self.pending.len().min(self.max_size);
        let messages = self
            .pending
            .drain(..count)
            .map(|entry| entry.message)
            .collect();
        let batch = Batch::new(self.next_sequence, messages);
        self.next_sequence += 1;
        Some(batch)
    }
}

/// Batch-forming half of the dispatcher, separate from the receivers so the
/// `select!` loop can borrow both.
struct BatchFormer {
    accumulator: BatchAccumulator,
    submitter: BatchSubmitter,
    log: Arc<dyn EventLog>,
}

impl BatchFormer {
    fn accept(&mut self, entry: QueueEntry) {
        self.accumulator.push(entry);
        if self.accumulator.is_full() {
            self.ship(FlushReason::Size);
        }
    }

    fn ship(&mut self, reason: FlushReason) {
        while self.accumulator.len() > 0 {
            let waited = self.accumulator.oldest_wait().unwrap_or_default();
            let Some(batch) = self.accumulator.take() else {
                break;
            };
            emit!(
                self.log,
                Debug,
                "formed batch #{} with {} messages ({reason}, oldest waited {waited:?})",
                batch.sequence(),
                batch.len()
            );
            self.submitter.submit(batch);
        }
    }

    /// Pull at most `limit` queued entries, then submit the remainder.
    fn drain(&mut self, queue: &Receiver<QueueEntry>, limit: usize, reason: FlushReason) {
        for entry in queue.try_iter().take(limit) {
            self.accept(entry);
        }
        self.ship(reason);
    }
}

pub(crate) struct Dispatcher {
    queue: Receiver<QueueEntry>,
    commands: Receiver<DispatchCommand>,
    timer: FlushTimer,
    former: BatchFormer,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: Receiver<QueueEntry>,
        commands: Receiver<DispatchCommand>,
        flush_queue_size: usize,
        flush_interval: Duration,
        submitter: BatchSubmitter,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            queue,
            commands,
            timer: FlushTimer::new(flush_interval),
            former: BatchFormer {
                accumulator: BatchAccumulator::new(flush_queue_size),
                submitter,
                log,
            },
        }
    }

    pub(crate) fn run(self) {
        let Self {
            queue,
            commands,
            timer,
            mut former,
        } = self;
        emit!(
            former.log,
            Debug,
            "dispatcher started (flush interval {:?})",
            timer.interval()
        );
        loop {
            select! {
                recv(queue) -> entry => match entry {
                    Ok(entry) => former.accept(entry),
                    Err(_) => break,
                },
                recv(commands) -> command => match command {
                    Ok(DispatchCommand::Flush(ack)) => {
                        // Entries arriving after the request wait for the next trigger.
                        let queued = queue.len();
                        former.drain(&queue, queued, FlushReason::Requested);
                        let _ = ack.send(());
                    }
                    Ok(DispatchCommand::Shutdown) | Err(_) => break,
                },
                recv(timer.ticks()) -> _ => former.ship(FlushReason::Interval),
            }
        }
        // The queue is closed by now, so this terminates.
        former.drain(&queue, usize::MAX, FlushReason::Shutdown);
        emit!(former.log, Debug, "dispatcher stopped");
    }
}
