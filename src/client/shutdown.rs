//! Graceful stop of the engine threads.
//!
//! The client closes the queue and signals the dispatcher; the coordinator
//! then waits for the dispatcher's final flush and for the delivery workers
//! to finish every submitted batch, bounded by the optional shutdown timeout.
//! Threads that finished are joined; threads still running at the deadline
//! are detached and reported through [`ShutdownReport`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::executor::ThreadFactory;
use crate::log_sink::{EventLog, emit};

/// Outcome of [`AnalyticsClient::shutdown`](crate::AnalyticsClient::shutdown).
///
/// A report that is not [complete](Self::is_complete) means the timeout
/// expired first: batches counted in `batches_in_flight` may never be sent,
/// and if the dispatcher had not stopped, queued messages may be lost too.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The dispatcher finished its final flush.
    pub dispatcher_stopped: bool,
    /// Every delivery worker exited.
    pub workers_stopped: bool,
    /// Batches submitted but not completed when waiting ended.
    pub batches_in_flight: usize,
}

impl ShutdownReport {
    pub fn is_complete(&self) -> bool {
        self.dispatcher_stopped && self.workers_stopped && self.batches_in_flight == 0
    }
}

/// Signals completion when the owning thread exits, including by panic.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Threads spawned through a [`ThreadFactory`] whose completion can be awaited
/// with a deadline.
pub(crate) struct ThreadGroup {
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
    finished: usize,
}

impl ThreadGroup {
    pub(crate) fn new() -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            done_tx,
            done_rx,
            handles: Vec::new(),
            finished: 0,
        }
    }

    pub(crate) fn spawn(
        &mut self,
        factory: &dyn ThreadFactory,
        name: String,
        task: impl FnOnce() + Send + 'static,
    ) -> io::Result<()> {
        let done_tx = self.done_tx.clone();
        let handle = factory.spawn(
            name,
            Box::new(move || {
                let _done = DoneGuard(done_tx);
                task();
            }),
        )?;
        self.handles.push(handle);
        Ok(())
    }

    /// Wait until every thread exited. `None` waits indefinitely. Returns
    /// `false` if the deadline passed first.
    pub(crate) fn wait(&mut self, deadline: Option<Instant>) -> bool {
        while self.finished < self.handles.len() {
            let signalled = match deadline {
                Some(deadline) => self.done_rx.recv_deadline(deadline).is_ok(),
                None => self.done_rx.recv().is_ok(),
            };
            if !signalled {
                return false;
            }
            self.finished += 1;
        }
        true
    }

    /// Join every thread, logging panics.
    pub(crate) fn join(self, log: &dyn EventLog) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
            if handle.join().is_err() {
                emit!(log, Error, "engine thread {name} panicked");
            }
        }
    }
}

/// Owns the engine threads between `start` and `shutdown`.
pub(crate) struct ShutdownCoordinator {
    pub(crate) dispatcher: ThreadGroup,
    pub(crate) workers: ThreadGroup,
    pub(crate) in_flight: Arc<AtomicUsize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) log: Arc<dyn EventLog>,
}

impl ShutdownCoordinator {
    /// Wait for the final flush and in-flight deliveries, then release threads.
    pub(crate) fn await_termination(self) -> ShutdownReport {
        let Self {
            mut dispatcher,
            mut workers,
            in_flight,
            timeout,
            log,
        } = self;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        emit!(log, Debug, "waiting for dispatcher final flush");
        let dispatcher_stopped = dispatcher.wait(deadline);
        let workers_stopped = if dispatcher_stopped {
            emit!(
                log,
                Debug,
                "waiting for {} in-flight batches",
                in_flight.load(Ordering::Acquire)
            );
            workers.wait(deadline)
        } else {
            false
        };
        let report = ShutdownReport {
            dispatcher_stopped,
            workers_stopped,
            batches_in_flight: in_flight.load(Ordering::Acquire),
        };

        if dispatcher_stopped {
            dispatcher.join(log.as_ref());
        }
        if workers_stopped {
            workers.join(log.as_ref());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::executor::NamedThreadFactory;
    use crate::test_utils::CollectingLog;

    #[test]
    fn wait_returns_once_all_threads_signal() {
        let mut group = ThreadGroup::new();
        for i in 0..3 {
            group
                .spawn(&NamedThreadFactory, format!("t{i}"), || {})
                .expect("spawn");
        }
        assert!(group.wait(None));
        group.join(&CollectingLog::new());
    }

    #[test]
    fn wait_times_out_on_stuck_thread() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let mut group = ThreadGroup::new();
        group
            .spawn(&NamedThreadFactory, "stuck".into(), move || {
                let _ = release_rx.recv();
            })
            .expect("spawn");
        assert!(!group.wait(Some(Instant::now() + Duration::from_millis(30))));
        drop(release_tx);
        assert!(group.wait(None));
    }

    #[test]
    fn panicking_thread_still_signals_and_is_logged() {
        let log = CollectingLog::new();
        let mut group = ThreadGroup::new();
        group
            .spawn(&NamedThreadFactory, "doomed".into(), || panic!("boom"))
            .expect("spawn");
        assert!(group.wait(Some(Instant::now() + Duration::from_secs(5))));
        group.join(&log);
        assert!(log.contains("engine thread doomed panicked"));
    }

    #[test]
    fn incomplete_report() {
        let report = ShutdownReport {
            dispatcher_stopped: true,
            workers_stopped: false,
            batches_in_flight: 2,
        };
        assert!(!report.is_complete());
    }
}
