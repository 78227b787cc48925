//! Delivery worker pool.
//!
//! Formed batches travel over a bounded job channel to `delivery_workers`
//! threads. Each worker hands the batch to the [`Transport`], logs the
//! outcome, notifies the optional [`DeliveryCallback`], and drops the batch.
//! Nothing is retried here. Workers exit once the dispatcher drops its
//! [`BatchSubmitter`] and the channel is empty.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender, bounded};

use super::shutdown::ThreadGroup;
use crate::batch::Batch;
use crate::callback::{DeliveryCallback, DeliveryError};
use crate::log_sink::{EventLog, emit};
use crate::transport::Transport;

/// Work item run on an engine thread.
pub type ThreadTask = Box<dyn FnOnce() + Send + 'static>;

/// Creates every thread the engine runs on.
///
/// Supplying a factory lets applications control naming, stack size, or
/// affinity; the engine spawns nothing outside it.
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, name: String, task: ThreadTask) -> io::Result<JoinHandle<()>>;
}

/// Spawns plain OS threads with the requested name.
#[derive(Clone, Copy, Debug, Default)]
pub struct NamedThreadFactory;

impl ThreadFactory for NamedThreadFactory {
    fn spawn(&self, name: String, task: ThreadTask) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(task)
    }
}

/// Collaborators shared by every delivery worker.
pub(crate) struct DeliveryContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) callback: Option<Arc<dyn DeliveryCallback>>,
    pub(crate) log: Arc<dyn EventLog>,
}

/// Dispatcher-side handle for queuing batches to the pool.
pub(crate) struct BatchSubmitter {
    tx: Sender<Batch>,
    in_flight: Arc<AtomicUsize>,
    log: Arc<dyn EventLog>,
}

impl BatchSubmitter {
    /// Queue a batch for delivery, blocking while `max_pending_batches`
    /// batches are already waiting.
    pub(crate) fn submit(&self, batch: Batch) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Err(SendError(batch)) = self.tx.send(batch) {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            emit!(
                self.log,
                Error,
                "no delivery worker running; dropped batch #{} ({} messages)",
                batch.sequence(),
                batch.len()
            );
        }
    }
}

/// Spawn the delivery workers into `group`.
///
/// Returns the submitter for the dispatcher and the shared in-flight
/// counter, which counts batches submitted but not yet completed.
pub(crate) fn spawn_delivery_workers(
    workers: usize,
    max_pending_batches: usize,
    name_prefix: &str,
    factory: &dyn ThreadFactory,
    group: &mut ThreadGroup,
    ctx: DeliveryContext,
) -> io::Result<(BatchSubmitter, Arc<AtomicUsize>)> {
    let (tx, rx) = bounded::<Batch>(max_pending_batches);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let log = Arc::clone(&ctx.log);
    let ctx = Arc::new(ctx);
    for index in 0..workers {
        let rx = rx.clone();
        let ctx = Arc::clone(&ctx);
        let in_flight = Arc::clone(&in_flight);
        group.spawn(factory, format!("{name_prefix}-delivery-{index}"), move || {
            delivery_loop(rx, ctx, in_flight);
        })?;
    }
    let submitter = BatchSubmitter {
        tx,
        in_flight: Arc::clone(&in_flight),
        log,
    };
    Ok((submitter, in_flight))
}

/// Decrements the in-flight counter even if the transport panics.
struct InFlightSlot<'a>(&'a AtomicUsize);

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn delivery_loop(rx: Receiver<Batch>, ctx: Arc<DeliveryContext>, in_flight: Arc<AtomicUsize>) {
    for batch in rx.iter() {
        let _slot = InFlightSlot(&in_flight);
        deliver(&ctx, &batch);
    }
}

pub(crate) fn deliver(ctx: &DeliveryContext, batch: &Batch) {
    emit!(
        ctx.log,
        Verbose,
        "sending batch #{} ({} messages)",
        batch.sequence(),
        batch.len()
    );
    let outcome = match ctx.transport.send(batch) {
        Ok(response) if response.is_success() => Ok(response.status),
        Ok(response) => Err(DeliveryError::Rejected {
            status: response.status,
            body: response.body,
        }),
        Err(err) => Err(DeliveryError::Transport(err)),
    };
    match outcome {
        Ok(status) => {
            emit!(
                ctx.log,
                Debug,
                "delivered batch #{} ({} messages, status {status})",
                batch.sequence(),
                batch.len()
            );
            if let Some(callback) = &ctx.callback {
                callback.success(batch);
            }
        }
        Err(err) => {
            emit!(
                ctx.log,
                Error,
                "failed to deliver batch #{} ({} messages): {err}",
                batch.sequence(),
                batch.len()
            );
            if let Some(callback) = &ctx.callback {
                callback.failure(batch, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use super::*;
    use crate::message::MessageBuilder;
    use crate::test_utils::{CollectingLog, RecordingTransport};
    use crate::transport::{TransportError, TransportResponse};

    #[derive(Default)]
    struct Outcomes {
        succeeded: Mutex<Vec<u64>>,
        failed: Mutex<Vec<(u64, String)>>,
    }

    impl DeliveryCallback for Outcomes {
        fn success(&self, batch: &Batch) {
            self.succeeded.lock().push(batch.sequence());
        }

        fn failure(&self, batch: &Batch, error: &DeliveryError) {
            self.failed.lock().push((batch.sequence(), error.to_string()));
        }
    }

    struct Failing;

    impl Transport for Failing {
        fn send(&self, _batch: &Batch) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Network("connection reset".into()))
        }
    }

    fn batch(sequence: u64) -> Batch {
        let message = MessageBuilder::track("e")
            .user_id("u")
            .build()
            .expect("valid message");
        Batch::new(sequence, vec![message])
    }

    fn context(
        transport: Arc<dyn Transport>,
        outcomes: &Arc<Outcomes>,
        log: &CollectingLog,
    ) -> DeliveryContext {
        let callback: Arc<dyn DeliveryCallback> = outcomes.clone();
        DeliveryContext {
            transport,
            callback: Some(callback),
            log: Arc::new(log.clone()),
        }
    }

    #[test]
    fn non_2xx_is_reported_with_status_and_body() {
        let transport = RecordingTransport::with_statuses(vec![(400, "bad write key")]);
        let outcomes = Arc::new(Outcomes::default());
        let log = CollectingLog::new();
        deliver(&context(Arc::new(transport.clone()), &outcomes, &log), &batch(4));

        assert_eq!(transport.batches().len(), 1);
        let failed = outcomes.failed.lock().clone();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, 4);
        assert!(failed[0].1.contains("400"));
        assert!(log.contains("bad write key"));
    }

    #[test]
    fn transport_errors_are_logged_not_propagated() {
        let outcomes = Arc::new(Outcomes::default());
        let log = CollectingLog::new();
        deliver(&context(Arc::new(Failing), &outcomes, &log), &batch(1));
        assert!(log.contains("connection reset"));
        assert!(outcomes.succeeded.lock().is_empty());
    }

    #[test]
    fn workers_drain_channel_then_exit() {
        let transport = RecordingTransport::new();
        let outcomes = Arc::new(Outcomes::default());
        let log = CollectingLog::new();
        let mut group = ThreadGroup::new();
        let (submitter, in_flight) = spawn_delivery_workers(
            2,
            4,
            "test",
            &NamedThreadFactory,
            &mut group,
            context(Arc::new(transport.clone()), &outcomes, &log),
        )
        .expect("spawn workers");

        for sequence in 0..5 {
            submitter.submit(batch(sequence));
        }
        drop(submitter);

        assert!(group.wait(Instant::now().checked_add(Duration::from_secs(5))));
        group.join(&log);
        assert_eq!(in_flight.load(Ordering::Acquire), 0);
        let mut delivered = outcomes.succeeded.lock().clone();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
        assert_eq!(transport.batches().len(), 5);
    }
}
