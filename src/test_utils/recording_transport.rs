//! In-memory [`Transport`] that records every batch it is asked to send.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::batch::Batch;
use crate::transport::{Transport, TransportError, TransportResponse};

#[derive(Default)]
struct Inner {
    batches: Mutex<Vec<Batch>>,
    arrived: Condvar,
    statuses: Mutex<VecDeque<(u16, String)>>,
    delay: Option<Duration>,
}

/// Transport double. Clones share the same recording.
///
/// Responds with scripted statuses in order, then `200`. An optional delay
/// simulates a slow endpoint; the batch is recorded before the delay starts.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Inner>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the first sends with the given `(status, body)` pairs.
    pub fn with_statuses(statuses: Vec<(u16, &str)>) -> Self {
        let statuses = statuses
            .into_iter()
            .map(|(status, body)| (status, body.to_owned()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                statuses: Mutex::new(statuses),
                ..Inner::default()
            }),
        }
    }

    /// Sleep for `delay` inside every send.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay: Some(delay),
                ..Inner::default()
            }),
        }
    }

    /// Snapshot of the batches sent so far, in arrival order.
    pub fn batches(&self) -> Vec<Batch> {
        self.inner.batches.lock().clone()
    }

    /// Block until at least `count` batches arrived or `timeout` passed, then
    /// return a snapshot.
    pub fn wait_for_batches(&self, count: usize, timeout: Duration) -> Vec<Batch> {
        let deadline = Instant::now() + timeout;
        let mut batches = self.inner.batches.lock();
        while batches.len() < count {
            if self
                .inner
                .arrived
                .wait_until(&mut batches, deadline)
                .timed_out()
            {
                break;
            }
        }
        batches.clone()
    }

    /// Total messages across all recorded batches.
    pub fn message_count(&self) -> usize {
        self.inner.batches.lock().iter().map(Batch::len).sum()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, batch: &Batch) -> Result<TransportResponse, TransportError> {
        {
            let mut batches = self.inner.batches.lock();
            batches.push(batch.clone());
            self.inner.arrived.notify_all();
        }
        if let Some(delay) = self.inner.delay {
            thread::sleep(delay);
        }
        let (status, body) = self
            .inner
            .statuses
            .lock()
            .pop_front()
            .unwrap_or((200, String::new()));
        Ok(TransportResponse { status, body })
    }
}
