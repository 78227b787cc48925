//! Batching-and-delivery engine.
//!
//! [`AnalyticsClient`] owns three kinds of execution context:
//!
//! - **Producers**: any thread calling [`AnalyticsClient::enqueue`]. They only
//!   touch the bounded queue and the atomic lifecycle state.
//! - **Dispatcher**: one thread that forms batches on size, timer, explicit
//!   flush, or shutdown.
//! - **Delivery workers**: `delivery_workers` threads that transmit batches so
//!   slow requests never stall batching or producers.
//!
//! # Shutdown
//!
//! [`AnalyticsClient::shutdown`] moves `Running -> ShuttingDown`, closes the
//! queue, lets the dispatcher perform a final flush, waits (bounded by
//! `shutdown_timeout`) for in-flight deliveries, and ends in `Shutdown`.
//! Every message accepted before the call gets one delivery attempt unless the
//! timeout expires, which the returned [`ShutdownReport`] makes visible.

mod config;
mod dispatcher;
mod executor;
mod queue;
mod shutdown;
mod state;
mod timer;


use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::callback::DeliveryCallback;
use crate::error::{AnalyticsError, BuildError};
use crate::log_sink::{EventLog, NoopLog, emit};
use crate::message::Message;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::transport::Transport;

pub use config::{
    ClientConfig, DEFAULT_DELIVERY_WORKERS, DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_QUEUE_SIZE,
    DEFAULT_FLUSH_TIMEOUT, DEFAULT_MAX_PENDING_BATCHES, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_THREAD_NAME_PREFIX, MIN_FLUSH_INTERVAL, OverflowPolicy,
};
pub use executor::{NamedThreadFactory, ThreadFactory, ThreadTask};
pub use queue::QueueEntry;
pub use shutdown::ShutdownReport;
pub use state::ClientState;

use dispatcher::{DispatchCommand, Dispatcher};
use executor::{DeliveryContext, spawn_delivery_workers};
use queue::MessageQueue;
use shutdown::{ShutdownCoordinator, ThreadGroup};
use state::StateCell;

/// Injected collaborators used by the engine.
#[derive(Clone)]
pub struct ClientServices {
    pub transport: Arc<dyn Transport>,
    pub log: Arc<dyn EventLog>,
    pub callback: Option<Arc<dyn DeliveryCallback>>,
    pub thread_factory: Arc<dyn ThreadFactory>,
}

impl ClientServices {
    /// Services with a silent log, no callback, and plain named threads.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            log: Arc::new(NoopLog),
            callback: None,
            thread_factory: Arc::new(NamedThreadFactory),
        }
    }
}

impl ClientConfig {
    /// Check the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<(), BuildError> {
        let invalid = |msg: &str| Err(BuildError::InvalidConfig(msg.to_owned()));
        if self.flush_queue_size < 1 {
            return invalid("flush_queue_size must not be less than 1");
        }
        if self.flush_interval < MIN_FLUSH_INTERVAL {
            return invalid("flush_interval must not be less than 1 second");
        }
        if self.queue_capacity < 1 {
            return invalid("queue_capacity must be greater than zero");
        }
        if self.delivery_workers < 1 {
            return invalid("delivery_workers must be greater than zero");
        }
        if self.max_pending_batches < 1 {
            return invalid("max_pending_batches must be greater than zero");
        }
        if self.flush_timeout.is_zero() {
            return invalid("flush_timeout must be greater than zero");
        }
        if let OverflowPolicy::Timeout(timeout) = self.overflow_policy
            && timeout.is_zero()
        {
            return invalid("overflow timeout must be greater than zero");
        }
        if self.shutdown_timeout.is_some_and(|t| t.is_zero()) {
            return invalid("shutdown_timeout must be greater than zero");
        }
        if self.thread_name_prefix.trim().is_empty() {
            return invalid("thread_name_prefix must not be empty");
        }
        Ok(())
    }
}

/// Thread-safe handle to a running engine.
///
/// Share it between producer threads with `Arc`. Dropping the last handle
/// while running performs [`shutdown`](Self::shutdown).
pub struct AnalyticsClient {
    state: StateCell,
    queue: MessageQueue,
    commands: Sender<DispatchCommand>,
    coordinator: Mutex<Option<ShutdownCoordinator>>,
    flush_timeout: Duration,
    log: Arc<dyn EventLog>,
}

impl AnalyticsClient {
    /// Validate `config` and start the dispatcher and delivery threads.
    ///
    /// # Errors
    ///
    /// * [`BuildError::InvalidConfig`] - `config` violates an invariant
    /// * [`BuildError::Io`] - the thread factory failed to spawn a thread
    pub fn start(config: ClientConfig, services: ClientServices) -> Result<Self, BuildError> {
        config.validate()?;
        let ClientServices {
            transport,
            log,
            callback,
            thread_factory,
        } = services;

        let (queue, queue_rx) = MessageQueue::new(
            config.queue_capacity,
            config.overflow_policy,
            RateLimitedWarner::new(config.warn_interval),
            Arc::clone(&log),
        );
        let (commands, commands_rx) = unbounded();

        let mut workers = ThreadGroup::new();
        let (submitter, in_flight) = spawn_delivery_workers(
            config.delivery_workers,
            config.max_pending_batches,
            &config.thread_name_prefix,
            thread_factory.as_ref(),
            &mut workers,
            DeliveryContext {
                transport,
                callback,
                log: Arc::clone(&log),
            },
        )?;

        let dispatcher = Dispatcher::new(
            queue_rx,
            commands_rx,
            config.flush_queue_size,
            config.flush_interval,
            submitter,
            Arc::clone(&log),
        );
        let mut dispatcher_group = ThreadGroup::new();
        // On failure the dispatcher (and its submitter) is dropped, which lets
        // the already spawned workers exit.
        dispatcher_group.spawn(
            thread_factory.as_ref(),
            format!("{}-dispatcher", config.thread_name_prefix),
            move || dispatcher.run(),
        )?;

        emit!(
            log,
            Debug,
            "client started: flush_queue_size={}, flush_interval={:?}, delivery_workers={}",
            config.flush_queue_size,
            config.flush_interval,
            config.delivery_workers
        );

        Ok(Self {
            state: StateCell::new(),
            queue,
            commands,
            coordinator: Mutex::new(Some(ShutdownCoordinator {
                dispatcher: dispatcher_group,
                workers,
                in_flight,
                timeout: config.shutdown_timeout,
                log: Arc::clone(&log),
            })),
            flush_timeout: config.flush_timeout,
            log,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    /// Messages accepted but not yet received by the dispatcher.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Hand a finalized message to the engine.
    ///
    /// Never blocks longer than the configured overflow timeout.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::QueueFull`] - the message was not accepted
    /// * [`AnalyticsError::ClientShutdown`] - shutdown has begun
    pub fn enqueue(&self, message: Message) -> Result<(), AnalyticsError> {
        if !self.state.is_running() {
            return Err(AnalyticsError::ClientShutdown);
        }
        self.queue.push(message)
    }

    /// Form and submit batches from everything queued right now, waiting for
    /// the dispatcher to acknowledge. An empty queue submits nothing.
    ///
    /// The acknowledgement means the batches were handed to the delivery
    /// pool, not that they were delivered.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::ClientShutdown`] - shutdown has begun
    /// * [`AnalyticsError::FlushTimeout`] - no acknowledgement within
    ///   `flush_timeout`
    pub fn flush(&self) -> Result<(), AnalyticsError> {
        if !self.state.is_running() {
            return Err(AnalyticsError::ClientShutdown);
        }
        let (ack_tx, ack_rx) = bounded(1);
        self.commands
            .send(DispatchCommand::Flush(ack_tx))
            .map_err(|_| AnalyticsError::ClientShutdown)?;
        match ack_rx.recv_timeout(self.flush_timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(AnalyticsError::FlushTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(AnalyticsError::ClientShutdown),
        }
    }

    /// Stop accepting messages, drain, and release the engine threads.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::ClientShutdown`] if shutdown was already
    /// requested.
    pub fn shutdown(&self) -> Result<ShutdownReport, AnalyticsError> {
        if !self.state.begin_shutdown() {
            return Err(AnalyticsError::ClientShutdown);
        }
        emit!(
            self.log,
            Debug,
            "shutting down with {} queued messages",
            self.queue.len()
        );
        self.queue.close();
        let _ = self.commands.send(DispatchCommand::Shutdown);

        let coordinator = self.coordinator.lock().take();
        let report = match coordinator {
            Some(coordinator) => coordinator.await_termination(),
            None => ShutdownReport {
                dispatcher_stopped: true,
                workers_stopped: true,
                batches_in_flight: 0,
            },
        };
        self.state.finish_shutdown();

        if report.is_complete() {
            emit!(self.log, Debug, "shutdown complete");
        } else {
            emit!(
                self.log,
                Error,
                "shutdown timed out: dispatcher_stopped={}, {} batches still in flight",
                report.dispatcher_stopped,
                report.batches_in_flight
            );
        }
        Ok(report)
    }
}

impl Drop for AnalyticsClient {
    fn drop(&mut self) {
        if self.state.is_running() {
            let _ = self.shutdown();
        }
    }
}

impl std::fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}
