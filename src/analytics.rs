//! Public entry point: transformers in front of the batching engine.

use std::sync::Arc;

use crate::builder::AnalyticsBuilder;
use crate::client::{AnalyticsClient, ClientState, ShutdownReport};
use crate::error::AnalyticsError;
use crate::log_sink::{EventLog, emit};
use crate::message::MessageBuilder;
use crate::transformer::TransformerChain;

/// Outcome of a successful [`Analytics::enqueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The message was accepted by the queue.
    Queued,
    /// A transformer vetoed the message; nothing was queued.
    Skipped,
}

/// Thread-safe analytics client.
///
/// Producers hand it [`MessageBuilder`]s; the configured transformers run on
/// the caller's thread, then the finalized message is queued for batching.
/// Dropping the client while it is running performs a shutdown.
///
/// ```no_run
/// use femtoanalytics::{Analytics, MessageBuilder};
///
/// let analytics = Analytics::builder("write-key").build()?;
/// analytics.enqueue(MessageBuilder::track("Signed Up").user_id("u-1"))?;
/// analytics.shutdown()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Analytics {
    client: AnalyticsClient,
    transformers: TransformerChain,
    log: Arc<dyn EventLog>,
}

impl Analytics {
    /// Start configuring a client for `write_key`.
    pub fn builder(write_key: impl Into<String>) -> AnalyticsBuilder {
        AnalyticsBuilder::new(write_key)
    }

    pub(crate) fn from_parts(
        client: AnalyticsClient,
        transformers: TransformerChain,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            client,
            transformers,
            log,
        }
    }

    /// Run the transformers, finalize the message, and queue it.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::ClientShutdown`] - shutdown has begun
    /// * [`AnalyticsError::InvalidMessage`] - the builder lacks an identity
    ///   or a required field
    /// * [`AnalyticsError::QueueFull`] - the queue had no room
    pub fn enqueue(&self, mut builder: MessageBuilder) -> Result<Enqueued, AnalyticsError> {
        if self.client.state() != ClientState::Running {
            return Err(AnalyticsError::ClientShutdown);
        }
        if !self.transformers.apply(&mut builder) {
            emit!(self.log, Verbose, "skipping message {builder:?}");
            return Ok(Enqueued::Skipped);
        }
        let message = builder.build()?;
        self.client.enqueue(message)?;
        Ok(Enqueued::Queued)
    }

    /// See [`AnalyticsClient::flush`].
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::ClientShutdown`] - shutdown has begun
    /// * [`AnalyticsError::FlushTimeout`] - the dispatcher did not answer in
    ///   time
    pub fn flush(&self) -> Result<(), AnalyticsError> {
        self.client.flush()
    }

    /// See [`AnalyticsClient::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::ClientShutdown`] on a second call.
    pub fn shutdown(&self) -> Result<ShutdownReport, AnalyticsError> {
        self.client.shutdown()
    }

    pub fn state(&self) -> ClientState {
        self.client.state()
    }

    /// The underlying engine, for callers that finalize messages themselves.
    pub fn client(&self) -> &AnalyticsClient {
        &self.client
    }
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("client", &self.client)
            .field("transformers", &self.transformers)
            .finish()
    }
}
