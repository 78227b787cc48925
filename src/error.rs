//! Errors surfaced on the caller's thread.
//!
//! Only synchronous failures appear here. Delivery problems happen on worker
//! threads and are reported through the log sink and the delivery callback.

use std::io;

use thiserror::Error;

use crate::message::MessageError;
use crate::transport::TransportError;

/// Errors returned by [`Analytics`](crate::Analytics) and
/// [`AnalyticsClient`](crate::AnalyticsClient) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    /// The queue is at capacity; the message was not accepted.
    #[error("message queue is full")]
    QueueFull,
    /// The client is shutting down or has shut down.
    #[error("client has been shut down")]
    ClientShutdown,
    /// The dispatcher did not acknowledge a flush in time.
    #[error("flush was not acknowledged within the configured timeout")]
    FlushTimeout,
    /// The message builder could not be finalized.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),
}

/// Errors that may occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid analytics configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The default HTTP transport could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
