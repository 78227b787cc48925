//! Client-side event ingestion with background batching and delivery.
//!
//! Producers build [`Message`]s and hand them to [`Analytics::enqueue`]. A
//! dispatcher thread groups queued messages into [`Batch`]es on size, timer,
//! explicit flush, or shutdown, and a small pool of delivery threads posts
//! each batch through a [`Transport`]. Producers never wait on the network.

mod analytics;
mod batch;
mod builder;
mod callback;
pub mod client;
mod error;
pub mod file_config;
pub mod log_sink;
mod message;
pub mod rate_limited_warner;
mod transformer;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use analytics::{Analytics, Enqueued};
pub use batch::{Batch, BatchPayload, LIBRARY_NAME, LIBRARY_VERSION};
pub use builder::AnalyticsBuilder;
pub use callback::{DeliveryCallback, DeliveryError};
pub use client::{
    AnalyticsClient, ClientConfig, ClientServices, ClientState, OverflowPolicy, ShutdownReport,
    ThreadFactory,
};
pub use error::{AnalyticsError, BuildError};
pub use file_config::FileConfigError;
pub use log_sink::{EventLog, LogFacade, LogLevel, NoopLog};
#[cfg(feature = "tracing-compat")]
pub use log_sink::TracingLog;
pub use message::{Message, MessageBuilder, MessageError, MessageKind};
pub use transformer::{MessageTransformer, TransformerChain};
pub use transport::{
    BackoffPolicy, HttpTransport, HttpTransportConfig, RetryTransport, Transport,
    TransportError, TransportResponse,
};
