//! Outbound transmission of batches.
//!
//! A [`Transport`] performs one request per batch and reports the endpoint's
//! answer. The delivery executor treats a 2xx status as success and anything
//! else as a failure; it never retries. Callers that want bounded retries can
//! wrap any transport in [`RetryTransport`], which classifies responses as
//! follows:
//!
//! - **2xx**: Success.
//! - **429 (Too Many Requests)**: Retryable.
//! - **5xx**: Retryable.
//! - **4xx (except 429)**: Permanent failure.
//! - **Network errors**: Retryable.

mod backoff;
mod http;
mod retry;

use std::sync::Arc;

use thiserror::Error;

use crate::batch::Batch;

pub use backoff::{BackoffPolicy, BackoffState};
pub use http::{DEFAULT_ENDPOINT, HttpTransport, HttpTransportConfig, IMPORT_PATH};
pub use retry::RetryTransport;

/// Status and body returned by the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        classify_status(self.status) == ResponseClass::Success
    }
}

/// Failures that prevented a response from being received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The batch could not be encoded.
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The TLS connector could not be created.
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),
    /// Connection, TLS handshake, or I/O failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Sends a single batch to the collection endpoint.
///
/// Implementations are shared by every delivery worker and may be called
/// concurrently.
pub trait Transport: Send + Sync {
    fn send(&self, batch: &Batch) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, batch: &Batch) -> Result<TransportResponse, TransportError> {
        (**self).send(batch)
    }
}

/// Classification of HTTP response for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx responses - request succeeded.
    Success,
    /// 5xx, 429, or network errors - retry with backoff.
    Retryable,
    /// 4xx (except 429) - permanent failure, do not retry.
    Permanent,
}

/// Classifies an HTTP status code.
pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        429 => ResponseClass::Retryable,
        500..=599 => ResponseClass::Retryable,
        _ => ResponseClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(200, ResponseClass::Success)]
    #[case(202, ResponseClass::Success)]
    #[case(204, ResponseClass::Success)]
    #[case(429, ResponseClass::Retryable)]
    #[case(500, ResponseClass::Retryable)]
    #[case(503, ResponseClass::Retryable)]
    #[case(400, ResponseClass::Permanent)]
    #[case(401, ResponseClass::Permanent)]
    #[case(404, ResponseClass::Permanent)]
    #[case(302, ResponseClass::Permanent)]
    fn classifies_statuses(#[case] status: u16, #[case] expected: ResponseClass) {
        assert_eq!(classify_status(status), expected);
    }

    #[test]
    fn success_is_2xx_only() {
        assert!(TransportResponse::new(200, "").is_success());
        assert!(!TransportResponse::new(429, "slow down").is_success());
    }
}
