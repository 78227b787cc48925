//! Completion notifications for delivery attempts.

use thiserror::Error;

use crate::batch::Batch;
use crate::transport::TransportError;

/// Why a batch delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Observer invoked on a delivery worker once each batch attempt completes.
///
/// Runs on the delivery thread; slow callbacks delay subsequent batches on
/// that worker.
pub trait DeliveryCallback: Send + Sync {
    fn success(&self, batch: &Batch);
    fn failure(&self, batch: &Batch, error: &DeliveryError);
}
