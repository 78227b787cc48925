//! Opt-in bounded retry decorator.

use std::thread;
use std::time::Instant;

use super::{
    BackoffPolicy, BackoffState, ResponseClass, Transport, TransportError, TransportResponse,
    classify_status,
};
use crate::batch::Batch;

/// Retries 429, 5xx, and network failures of the wrapped transport with
/// jittered exponential backoff until the policy deadline passes.
///
/// The retry loop runs on the delivery worker, so a batch being retried
/// occupies that worker for up to the policy deadline.
pub struct RetryTransport<T> {
    inner: T,
    policy: BackoffPolicy,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for RetryTransport<T> {
    fn send(&self, batch: &Batch) -> Result<TransportResponse, TransportError> {
        let mut backoff = BackoffState::new(self.policy.clone());
        loop {
            let result = self.inner.send(batch);
            let retryable = match &result {
                Ok(response) => classify_status(response.status) == ResponseClass::Retryable,
                Err(TransportError::Network(_)) => true,
                Err(TransportError::Serialize(_) | TransportError::Tls(_)) => false,
            };
            if !retryable {
                return result;
            }
            let Some(delay) = backoff.next_sleep(Instant::now()) else {
                return result;
            };
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    struct Scripted {
        statuses: Mutex<Vec<u16>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut statuses: Vec<u16>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&self, _batch: &Batch) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.statuses.lock().pop() {
                Some(0) => Err(TransportError::Network("connection refused".into())),
                Some(status) => Ok(TransportResponse::new(status, "")),
                None => Ok(TransportResponse::new(200, "")),
            }
        }
    }

    fn fast_policy(deadline: Duration) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            deadline,
        }
    }

    #[test]
    fn retries_transient_failures_until_success() {
        let retry = RetryTransport::new(
            Scripted::new(vec![503, 0, 429, 200]),
            fast_policy(Duration::from_secs(5)),
        );
        let response = retry.send(&Batch::new(0, Vec::new())).expect("response");
        assert_eq!(response.status, 200);
        assert_eq!(retry.into_inner().calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let retry = RetryTransport::new(
            Scripted::new(vec![400, 200]),
            fast_policy(Duration::from_secs(5)),
        );
        let response = retry.send(&Batch::new(0, Vec::new())).expect("response");
        assert_eq!(response.status, 400);
        assert_eq!(retry.into_inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn returns_last_failure_after_deadline() {
        let retry = RetryTransport::new(
            Scripted::new(vec![500; 10_000]),
            fast_policy(Duration::from_millis(30)),
        );
        let response = retry.send(&Batch::new(0, Vec::new())).expect("response");
        assert_eq!(response.status, 500);
    }
}
