//! Builder for [`Analytics`](crate::Analytics).
//!
//! Collects the write key, engine tuning, HTTP settings and injected
//! collaborators, validates them in [`AnalyticsBuilder::build`], and starts
//! the engine threads. Nothing runs until `build` succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::Analytics;
use crate::callback::DeliveryCallback;
use crate::client::{
    AnalyticsClient, ClientConfig, ClientServices, NamedThreadFactory, OverflowPolicy,
    ThreadFactory,
};
use crate::error::BuildError;
use crate::log_sink::{EventLog, NoopLog};
use crate::transformer::{MessageTransformer, TransformerChain};
use crate::transport::{
    BackoffPolicy, DEFAULT_ENDPOINT, HttpTransport, HttpTransportConfig, RetryTransport,
    Transport,
};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// How long `shutdown` may wait for the engine to drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShutdownWait {
    Bounded(Duration),
    Unbounded,
}

/// Fluent configuration for an [`Analytics`] client.
#[derive(Clone)]
pub struct AnalyticsBuilder {
    write_key: String,
    endpoint: Option<String>,
    headers: HashMap<String, String>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    retry: Option<BackoffPolicy>,
    flush_queue_size: Option<usize>,
    flush_interval: Option<Duration>,
    queue_capacity: Option<usize>,
    overflow_policy: Option<OverflowPolicy>,
    delivery_workers: Option<usize>,
    max_pending_batches: Option<usize>,
    shutdown_wait: Option<ShutdownWait>,
    flush_timeout: Option<Duration>,
    thread_name_prefix: Option<String>,
    warn_interval: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    log: Option<Arc<dyn EventLog>>,
    callback: Option<Arc<dyn DeliveryCallback>>,
    thread_factory: Option<Arc<dyn ThreadFactory>>,
    transformers: Vec<Arc<dyn MessageTransformer>>,
}

impl AnalyticsBuilder {
    /// Start a builder for the given write key. The key is validated in
    /// [`build`](Self::build).
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            endpoint: None,
            headers: HashMap::new(),
            connect_timeout: None,
            request_timeout: None,
            retry: None,
            flush_queue_size: None,
            flush_interval: None,
            queue_capacity: None,
            overflow_policy: None,
            delivery_workers: None,
            max_pending_batches: None,
            shutdown_wait: None,
            flush_timeout: None,
            thread_name_prefix: None,
            warn_interval: None,
            transport: None,
            log: None,
            callback: None,
            thread_factory: None,
            transformers: Vec::new(),
        }
    }

    /// Base URL of the collection API. Ignored when a custom transport is set.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a custom HTTP header to every request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    option_setter!(
        #[doc = "Set the HTTP connect timeout."]
        with_connect_timeout,
        connect_timeout,
        Duration
    );
    option_setter!(
        #[doc = "Set the timeout for a whole HTTP request."]
        with_request_timeout,
        request_timeout,
        Duration
    );
    option_setter!(
        #[doc = "Retry 429, 5xx and network failures using `policy`."]
        #[doc = ""]
        #[doc = "Off by default: a failed batch is reported and dropped."]
        with_retry,
        retry,
        BackoffPolicy
    );
    option_setter!(
        #[doc = "Number of messages that triggers an immediate flush."]
        with_flush_queue_size,
        flush_queue_size,
        usize
    );
    option_setter!(
        #[doc = "Period of the flush timer. Must be at least one second."]
        with_flush_interval,
        flush_interval,
        Duration
    );
    option_setter!(
        #[doc = "Bounded capacity of the message queue."]
        with_queue_capacity,
        queue_capacity,
        usize
    );
    option_setter!(
        #[doc = "Behaviour of `enqueue` when the queue is full."]
        with_overflow_policy,
        overflow_policy,
        OverflowPolicy
    );
    option_setter!(
        #[doc = "Number of delivery threads."]
        with_delivery_workers,
        delivery_workers,
        usize
    );
    option_setter!(
        #[doc = "Formed batches allowed to wait for a delivery thread."]
        with_max_pending_batches,
        max_pending_batches,
        usize
    );
    option_setter!(
        #[doc = "Upper bound on waiting for a flush acknowledgement."]
        with_flush_timeout,
        flush_timeout,
        Duration
    );
    option_setter!(
        #[doc = "Interval between aggregated queue-full warnings."]
        with_warn_interval,
        warn_interval,
        Duration
    );

    /// Upper bound on the shutdown drain.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_wait = Some(ShutdownWait::Bounded(timeout));
        self
    }

    /// Let `shutdown` wait for in-flight deliveries without a deadline.
    pub fn with_unbounded_shutdown(mut self) -> Self {
        self.shutdown_wait = Some(ShutdownWait::Unbounded);
        self
    }

    /// Prefix for the dispatcher and delivery thread names.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    /// Replace the HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sink for engine diagnostics. Defaults to [`NoopLog`].
    pub fn with_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Observer notified after each delivery attempt.
    pub fn with_callback(mut self, callback: Arc<dyn DeliveryCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Factory used for every engine thread.
    pub fn with_thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.thread_factory = Some(factory);
        self
    }

    /// Append a transformer. Transformers run in registration order.
    pub fn with_transformer(mut self, transformer: Arc<dyn MessageTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        self.validate_write_key()?;
        self.validate_http()?;
        Ok(())
    }

    fn validate_write_key(&self) -> Result<(), BuildError> {
        if self.write_key.trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "write_key must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn validate_http(&self) -> Result<(), BuildError> {
        if let Some(endpoint) = &self.endpoint
            && endpoint.trim().is_empty()
        {
            return Err(BuildError::InvalidConfig(
                "endpoint must not be empty".into(),
            ));
        }
        if let Some(timeout) = self.connect_timeout {
            ensure_positive!(timeout.as_millis(), "connect_timeout")?;
        }
        if let Some(timeout) = self.request_timeout {
            ensure_positive!(timeout.as_millis(), "request_timeout")?;
        }
        if let Some(policy) = &self.retry {
            ensure_positive!(policy.base.as_millis(), "retry base delay")?;
        }
        Ok(())
    }

    /// Resolve the engine settings, falling back to the documented defaults.
    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            flush_queue_size: self.flush_queue_size.unwrap_or(defaults.flush_queue_size),
            flush_interval: self.flush_interval.unwrap_or(defaults.flush_interval),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            overflow_policy: self.overflow_policy.unwrap_or(defaults.overflow_policy),
            delivery_workers: self.delivery_workers.unwrap_or(defaults.delivery_workers),
            max_pending_batches: self
                .max_pending_batches
                .unwrap_or(defaults.max_pending_batches),
            shutdown_timeout: match self.shutdown_wait {
                Some(ShutdownWait::Bounded(timeout)) => Some(timeout),
                Some(ShutdownWait::Unbounded) => None,
                None => defaults.shutdown_timeout,
            },
            flush_timeout: self.flush_timeout.unwrap_or(defaults.flush_timeout),
            thread_name_prefix: self
                .thread_name_prefix
                .clone()
                .unwrap_or(defaults.thread_name_prefix),
            warn_interval: self.warn_interval.unwrap_or(defaults.warn_interval),
        }
    }

    fn http_config(&self) -> HttpTransportConfig {
        let defaults = HttpTransportConfig::new(self.write_key.clone());
        HttpTransportConfig {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            headers: self.headers.clone(),
            ..defaults
        }
    }

    /// Validate the configuration and start the client threads.
    ///
    /// # Errors
    ///
    /// * [`BuildError::InvalidConfig`] - a setting is missing or out of range,
    ///   or a transformer was registered twice
    /// * [`BuildError::Io`] - an engine thread could not be spawned
    /// * [`BuildError::Transport`] - the HTTP transport could not be created
    pub fn build(self) -> Result<Analytics, BuildError> {
        self.validate()?;
        let config = self.client_config();
        config.validate()?;

        let transformers = TransformerChain::new(self.transformers.clone()).map_err(|index| {
            BuildError::InvalidConfig(format!(
                "transformer at position {index} is already registered"
            ))
        })?;

        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(self.http_config())?) as Arc<dyn Transport>,
        };
        let transport: Arc<dyn Transport> = match &self.retry {
            Some(policy) => Arc::new(RetryTransport::new(transport, policy.clone())),
            None => transport,
        };

        let log = self
            .log
            .clone()
            .unwrap_or_else(|| Arc::new(NoopLog) as Arc<dyn EventLog>);
        let services = ClientServices {
            transport,
            log: Arc::clone(&log),
            callback: self.callback.clone(),
            thread_factory: self
                .thread_factory
                .clone()
                .unwrap_or_else(|| Arc::new(NamedThreadFactory) as Arc<dyn ThreadFactory>),
        };

        let client = AnalyticsClient::start(config, services)?;
        Ok(Analytics::from_parts(client, transformers, log))
    }
}

impl std::fmt::Debug for AnalyticsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsBuilder")
            .field("endpoint", &self.endpoint)
            .field("config", &self.client_config())
            .field("retry", &self.retry)
            .field("custom_transport", &self.transport.is_some())
            .field("transformers", &self.transformers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message::MessageBuilder;
    use crate::test_utils::RecordingTransport;

    fn builder() -> AnalyticsBuilder {
        AnalyticsBuilder::new("key").with_transport(Arc::new(RecordingTransport::new()))
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn rejects_blank_write_key(#[case] key: &str) {
        let err = AnalyticsBuilder::new(key).build().expect_err("blank key");
        assert!(err.to_string().contains("write_key"), "{err}");
    }

    #[rstest]
    #[case(builder().with_flush_queue_size(0), "flush_queue_size")]
    #[case(builder().with_flush_interval(Duration::from_millis(500)), "flush_interval")]
    #[case(builder().with_queue_capacity(0), "queue_capacity")]
    #[case(builder().with_connect_timeout(Duration::ZERO), "connect_timeout")]
    #[case(builder().with_endpoint(" "), "endpoint")]
    #[case(builder().with_thread_name_prefix(""), "thread_name_prefix")]
    fn rejects_out_of_range_settings(#[case] builder: AnalyticsBuilder, #[case] field: &str) {
        let err = builder.build().expect_err("invalid setting");
        assert!(err.to_string().contains(field), "{err}");
    }

    #[test]
    fn rejects_duplicate_transformer() {
        let stage: Arc<dyn MessageTransformer> = Arc::new(|_: &mut MessageBuilder| true);
        let err = builder()
            .with_transformer(Arc::clone(&stage))
            .with_transformer(stage)
            .build()
            .expect_err("duplicate transformer");
        assert!(err.to_string().contains("already registered"), "{err}");
    }

    #[test]
    fn resolves_defaults_and_overrides() {
        let config = builder()
            .with_flush_queue_size(20)
            .with_unbounded_shutdown()
            .client_config();
        assert_eq!(config.flush_queue_size, 20);
        assert_eq!(config.shutdown_timeout, None);
        assert_eq!(config.flush_interval, ClientConfig::default().flush_interval);
    }

    #[test]
    fn http_config_uses_write_key_and_endpoint() {
        let config = AnalyticsBuilder::new("key")
            .with_endpoint("http://localhost:9000")
            .with_header("X-Env", "test")
            .http_config();
        assert_eq!(config.write_key, "key");
        assert_eq!(config.endpoint, "http://localhost:9000");
        assert_eq!(config.headers.get("X-Env").map(String::as_str), Some("test"));
    }

    #[test]
    fn builds_and_shuts_down() {
        let analytics = builder().build().expect("valid builder");
        let report = analytics.shutdown().expect("shutdown");
        assert!(report.is_complete());
    }
}
