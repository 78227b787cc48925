//! INI file configuration.
//!
//! Reads an `[analytics]` section into an [`AnalyticsBuilder`]. Durations are
//! given in milliseconds; `shutdown_timeout_ms = 0` disables the shutdown
//! deadline. Injected collaborators (transport, log, transformers) are added
//! to the returned builder in code.
//!
//! ```ini
//! [analytics]
//! write_key = abc123
//! flush_queue_size = 100
//! flush_interval_ms = 5000
//! overflow = timeout:250
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::builder::AnalyticsBuilder;
use crate::client::OverflowPolicy;

/// Section holding the client settings.
pub const SECTION: &str = "analytics";

const KNOWN_KEYS: &[&str] = &[
    "write_key",
    "endpoint",
    "flush_queue_size",
    "flush_interval_ms",
    "queue_capacity",
    "overflow",
    "delivery_workers",
    "max_pending_batches",
    "shutdown_timeout_ms",
    "flush_timeout_ms",
    "connect_timeout_ms",
    "request_timeout_ms",
    "thread_name_prefix",
];

/// Failures while loading file configuration.
#[derive(Debug, Error)]
pub enum FileConfigError {
    #[error("{0} doesn't exist")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is invalid: {message}")]
    Parse { path: String, message: String },
    #[error("missing [analytics] section")]
    MissingSection,
    #[error("missing required key {0:?}")]
    MissingKey(&'static str),
    #[error("unknown key {0:?}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Load the `[analytics]` section of the file at `path`.
///
/// # Errors
///
/// Returns [`FileConfigError`] when the file cannot be read or parsed, or a
/// key is missing, unknown, or malformed.
pub fn from_ini_file(path: impl AsRef<Path>) -> Result<AnalyticsBuilder, FileConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => FileConfigError::NotFound(display.clone()),
        _ => FileConfigError::Io {
            path: display.clone(),
            source,
        },
    })?;
    parse(&display, &text)
}

/// Load the `[analytics]` section from INI text.
///
/// # Errors
///
/// See [`from_ini_file`].
pub fn from_ini_str(text: &str) -> Result<AnalyticsBuilder, FileConfigError> {
    parse("<string>", text)
}

fn parse(path: &str, text: &str) -> Result<AnalyticsBuilder, FileConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| FileConfigError::Parse {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    let section = ini
        .section(Some(SECTION))
        .ok_or(FileConfigError::MissingSection)?;
    apply(section)
}

fn apply(section: &Properties) -> Result<AnalyticsBuilder, FileConfigError> {
    if let Some((key, _)) = section.iter().find(|(k, _)| !KNOWN_KEYS.contains(k)) {
        return Err(FileConfigError::UnknownKey(key.to_owned()));
    }
    let write_key = section
        .get("write_key")
        .ok_or(FileConfigError::MissingKey("write_key"))?;
    let mut builder = AnalyticsBuilder::new(write_key);

    if let Some(endpoint) = section.get("endpoint") {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(size) = number(section, "flush_queue_size")? {
        builder = builder.with_flush_queue_size(size);
    }
    if let Some(interval) = millis(section, "flush_interval_ms")? {
        builder = builder.with_flush_interval(interval);
    }
    if let Some(capacity) = number(section, "queue_capacity")? {
        builder = builder.with_queue_capacity(capacity);
    }
    if let Some(raw) = section.get("overflow") {
        builder = builder.with_overflow_policy(parse_overflow(raw)?);
    }
    if let Some(workers) = number(section, "delivery_workers")? {
        builder = builder.with_delivery_workers(workers);
    }
    if let Some(pending) = number(section, "max_pending_batches")? {
        builder = builder.with_max_pending_batches(pending);
    }
    match millis(section, "shutdown_timeout_ms")? {
        Some(Duration::ZERO) => builder = builder.with_unbounded_shutdown(),
        Some(timeout) => builder = builder.with_shutdown_timeout(timeout),
        None => {}
    }
    if let Some(timeout) = millis(section, "flush_timeout_ms")? {
        builder = builder.with_flush_timeout(timeout);
    }
    if let Some(timeout) = millis(section, "connect_timeout_ms")? {
        builder = builder.with_connect_timeout(timeout);
    }
    if let Some(timeout) = millis(section, "request_timeout_ms")? {
        builder = builder.with_request_timeout(timeout);
    }
    if let Some(prefix) = section.get("thread_name_prefix") {
        builder = builder.with_thread_name_prefix(prefix);
    }
    Ok(builder)
}

fn invalid(key: &str, value: &str) -> FileConfigError {
    FileConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn number<T: FromStr>(section: &Properties, key: &str) -> Result<Option<T>, FileConfigError> {
    section
        .get(key)
        .map(|raw| raw.trim().parse().map_err(|_| invalid(key, raw)))
        .transpose()
}

fn millis(section: &Properties, key: &str) -> Result<Option<Duration>, FileConfigError> {
    Ok(number::<u64>(section, key)?.map(Duration::from_millis))
}

/// Parse `drop` or `timeout:<ms>`.
fn parse_overflow(raw: &str) -> Result<OverflowPolicy, FileConfigError> {
    let value = raw.trim().to_ascii_lowercase();
    if value == "drop" {
        return Ok(OverflowPolicy::Drop);
    }
    value
        .strip_prefix("timeout:")
        .and_then(|ms| ms.trim().parse::<u64>().ok())
        .map(|ms| OverflowPolicy::Timeout(Duration::from_millis(ms)))
        .ok_or_else(|| invalid("overflow", raw))
}
