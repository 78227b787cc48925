//! Diagnostic sinks for engine events.
//!
//! The engine never writes to a global logger directly. Instead it reports
//! transformer skips, batch formation, delivery outcomes, and shutdown
//! progress to an injected [`EventLog`]. The default sink discards
//! everything; [`LogFacade`] forwards to the `log` crate and, with the
//! `tracing-compat` feature, [`TracingLog`] emits `tracing` events.

use std::fmt;

/// Severity attached to engine diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Per-message chatter such as transformer skips and request traces.
    Verbose,
    /// Batch formation, delivery success, and lifecycle progress.
    Debug,
    /// Delivery failures and dropped messages.
    Error,
}

impl LogLevel {
    /// Upper-case label used by the bundled sinks.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability the engine uses to report what it is doing.
///
/// Implementations are invoked synchronously from producer, dispatcher, and
/// delivery threads, so they must be cheap and must not call back into the
/// client.
pub trait EventLog: Send + Sync {
    fn print(&self, level: LogLevel, args: fmt::Arguments<'_>);
}

/// Sink that discards every line. Used when no log is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLog;

impl EventLog for NoopLog {
    fn print(&self, _level: LogLevel, _args: fmt::Arguments<'_>) {}
}

/// Target used by [`LogFacade`] so applications can filter engine output.
pub const LOG_TARGET: &str = "femtoanalytics";

/// Forwards engine diagnostics to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFacade;

impl EventLog for LogFacade {
    fn print(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let level = match level {
            LogLevel::Verbose => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Error => log::Level::Error,
        };
        log::log!(target: LOG_TARGET, level, "{args}");
    }
}

/// Forwards engine diagnostics as `tracing` events.
#[cfg(feature = "tracing-compat")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

#[cfg(feature = "tracing-compat")]
impl EventLog for TracingLog {
    fn print(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        match level {
            LogLevel::Verbose => tracing::trace!(target: "femtoanalytics", "{args}"),
            LogLevel::Debug => tracing::debug!(target: "femtoanalytics", "{args}"),
            LogLevel::Error => tracing::error!(target: "femtoanalytics", "{args}"),
        }
    }
}

/// Emit a formatted line on an [`EventLog`] at the named level.
macro_rules! emit {
    ($log:expr, $level:ident, $($arg:tt)+) => {
        $log.print($crate::log_sink::LogLevel::$level, format_args!($($arg)+))
    };
}

pub(crate) use emit;

#[cfg(test)]
mod tests {
    use super::*;
    use logtest::Logger;
    use serial_test::serial;

    #[test]
    #[serial]
    fn log_facade_maps_levels() {
        let mut logger = Logger::start();
        LogFacade.print(LogLevel::Error, format_args!("batch {} failed", 7));
        LogFacade.print(LogLevel::Debug, format_args!("formed batch"));

        let first = logger.pop().expect("error record");
        assert_eq!(first.level(), log::Level::Error);
        assert_eq!(first.target(), LOG_TARGET);
        assert_eq!(first.args(), "batch 7 failed");

        let second = logger.pop().expect("debug record");
        assert_eq!(second.level(), log::Level::Debug);
    }

    #[cfg(feature = "tracing-compat")]
    mod tracing_compat {
        use std::sync::Arc;

        use parking_lot::Mutex;
        use tracing::field::{Field, Visit};
        use tracing::{Event, Level, Subscriber};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        use super::super::*;

        type Records = Arc<Mutex<Vec<(Level, String, String)>>>;

        struct Capture(Records);

        struct MessageField(String);

        impl Visit for MessageField {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        impl<S: Subscriber> Layer<S> for Capture {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let mut message = MessageField(String::new());
                event.record(&mut message);
                let meta = event.metadata();
                self.0
                    .lock()
                    .push((*meta.level(), meta.target().to_owned(), message.0));
            }
        }

        #[test]
        fn tracing_log_maps_levels() {
            let records = Records::default();
            let subscriber = tracing_subscriber::registry().with(Capture(Arc::clone(&records)));
            tracing::subscriber::with_default(subscriber, || {
                emit!(TracingLog, Error, "batch {} failed", 7);
                emit!(TracingLog, Debug, "formed batch");
                emit!(TracingLog, Verbose, "skipping message");
            });

            let records = records.lock();
            let levels: Vec<_> = records.iter().map(|(level, _, _)| *level).collect();
            assert_eq!(levels, [Level::ERROR, Level::DEBUG, Level::TRACE]);
            assert!(records.iter().all(|(_, target, _)| target == LOG_TARGET));
            assert_eq!(records[0].2, "batch 7 failed");
        }
    }

    #[test]
    fn noop_log_accepts_everything() {
        emit!(NoopLog, Verbose, "ignored {}", 1);
    }

    #[test]
    fn level_labels() {
        assert_eq!(LogLevel::Verbose.to_string(), "VERBOSE");
        assert_eq!(LogLevel::Error.as_str(), "ERROR");
    }
}
