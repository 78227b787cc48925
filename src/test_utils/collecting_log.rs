//! A log sink that accumulates lines in memory for test assertions.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::log_sink::{EventLog, LogLevel};

/// Sink that stores every line it receives for later inspection.
#[derive(Clone, Default)]
pub struct CollectingLog {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CollectingLog {
    /// Create a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all lines received so far.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Lines emitted at `level`.
    pub fn at_level(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Number of lines containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.count_containing(needle) > 0
    }
}

impl EventLog for CollectingLog {
    fn print(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        self.lines.lock().push((level, args.to_string()));
    }
}

impl fmt::Debug for CollectingLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingLog")
            .field("lines", &self.lines.lock().len())
            .finish()
    }
}
