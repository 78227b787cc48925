//! Test helpers shared by unit and integration tests.
//!
//! Compiled for unit tests and behind the `test-util` feature, which the
//! crate enables on itself as a dev-dependency so integration tests can use
//! the same helpers.

mod collecting_log;
mod recording_transport;

pub use collecting_log::CollectingLog;
pub use recording_transport::RecordingTransport;
