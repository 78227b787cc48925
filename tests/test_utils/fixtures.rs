//! Shared builders and fixtures for integration tests.

use std::net::TcpListener;

use femtoanalytics::{Message, MessageBuilder};
use rstest::fixture;

/// A track builder identified as user `u`.
pub fn track(event: &str) -> MessageBuilder {
    MessageBuilder::track(event).user_id("u")
}

/// A finalized track message identified as user `u`.
pub fn message(event: &str) -> Message {
    track(event).build().expect("valid message")
}

#[fixture]
pub fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}
