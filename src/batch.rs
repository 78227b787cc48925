//! Ordered groups of messages sent in one transmission.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::message::Message;

/// Library identity reported in every payload's `context.library`.
pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// An insertion-ordered, size-bounded, immutable run of messages.
///
/// Sequence numbers increase in formation order, which is also the order in
/// which batches are submitted for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    sequence: u64,
    messages: Vec<Message>,
}

impl Batch {
    pub fn new(sequence: u64, messages: Vec<Message>) -> Self {
        Self { sequence, messages }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Wire form of this batch stamped with the given send time.
    pub fn payload(&self, sent_at: DateTime<Utc>) -> BatchPayload<'_> {
        BatchPayload {
            batch: &self.messages,
            sent_at,
            context: json!({
                "library": { "name": LIBRARY_NAME, "version": LIBRARY_VERSION }
            }),
        }
    }
}

/// Request body posted to the collection endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload<'a> {
    batch: &'a [Message],
    sent_at: DateTime<Utc>,
    context: Value,
}

impl BatchPayload<'_> {
    /// Serialize to the JSON request body.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::message::MessageBuilder;

    fn message(event: &str) -> Message {
        MessageBuilder::track(event)
            .user_id("u")
            .build()
            .expect("valid message")
    }

    #[test]
    fn payload_keeps_message_order() {
        let batch = Batch::new(3, vec![message("a"), message("b")]);
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid date");
        let body = batch.payload(sent_at).to_json().expect("serialize");
        let value: Value = serde_json::from_str(&body).expect("parse");

        let events: Vec<_> = value["batch"]
            .as_array()
            .expect("batch array")
            .iter()
            .map(|m| m["event"].as_str().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(events, ["a", "b"]);
        assert_eq!(value["sentAt"], "2024-05-01T12:00:00Z");
        assert_eq!(value["context"]["library"]["name"], LIBRARY_NAME);
        assert_eq!(batch.sequence(), 3);
        assert_eq!(batch.len(), 2);
    }
}
