//! Event records handed to the client.
//!
//! A [`Message`] is immutable once built. Callers assemble one with a
//! [`MessageBuilder`], transformers may adjust the builder, and the final
//! value is moved into the queue. Serialization produces the camel-cased,
//! type-tagged JSON objects the collection endpoint expects:
//!
//! ```json
//! {"type":"track","event":"Signed Up","messageId":"…","timestamp":"…",
//!  "userId":"u-1","properties":{"plan":"pro"}}
//! ```

mod builder;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub use builder::{MessageBuilder, MessageError};

/// Type-specific part of a message, serialized under the `type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Identify,
    Track {
        event: String,
    },
    Page {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Screen {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    Alias {
        #[serde(rename = "previousId")]
        previous_id: String,
    },
}

impl MessageKind {
    /// Wire name of the type tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::Track { .. } => "track",
            Self::Page { .. } => "page",
            Self::Screen { .. } => "screen",
            Self::Group { .. } => "group",
            Self::Alias { .. } => "alias",
        }
    }
}

/// One immutable event record destined for the remote endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(flatten)]
    kind: MessageKind,
    message_id: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anonymous_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    traits: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    context: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    integrations: Map<String, Value>,
}

impl Message {
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        self.anonymous_id.as_deref()
    }

    /// Properties attached to `track`, `page`, and `screen` messages.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Traits attached to `identify` and `group` messages.
    pub fn traits(&self) -> &Map<String, Value> {
        &self.traits
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn integrations(&self) -> &Map<String, Value> {
        &self.integrations
    }
}
