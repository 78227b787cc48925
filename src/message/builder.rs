//! Builder for [`Message`] values.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::{Message, MessageKind};

/// Reasons a builder cannot be finalized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Neither a user id nor an anonymous id was supplied.
    #[error("either user_id or anonymous_id must be set")]
    MissingIdentity,
    /// A required type-specific field was blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Mutable, pre-enqueue form of a [`Message`].
///
/// Transformers receive `&mut MessageBuilder` and may use the `set_*` and
/// `*_mut` accessors to adjust it before it is finalized.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    kind: MessageKind,
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    user_id: Option<String>,
    anonymous_id: Option<String>,
    properties: Map<String, Value>,
    traits: Map<String, Value>,
    context: Map<String, Value>,
    integrations: Map<String, Value>,
}

macro_rules! map_insert {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, key: impl Into<String>, value: Value) -> Self {
            self.$field.insert(key.into(), value);
            self
        }
    };
}

impl MessageBuilder {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            message_id: None,
            timestamp: None,
            user_id: None,
            anonymous_id: None,
            properties: Map::new(),
            traits: Map::new(),
            context: Map::new(),
            integrations: Map::new(),
        }
    }

    /// Start an `identify` message.
    pub fn identify() -> Self {
        Self::new(MessageKind::Identify)
    }

    /// Start a `track` message for the named event.
    pub fn track(event: impl Into<String>) -> Self {
        Self::new(MessageKind::Track {
            event: event.into(),
        })
    }

    /// Start a `page` message, optionally named.
    pub fn page(name: Option<impl Into<String>>) -> Self {
        Self::new(MessageKind::Page {
            name: name.map(Into::into),
        })
    }

    /// Start a `screen` message, optionally named.
    pub fn screen(name: Option<impl Into<String>>) -> Self {
        Self::new(MessageKind::Screen {
            name: name.map(Into::into),
        })
    }

    /// Start a `group` message associating the user with `group_id`.
    pub fn group(group_id: impl Into<String>) -> Self {
        Self::new(MessageKind::Group {
            group_id: group_id.into(),
        })
    }

    /// Start an `alias` message merging `previous_id` into the user id.
    pub fn alias(previous_id: impl Into<String>) -> Self {
        Self::new(MessageKind::Alias {
            previous_id: previous_id.into(),
        })
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn anonymous_id(mut self, anonymous_id: impl Into<String>) -> Self {
        self.anonymous_id = Some(anonymous_id.into());
        self
    }

    /// Override the generated message id.
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Override the event time. Defaults to the time of [`build`](Self::build).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    map_insert!(
        #[doc = "Add a property (track, page, screen)."]
        property,
        properties
    );
    map_insert!(
        #[doc = "Add a trait (identify, group)."]
        with_trait,
        traits
    );
    map_insert!(
        #[doc = "Add a context entry."]
        context,
        context
    );

    /// Enable or disable delivery to a named downstream integration.
    pub fn integration(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.integrations.insert(name.into(), Value::Bool(enabled));
        self
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn get_user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn get_anonymous_id(&self) -> Option<&str> {
        self.anonymous_id.as_deref()
    }

    pub fn set_user_id(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    pub fn set_anonymous_id(&mut self, anonymous_id: Option<String>) {
        self.anonymous_id = anonymous_id;
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = Some(timestamp);
    }

    pub fn properties_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.properties
    }

    pub fn traits_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.traits
    }

    pub fn context_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.context
    }

    pub fn integrations_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.integrations
    }

    fn validate(&self) -> Result<(), MessageError> {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());
        if blank(&self.user_id) && blank(&self.anonymous_id) {
            return Err(MessageError::MissingIdentity);
        }
        match &self.kind {
            MessageKind::Track { event } if event.trim().is_empty() => {
                Err(MessageError::EmptyField("event"))
            }
            MessageKind::Group { group_id } if group_id.trim().is_empty() => {
                Err(MessageError::EmptyField("group_id"))
            }
            MessageKind::Alias { previous_id } if previous_id.trim().is_empty() => {
                Err(MessageError::EmptyField("previous_id"))
            }
            MessageKind::Alias { .. } if blank(&self.user_id) => {
                Err(MessageError::EmptyField("user_id"))
            }
            _ => Ok(()),
        }
    }

    /// Finalize into an immutable [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when no identity is set or a required
    /// type-specific field is blank.
    pub fn build(self) -> Result<Message, MessageError> {
        self.validate()?;
        Ok(Message {
            kind: self.kind,
            message_id: self
                .message_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            user_id: self.user_id,
            anonymous_id: self.anonymous_id,
            properties: self.properties,
            traits: self.traits,
            context: self.context,
            integrations: self.integrations,
        })
    }
}
