//! Event types for the Murmur protocol.
//!
//! Events are the fundamental unit of communication between chat clients
//! and the relay. Every event is a JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};

use crate::records::Post;

/// Tag of the only event clients may send.
pub const NEW_MESSAGE: &str = "new_message";

/// Origin address recorded when a client does not report one.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Error codes carried by [`ServerEvent::Error`].
pub mod error_codes {
    /// The frame could not be decoded or failed field validation.
    pub const MALFORMED_EVENT: u16 = 1001;
    /// The external store rejected or did not answer the persist call.
    pub const STORE_UNAVAILABLE: u16 = 1503;
}

/// A chat message submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Display name of the author.
    pub username: String,
    /// Message text.
    pub message: String,
    /// Address the client reports for itself, forwarded to the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl NewMessage {
    /// Create a message without an origin address.
    #[must_use]
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            ip: None,
        }
    }

    /// Attach the client-reported origin address.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// The origin address, or [`UNKNOWN_ORIGIN`] when the client sent none.
    #[must_use]
    pub fn origin_address(&self) -> &str {
        self.ip.as_deref().unwrap_or(UNKNOWN_ORIGIN)
    }

    /// The record to persist in the external store.
    #[must_use]
    pub fn to_post(&self) -> Post {
        Post {
            name: self.username.clone(),
            body: self.message.clone(),
        }
    }

    /// The event broadcast to every session once the message is persisted.
    #[must_use]
    pub fn into_broadcast(self) -> ServerEvent {
        ServerEvent::NewMessage {
            username: self.username,
            message: self.message,
        }
    }
}

/// An event decoded from a client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A `new_message` event.
    NewMessage(NewMessage),
    /// Any other `type` tag. The tag is kept for logging only.
    Unknown(String),
}

impl ClientEvent {
    /// Get the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            ClientEvent::NewMessage(_) => NEW_MESSAGE,
            ClientEvent::Unknown(tag) => tag,
        }
    }
}

/// An event sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A persisted chat message, fanned out to every session.
    #[serde(rename = "new_message")]
    NewMessage {
        /// Display name of the author.
        username: String,
        /// Message text.
        message: String,
    },

    /// A rejected frame. Only sent when the relay keeps connections open on error.
    #[serde(rename = "error")]
    Error {
        /// Error code, see [`error_codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },
}

impl ServerEvent {
    /// Create a new `new_message` event.
    #[must_use]
    pub fn new_message(username: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::NewMessage {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Create a new `error` event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    /// Get the event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => NEW_MESSAGE,
            ServerEvent::Error { .. } => "error",
        }
    }
}
