//! Codec for decoding client frames and encoding server events.
//!
//! Frames are single JSON objects carried in WebSocket text (or binary)
//! messages. Decoding validates the shape of `new_message` events and
//! classifies every other `type` tag as unknown rather than failing.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::frames::{ClientEvent, NewMessage, ServerEvent, NEW_MESSAGE};

/// Default maximum frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Limit in effect.
        max: usize,
    },

    /// Frame is not valid JSON, or an event failed to serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Frame has no `type` field.
    #[error("Frame has no type field")]
    MissingType,

    /// A required field is absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong JSON type.
    #[error("Invalid field: {0} must be a string")]
    InvalidField(&'static str),
}

/// Decode a client frame no larger than [`MAX_FRAME_SIZE`].
///
/// # Errors
///
/// Returns an error if the frame is too large, is not a JSON object, has no
/// `type`, or is a `new_message` event missing `username` or `message`.
pub fn decode(data: &[u8]) -> Result<ClientEvent, ProtocolError> {
    decode_with_limit(data, MAX_FRAME_SIZE)
}

/// Decode a client frame no larger than `max_size` bytes.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_limit(data: &[u8], max_size: usize) -> Result<ClientEvent, ProtocolError> {
    if data.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    let Value::Object(mut fields) = serde_json::from_slice::<Value>(data)? else {
        return Err(ProtocolError::NotAnObject);
    };

    let tag = fields.remove("type").ok_or(ProtocolError::MissingType)?;
    match tag {
        Value::String(tag) if tag == NEW_MESSAGE => {
            let username = take_string(&mut fields, "username")?;
            let message = take_string(&mut fields, "message")?;
            let ip = match fields.remove("ip") {
                None | Some(Value::Null) => None,
                Some(Value::String(ip)) => Some(ip),
                Some(_) => return Err(ProtocolError::InvalidField("ip")),
            };
            Ok(ClientEvent::NewMessage(NewMessage {
                username,
                message,
                ip,
            }))
        }
        Value::String(tag) => Ok(ClientEvent::Unknown(tag)),
        other => Ok(ClientEvent::Unknown(other.to_string())),
    }
}

fn take_string(fields: &mut Map<String, Value>, name: &'static str) -> Result<String, ProtocolError> {
    match fields.remove(name) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(ProtocolError::InvalidField(name)),
        None => Err(ProtocolError::MissingField(name)),
    }
}

/// Encode a server event as a JSON text frame.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    Ok(text)
}
