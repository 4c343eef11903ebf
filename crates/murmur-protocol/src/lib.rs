//! # murmur-protocol
//!
//! Wire protocol definitions for the Murmur chat relay.
//!
//! Clients and the server exchange JSON text frames tagged by a `type` field.
//! This crate defines those events, the records exchanged with the external
//! bulletin-board store, and the codec that turns raw frames into events.
//!
//! ## Event Types
//!
//! - `new_message` - A chat message, sent by clients and broadcast by the server
//! - `error` - Sent by the server when a frame is rejected and the connection stays open
//!
//! ## Example
//!
//! ```rust
//! use murmur_protocol::{codec, ClientEvent, ServerEvent};
//!
//! let frame = br#"{"type":"new_message","username":"alice","message":"hi"}"#;
//! let event = codec::decode(frame).unwrap();
//! assert!(matches!(event, ClientEvent::NewMessage(_)));
//!
//! let outbound = codec::encode(&ServerEvent::new_message("alice", "hi")).unwrap();
//! assert!(outbound.contains("\"new_message\""));
//! ```

pub mod codec;
pub mod frames;
pub mod records;

pub use codec::{decode, decode_with_limit, encode, ProtocolError, MAX_FRAME_SIZE};
pub use frames::{error_codes, ClientEvent, NewMessage, ServerEvent, NEW_MESSAGE, UNKNOWN_ORIGIN};
pub use records::{ChatMessage, Post};
