//! # murmur-transport
//!
//! Transport abstraction layer for the Murmur chat relay.
//!
//! A session's transport is split into two halves:
//!
//! - **Outbound** - shared send half, owned by the connection registry once a
//!   session is admitted and used by every broadcast
//! - **Inbound** - receive half, owned by the session's own relay task
//!
//! Implementations:
//!
//! - **WebSocket** - axum WebSocket adapter (feature `websocket`, default)
//! - **Memory** - channel-backed sessions for tests and benchmarks
//!
//! ```rust,ignore
//! use murmur_transport::{Inbound, Outbound};
//!
//! async fn echo(outbound: &dyn Outbound, inbound: &mut dyn Inbound) {
//!     while let Ok(Some(frame)) = inbound.recv().await {
//!         let text = String::from_utf8_lossy(&frame);
//!         let _ = outbound.send_text(&text).await;
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Inbound, Outbound, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketInbound, WebSocketOutbound};
