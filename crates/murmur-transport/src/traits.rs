//! Transport abstraction traits for Murmur.
//!
//! These traits define the interface that every session transport provides,
//! allowing the registry and relay to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport-level handshake failed; the session was never admitted.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound frame exceeds the configured limit.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The send half of a session.
///
/// Outbound handles are shared behind `Arc` so the registry can deliver
/// broadcasts while the session's own task keeps reading.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a text frame.
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Close the session gracefully. Closing twice is not an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// The receive half of a session.
#[async_trait]
pub trait Inbound: Send {
    /// Receive the next data frame.
    ///
    /// Returns `None` if the session was closed cleanly. Control frames are
    /// handled by the transport and never returned.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;
}
