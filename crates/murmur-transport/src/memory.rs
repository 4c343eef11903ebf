//! In-memory transport.
//!
//! Sessions backed by unbounded channels. The server side gets the usual
//! [`Outbound`] / [`Inbound`] halves, the test or benchmark drives the other
//! end through a [`MemoryPeer`].

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::traits::{Inbound, Outbound, TransportError};

/// Create a connected in-memory session.
#[must_use]
pub fn channel() -> (MemoryOutbound, MemoryInbound, MemoryPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();

    let outbound = MemoryOutbound {
        tx: Some(to_peer),
        is_open: AtomicBool::new(true),
    };
    let inbound = MemoryInbound { rx: from_peer };
    let peer = MemoryPeer {
        tx: Some(to_server),
        rx: from_server,
    };
    (outbound, inbound, peer)
}

/// An outbound half whose sends always fail.
#[must_use]
pub fn failing() -> MemoryOutbound {
    MemoryOutbound {
        tx: None,
        is_open: AtomicBool::new(true),
    }
}

/// The server's send half of an in-memory session.
pub struct MemoryOutbound {
    tx: Option<mpsc::UnboundedSender<String>>,
    is_open: AtomicBool,
}

#[async_trait]
impl Outbound for MemoryOutbound {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let Some(tx) = &self.tx else {
            return Err(TransportError::SendFailed("peer unreachable".into()));
        };
        tx.send(text.to_owned()).map_err(|_| {
            self.is_open.store(false, Ordering::SeqCst);
            TransportError::SendFailed("peer dropped".into())
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// The server's receive half of an in-memory session.
pub struct MemoryInbound {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl Inbound for MemoryInbound {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// The client end of an in-memory session.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Send a frame to the server. Returns `false` once the session is gone.
    pub fn send(&self, frame: impl Into<Bytes>) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Close the client side; the server's next `recv` returns `None`.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Wait for the next frame from the server.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a frame from the server if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued frame.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let (outbound, mut inbound, mut peer) = channel();

        assert!(peer.send("hello"));
        assert_eq!(inbound.recv().await.unwrap().unwrap(), Bytes::from("hello"));

        outbound.send_text("world").await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_hang_up_ends_inbound() {
        let (_outbound, mut inbound, mut peer) = channel();
        peer.hang_up();
        assert!(inbound.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (outbound, _inbound, peer) = channel();
        drop(peer);
        assert!(matches!(
            outbound.send_text("x").await,
            Err(TransportError::SendFailed(_))
        ));
        assert!(matches!(
            outbound.send_text("x").await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_failing_outbound() {
        let outbound = failing();
        assert!(matches!(
            outbound.send_text("x").await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_outbound_rejects_sends() {
        let (outbound, _inbound, _peer) = channel();
        outbound.close().await.unwrap();
        assert!(matches!(
            outbound.send_text("x").await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
