//! WebSocket transport implementation.
//!
//! This module adapts an upgraded axum [`WebSocket`] into the [`Outbound`] and
//! [`Inbound`] session halves.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::traits::{Inbound, Outbound, TransportError};

/// Split an upgraded WebSocket into its session halves.
#[must_use]
pub fn split(
    socket: WebSocket,
    max_message_size: usize,
) -> (WebSocketOutbound, WebSocketInbound) {
    let (sink, stream) = socket.split();
    let outbound = WebSocketOutbound {
        sink: Mutex::new(sink),
        is_open: AtomicBool::new(true),
    };
    let inbound = WebSocketInbound {
        stream,
        max_message_size,
    };
    (outbound, inbound)
}

/// The send half of a WebSocket session.
pub struct WebSocketOutbound {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    is_open: AtomicBool,
}

#[async_trait]
impl Outbound for WebSocketOutbound {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(text.to_owned())).await {
            self.is_open.store(false, Ordering::SeqCst);
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}

/// The receive half of a WebSocket session.
pub struct WebSocketInbound {
    stream: SplitStream<WebSocket>,
    max_message_size: usize,
}

impl WebSocketInbound {
    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {})",
                size, self.max_message_size
            );
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Inbound for WebSocketInbound {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(Bytes::from(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    // Binary frames carry the same JSON as text frames
                    self.check_size(data.len())?;
                    return Ok(Some(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by the WebSocket layer itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
