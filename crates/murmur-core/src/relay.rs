//! Per-connection message relay.
//!
//! Each admitted session runs [`Relay::run`] on its own task. The loop reads
//! one frame at a time and finishes dispatching it (persist, then broadcast)
//! before reading the next, so frames from one session are handled strictly
//! in arrival order.

use crate::metrics;
use crate::registry::{Broadcaster, BroadcastReport};
use crate::session::SessionId;
use crate::store::{MessageStore, StoreError};
use murmur_protocol::{codec, error_codes, ClientEvent, Post, ProtocolError, ServerEvent};
use murmur_transport::{Inbound, Outbound, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// What the relay does when a frame is malformed or cannot be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// End the connection.
    #[default]
    Close,
    /// Send an `error` event to the session and keep reading.
    Report,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Reaction to malformed frames and store failures.
    pub error_policy: ErrorPolicy,
    /// Upper bound for one persist call.
    pub store_timeout: Duration,
    /// Largest inbound frame the codec accepts.
    pub max_frame_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Close,
            store_timeout: Duration::from_secs(5),
            max_frame_size: codec::MAX_FRAME_SIZE,
        }
    }
}

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The frame failed to decode or validate.
    #[error("Malformed event: {0}")]
    Malformed(#[from] ProtocolError),

    /// The store did not persist the message; nothing was broadcast.
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The session's own transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RelayError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Malformed(_) => "malformed_event",
            RelayError::Store(_) => "store_unavailable",
            RelayError::Transport(_) => "transport",
        }
    }

    /// The event reported to the client, for errors a session can survive.
    #[must_use]
    pub fn to_event(&self) -> Option<ServerEvent> {
        match self {
            RelayError::Malformed(e) => Some(ServerEvent::error(
                error_codes::MALFORMED_EVENT,
                e.to_string(),
            )),
            RelayError::Store(e) => Some(ServerEvent::error(
                error_codes::STORE_UNAVAILABLE,
                e.to_string(),
            )),
            RelayError::Transport(_) => None,
        }
    }
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The message was persisted and broadcast.
    Broadcast(BroadcastReport),
    /// The event type is not handled; nothing happened.
    Ignored(String),
}

/// Classifies inbound events, persists messages and broadcasts them.
#[derive(Clone)]
pub struct Relay {
    broadcaster: Arc<dyn Broadcaster>,
    store: Arc<dyn MessageStore>,
    config: RelayConfig,
}

impl Relay {
    /// Create a new relay.
    #[must_use]
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        store: Arc<dyn MessageStore>,
        config: RelayConfig,
    ) -> Self {
        Self {
            broadcaster,
            store,
            config,
        }
    }

    /// Run the receive loop of an admitted session until it closes.
    ///
    /// The session is evicted from the registry before this returns, whether
    /// it closed cleanly or failed.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the session. A clean close is `Ok`.
    pub async fn run(
        &self,
        session: SessionId,
        inbound: &mut dyn Inbound,
        outbound: &dyn Outbound,
    ) -> Result<(), RelayError> {
        let result = self.receive_loop(session, inbound, outbound).await;
        self.broadcaster.evict(session);

        match &result {
            Ok(()) => debug!(session = %session, "Session closed"),
            Err(e) => {
                warn!(session = %session, error = %e, "Session terminated");
                metrics::record_error(e.kind());
            }
        }
        result
    }

    async fn receive_loop(
        &self,
        session: SessionId,
        inbound: &mut dyn Inbound,
        outbound: &dyn Outbound,
    ) -> Result<(), RelayError> {
        while let Some(frame) = inbound.recv().await? {
            metrics::record_message(frame.len(), "inbound");

            match self.dispatch(&frame).await {
                Ok(Dispatched::Broadcast(report)) => {
                    trace!(
                        session = %session,
                        delivered = report.delivered,
                        evicted = report.evicted.len(),
                        "Relayed message"
                    );
                }
                Ok(Dispatched::Ignored(event_type)) => {
                    debug!(session = %session, event_type = %event_type, "Ignoring unhandled event type");
                }
                Err(e) => {
                    let event = match (self.config.error_policy, e.to_event()) {
                        (ErrorPolicy::Report, Some(event)) => event,
                        _ => return Err(e),
                    };
                    warn!(session = %session, error = %e, "Rejected frame");
                    metrics::record_error(e.kind());
                    outbound.send_text(&codec::encode(&event)?).await?;
                }
            }
        }
        Ok(())
    }

    /// Handle one raw frame.
    ///
    /// A `new_message` is persisted first and broadcast exactly once after
    /// the store accepted it. Any other event type is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed or the store call fails;
    /// in both cases nothing is broadcast.
    pub async fn dispatch(&self, frame: &[u8]) -> Result<Dispatched, RelayError> {
        match codec::decode_with_limit(frame, self.config.max_frame_size)? {
            ClientEvent::NewMessage(message) => {
                let post = message.to_post();
                self.persist(message.origin_address(), &post).await?;

                let report = self
                    .broadcaster
                    .broadcast_all(&message.into_broadcast())
                    .await;
                Ok(Dispatched::Broadcast(report))
            }
            ClientEvent::Unknown(event_type) => Ok(Dispatched::Ignored(event_type)),
        }
    }

    async fn persist(&self, origin_address: &str, post: &Post) -> Result<(), StoreError> {
        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.config.store_timeout, self.store.persist(origin_address, post))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };

        if let Err(e) = &result {
            warn!(
                origin = %origin_address,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Failed to persist message"
            );
        }
        result
    }
}
