//! Connection registry for Murmur.
//!
//! The registry owns the outbound half of every live session and fans
//! server events out to all of them.

use crate::metrics;
use crate::session::{SessionId, SessionIdGenerator};
use async_trait::async_trait;
use dashmap::DashMap;
use murmur_protocol::{codec, ServerEvent};
use murmur_transport::Outbound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Maximum sessions reached.
    #[error("Maximum sessions reached ({0})")]
    CapacityExceeded(usize),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Upper bound for a single send during a broadcast.
    pub send_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100_000,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that were live when the broadcast started.
    pub recipients: usize,
    /// Sessions the event was delivered to.
    pub delivered: usize,
    /// Sessions evicted because their send failed.
    pub evicted: Vec<SessionId>,
}

/// Fan-out side of the registry, as seen by the relay.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver an event to every live session, evicting the ones that fail.
    async fn broadcast_all(&self, event: &ServerEvent) -> BroadcastReport;

    /// Remove a session. Returns `false` if it was not registered.
    fn evict(&self, session: SessionId) -> bool;
}

/// The set of live sessions.
///
/// Admission, eviction and broadcast may run concurrently from any number of
/// connection tasks.
pub struct Registry {
    /// Outbound halves indexed by session.
    sessions: DashMap<SessionId, Arc<dyn Outbound>>,
    /// Number of admitted sessions, used to enforce the capacity.
    active: AtomicUsize,
    ids: SessionIdGenerator,
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            sessions: DashMap::new(),
            active: AtomicUsize::new(0),
            ids: SessionIdGenerator::default(),
            config,
        }
    }

    /// Admit a session whose handshake has completed.
    ///
    /// The session is visible to every broadcast that starts after this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is full.
    pub fn admit(&self, outbound: Arc<dyn Outbound>) -> Result<SessionId, RegistryError> {
        let max = self.config.max_sessions;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| RegistryError::CapacityExceeded(max))?;

        let id = self.ids.next();
        self.sessions.insert(id, outbound);
        metrics::set_registered_sessions(self.len());

        debug!(session = %id, sessions = self.len(), "Session admitted");
        Ok(id)
    }

    /// Remove a session. Removing an absent session is a no-op.
    pub fn evict(&self, session: SessionId) -> bool {
        let removed = self.sessions.remove(&session).is_some();
        if removed {
            self.active.fetch_sub(1, Ordering::SeqCst);
            metrics::set_registered_sessions(self.len());
            debug!(session = %session, sessions = self.len(), "Session evicted");
        }
        removed
    }

    /// Serialize `event` once and send it to every live session.
    ///
    /// Sessions are visited in admission order. A failed or timed-out send
    /// marks the session dead; dead sessions are evicted and closed after the
    /// sweep, so a failure never prevents delivery to the others.
    pub async fn broadcast_all(&self, event: &ServerEvent) -> BroadcastReport {
        let text = match codec::encode(event) {
            Ok(text) => text,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "Failed to serialize event");
                return BroadcastReport::default();
            }
        };

        let sessions = self.snapshot();
        let mut report = BroadcastReport {
            recipients: sessions.len(),
            ..BroadcastReport::default()
        };

        for (id, outbound) in &sessions {
            match tokio::time::timeout(self.config.send_timeout, outbound.send_text(&text)).await {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    debug!(session = %id, error = %e, "Send failed, marking session dead");
                    report.evicted.push(*id);
                }
                Err(_) => {
                    debug!(session = %id, "Send timed out, marking session dead");
                    report.evicted.push(*id);
                }
            }
        }
        metrics::record_message(text.len() * report.delivered, "outbound");

        let close_timeout = self.config.send_timeout;
        for (id, outbound) in sessions {
            if report.evicted.contains(&id) {
                self.evict(id);
                // A stalled peer never drains the close frame either
                tokio::spawn(async move {
                    if tokio::time::timeout(close_timeout, outbound.close())
                        .await
                        .is_err()
                    {
                        debug!(session = %id, "Close timed out, dropping session");
                    }
                });
            }
        }
        if !report.evicted.is_empty() {
            warn!(evicted = report.evicted.len(), "Evicted dead sessions during broadcast");
            metrics::record_evictions(report.evicted.len());
        }

        trace!(
            event_type = event.event_type(),
            recipients = report.recipients,
            delivered = report.delivered,
            "Broadcast event"
        );
        report
    }

    /// Live sessions in admission order.
    fn snapshot(&self) -> Vec<(SessionId, Arc<dyn Outbound>)> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        sessions.sort_unstable_by_key(|(id, _)| *id);
        sessions
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn contains(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Registered sessions in admission order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for Registry {
    async fn broadcast_all(&self, event: &ServerEvent) -> BroadcastReport {
        Registry::broadcast_all(self, event).await
    }

    fn evict(&self, session: SessionId) -> bool {
        Registry::evict(self, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_transport::memory::{self, MemoryPeer};
    use murmur_transport::TransportError;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;

    fn admit_peer(registry: &Registry) -> (SessionId, MemoryPeer) {
        let (outbound, _inbound, peer) = memory::channel();
        let id = registry.admit(Arc::new(outbound)).unwrap();
        (id, peer)
    }

    /// An outbound that never completes a send or a close.
    ///
    /// `close_abandoned` is set once a pending close is dropped.
    #[derive(Default)]
    struct StalledOutbound {
        close_abandoned: Arc<AtomicBool>,
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Outbound for StalledOutbound {
        async fn send_text(&self, _text: &str) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&self) -> Result<(), TransportError> {
            let _flag = DropFlag(self.close_abandoned.clone());
            std::future::pending().await
        }
    }

    #[test]
    fn test_admit_evict() {
        let registry = Registry::new();

        let (id, _peer) = admit_peer(&registry);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        assert!(registry.evict(id));
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let registry = Registry::new();
        let (id, _peer) = admit_peer(&registry);
        let (other, _other_peer) = admit_peer(&registry);

        assert!(registry.evict(id));
        assert!(!registry.evict(id));
        assert!(!registry.evict(id));
        assert_eq!(registry.session_ids(), vec![other]);
    }

    #[test]
    fn test_capacity() {
        let registry = Registry::with_config(RegistryConfig {
            max_sessions: 2,
            ..RegistryConfig::default()
        });

        let (first, _p1) = admit_peer(&registry);
        let (_second, _p2) = admit_peer(&registry);
        assert!(matches!(
            registry.admit(Arc::new(memory::failing())),
            Err(RegistryError::CapacityExceeded(2))
        ));

        registry.evict(first);
        assert!(registry.admit(Arc::new(memory::failing())).is_ok());
    }

    #[test]
    fn test_session_ids_in_admission_order() {
        let registry = Registry::new();
        let ids: Vec<_> = (0..5).map(|_| admit_peer(&registry)).collect();
        let expected: Vec<_> = ids.iter().map(|(id, _)| *id).collect();
        assert_eq!(registry.session_ids(), expected);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = Registry::new();
        let mut peers: Vec<_> = (0..3).map(|_| admit_peer(&registry).1).collect();

        let report = registry
            .broadcast_all(&ServerEvent::new_message("alice", "hello"))
            .await;
        assert_eq!(report.recipients, 3);
        assert_eq!(report.delivered, 3);
        assert!(report.evicted.is_empty());

        for peer in &mut peers {
            let frames = peer.drain();
            assert_eq!(frames.len(), 1);
            assert_eq!(
                frames[0],
                r#"{"type":"new_message","username":"alice","message":"hello"}"#
            );
        }
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failed_session() {
        let registry = Registry::new();
        let (_a, mut peer_a) = admit_peer(&registry);
        let dead = registry.admit(Arc::new(memory::failing())).unwrap();
        let (_c, mut peer_c) = admit_peer(&registry);
        let (_d, mut peer_d) = admit_peer(&registry);

        let report = registry
            .broadcast_all(&ServerEvent::new_message("bob", "ping"))
            .await;

        assert_eq!(report.recipients, 4);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.evicted, vec![dead]);
        assert!(!registry.contains(dead));
        assert_eq!(registry.len(), 3);

        assert_eq!(peer_a.drain().len(), 1);
        assert_eq!(peer_c.drain().len(), 1);
        assert_eq!(peer_d.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_evicts_dropped_peer() {
        let registry = Registry::new();
        let (gone, peer) = admit_peer(&registry);
        let (_kept, mut kept_peer) = admit_peer(&registry);
        drop(peer);

        let report = registry
            .broadcast_all(&ServerEvent::new_message("carol", "hi"))
            .await;
        assert_eq!(report.evicted, vec![gone]);
        assert_eq!(kept_peer.drain().len(), 1);

        // Later broadcasts no longer see the dead session
        let report = registry
            .broadcast_all(&ServerEvent::new_message("carol", "again"))
            .await;
        assert_eq!(report.recipients, 1);
        assert!(report.evicted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_evicts_stalled_session() {
        let registry = Registry::with_config(RegistryConfig {
            send_timeout: Duration::from_millis(100),
            ..RegistryConfig::default()
        });
        let stalled = registry.admit(Arc::new(StalledOutbound::default())).unwrap();
        let (_id, mut peer) = admit_peer(&registry);

        let report = registry
            .broadcast_all(&ServerEvent::new_message("dave", "slow"))
            .await;
        assert_eq!(report.evicted, vec![stalled]);
        assert_eq!(report.delivered, 1);
        assert_eq!(peer.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_of_stalled_session_is_bounded() {
        let registry = Registry::with_config(RegistryConfig {
            send_timeout: Duration::from_millis(100),
            ..RegistryConfig::default()
        });
        let outbound = StalledOutbound::default();
        let close_abandoned = outbound.close_abandoned.clone();
        registry.admit(Arc::new(outbound)).unwrap();

        registry
            .broadcast_all(&ServerEvent::new_message("erin", "stuck"))
            .await;
        assert!(!close_abandoned.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(close_abandoned.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admit_evict_broadcast() {
        const STABLE: usize = 8;
        const CHURNERS: usize = 4;
        const ROUNDS: usize = 50;
        const BROADCASTS: usize = 20;

        // Capacity leaves exactly one slot per churner, so a leaked count
        // would make a later admit fail
        let registry = Arc::new(Registry::with_config(RegistryConfig {
            max_sessions: STABLE + CHURNERS,
            ..RegistryConfig::default()
        }));
        let mut stable: Vec<_> = (0..STABLE).map(|_| admit_peer(&registry).1).collect();

        let churn: Vec<_> = (0..CHURNERS)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    // Peers stay alive so late sends from older snapshots still succeed
                    let mut peers = Vec::with_capacity(ROUNDS);
                    for _ in 0..ROUNDS {
                        let (id, peer) = admit_peer(&registry);
                        tokio::task::yield_now().await;
                        assert!(registry.evict(id));
                        peers.push(peer);
                    }
                    peers
                })
            })
            .collect();

        let broadcasts: Vec<_> = (0..BROADCASTS)
            .map(|n| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .broadcast_all(&ServerEvent::new_message("alice", n.to_string()))
                        .await
                })
            })
            .collect();

        for handle in broadcasts {
            let report = handle.await.unwrap();
            assert!(report.evicted.is_empty());
            assert_eq!(report.delivered, report.recipients);
            assert!(report.recipients >= STABLE);
        }
        for handle in churn {
            for mut peer in handle.await.unwrap() {
                let frames = peer.drain();
                let unique: HashSet<_> = frames.iter().collect();
                assert_eq!(unique.len(), frames.len());
            }
        }

        assert_eq!(registry.len(), STABLE);
        assert_eq!(registry.session_ids().len(), STABLE);

        let mut expected: Vec<_> = (0..BROADCASTS)
            .map(|n| codec::encode(&ServerEvent::new_message("alice", n.to_string())).unwrap())
            .collect();
        expected.sort();
        for peer in &mut stable {
            let mut frames = peer.drain();
            frames.sort();
            assert_eq!(frames, expected);
        }

        let extra: Vec<_> = (0..CHURNERS).map(|_| admit_peer(&registry)).collect();
        assert_eq!(extra.len(), CHURNERS);
        assert!(matches!(
            registry.admit(Arc::new(memory::failing())),
            Err(RegistryError::CapacityExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let registry = Registry::new();
        let report = registry
            .broadcast_all(&ServerEvent::new_message("nobody", "hears"))
            .await;
        assert_eq!(report, BroadcastReport::default());
    }
}
