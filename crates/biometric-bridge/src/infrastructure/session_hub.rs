//! Session hub: the set of connected clients and broadcast fan-out.
//!
//! Each WebSocket session registers here and gets a bounded outbound queue.
//! The session's writer task drains that queue onto the socket.  Anything that
//! wants to talk to a client (a correlated response, or a broadcast of a device
//! reply) pushes a string into the queue; nobody else touches the socket.
//!
//! # Isolation
//!
//! Fan-out uses `try_send`, so a slow or dead client whose queue is full never
//! delays delivery to the others.  Sessions whose queue has been closed (the
//! writer task exited) are pruned after the fan-out.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use biometric_core::DeviceReply;

/// Identifier of one connected client session.
pub type SessionId = Uuid;

/// Outbound queue depth per session.
pub const SESSION_QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
struct SessionEntry {
    id: SessionId,
    peer: SocketAddr,
    tx: mpsc::Sender<String>,
}

/// Outcome of one [`SessionHub::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Sessions registered at the time of the broadcast.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Registry of connected sessions, in registration order.
#[derive(Debug, Default)]
pub struct SessionHub {
    sessions: RwLock<Vec<SessionEntry>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and returns its id and the receiving end of its queue.
    pub async fn register(&self, peer: SocketAddr) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .push(SessionEntry { id, peer, tx });
        debug!("session {id} registered for {peer}");
        (id, rx)
    }

    /// Removes a session.  Unknown ids are ignored.
    pub async fn unregister(&self, id: SessionId) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() < before {
            debug!("session {id} unregistered");
        }
    }

    /// Queues `text` for every open session.
    pub async fn broadcast(&self, text: &str) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut closed = Vec::new();

        {
            let sessions = self.sessions.read().await;
            report.attempted = sessions.len();
            for session in sessions.iter() {
                match session.tx.try_send(text.to_string()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            "session {} ({}): outbound queue full, dropping broadcast",
                            session.id, session.peer
                        );
                        report.failed += 1;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        report.failed += 1;
                        closed.push(session.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.sessions
                .write()
                .await
                .retain(|s| !closed.contains(&s.id));
            debug!("pruned {} closed session(s)", closed.len());
        }

        report
    }

    /// Queues `text` for one session.  Returns `false` if the session is gone
    /// or its queue is closed.
    ///
    /// Unlike broadcasts, a correlated response waits for queue space.
    pub async fn send_to(&self, id: SessionId, text: String) -> bool {
        let tx = {
            let sessions = self.sessions.read().await;
            match sessions.iter().find(|s| s.id == id) {
                Some(s) => s.tx.clone(),
                None => return false,
            }
        };
        tx.send(text).await.is_ok()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of all registered sessions, in registration order.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.iter().map(|s| s.id).collect()
    }
}

/// Forwards every device reply on `feed` to all sessions as raw JSON.
///
/// Runs until the gateway (and with it the feed's sender) is dropped.
pub async fn pump_broadcasts(mut feed: broadcast::Receiver<DeviceReply>, hub: Arc<SessionHub>) {
    loop {
        match feed.recv().await {
            Ok(reply) => {
                let text = reply.value().to_string();
                let report = hub.broadcast(&text).await;
                debug!(
                    "broadcast device reply to {}/{} session(s)",
                    report.delivered, report.attempted
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("broadcast pump lagged; skipped {skipped} device replies");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("device feed closed; broadcast pump exiting");
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_preserves_order() {
        // Arrange
        let hub = SessionHub::new();

        // Act
        let (a, _ra) = hub.register(peer(1)).await;
        let (b, _rb) = hub.register(peer(2)).await;

        // Assert
        assert_eq!(hub.session_ids().await, vec![a, b]);
        assert_eq!(hub.len().await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let hub = SessionHub::new();
        let (_, mut ra) = hub.register(peer(1)).await;
        let (_, mut rb) = hub.register(peer(2)).await;
        let (_, mut rc) = hub.register(peer(3)).await;

        let report = hub.broadcast("hello").await;

        assert_eq!(
            report,
            FanOutReport {
                attempted: 3,
                delivered: 3,
                failed: 0
            }
        );
        for rx in [&mut ra, &mut rb, &mut rc] {
            assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        }
    }

    #[tokio::test]
    async fn test_closed_session_does_not_suppress_others_and_is_pruned() {
        // Arrange: the middle session's writer has gone away
        let hub = SessionHub::new();
        let (_, mut ra) = hub.register(peer(1)).await;
        let (b, rb) = hub.register(peer(2)).await;
        let (_, mut rc) = hub.register(peer(3)).await;
        drop(rb);

        // Act
        let report = hub.broadcast("x").await;

        // Assert
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(ra.recv().await.as_deref(), Some("x"));
        assert_eq!(rc.recv().await.as_deref(), Some("x"));
        assert!(!hub.session_ids().await.contains(&b));
    }

    #[tokio::test]
    async fn test_full_queue_is_isolated() {
        let hub = SessionHub::new();
        let (_, _slow) = hub.register(peer(1)).await;
        let (_, mut fast) = hub.register(peer(2)).await;

        for _ in 0..SESSION_QUEUE_CAPACITY {
            hub.broadcast("fill").await;
            fast.recv().await;
        }
        let report = hub.broadcast("overflow").await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(fast.recv().await.as_deref(), Some("overflow"));
        // A full queue is not a closed one; the slow session stays registered.
        assert_eq!(hub.len().await, 2);
    }

    #[tokio::test]
    async fn test_unregistered_session_receives_nothing() {
        let hub = SessionHub::new();
        let (a, mut ra) = hub.register(peer(1)).await;

        hub.unregister(a).await;
        let report = hub.broadcast("late").await;

        assert_eq!(report.attempted, 0);
        assert!(hub.is_empty().await);
        assert_eq!(ra.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_to_targets_one_session() {
        let hub = SessionHub::new();
        let (a, mut ra) = hub.register(peer(1)).await;
        let (_, mut rb) = hub.register(peer(2)).await;

        assert!(hub.send_to(a, "just you".to_string()).await);

        assert_eq!(ra.recv().await.as_deref(), Some("just you"));
        assert!(rb.try_recv().is_err());
        assert!(!hub.send_to(Uuid::new_v4(), "nobody".to_string()).await);
    }

    #[tokio::test]
    async fn test_pump_forwards_raw_device_json() {
        // Arrange
        let hub = Arc::new(SessionHub::new());
        let (_, mut rx) = hub.register(peer(1)).await;
        let (tx, feed) = broadcast::channel(8);
        let pump = tokio::spawn(pump_broadcasts(feed, Arc::clone(&hub)));

        // Act
        let reply = DeviceReply::new(json!({"status": "VERIFIED"}), Instant::now()).unwrap();
        tx.send(reply).unwrap();
        let text = rx.recv().await.unwrap();
        drop(tx);

        // Assert
        assert_eq!(serde_json::from_str::<serde_json::Value>(&text).unwrap(), json!({"status": "VERIFIED"}));
        pump.await.unwrap();
    }
}
