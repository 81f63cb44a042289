//! The set of currently connected sessions, and the broadcast/unicast
//! primitives every connection and the REPL use to reach other peers.
//!
//! Grounded on the teacher's `Event`/`WSWriter` plumbing (one end-user
//! channel per connection), generalized here from "forward to one
//! subscriber" to "forward to N registered peers". Structural edits
//! (insert/remove) take the map mutex only long enough to mutate it; the
//! send loop releases the lock between individual per-peer sends so one
//! slow peer can't stall delivery to the rest.

use crate::frame::Frame;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SessionId {
    /// Reconstructs a session id from the decimal value the REPL prints
    /// for it (see `Display`), so operator commands can address a
    /// specific session without the registry exposing its storage type.
    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    #[cfg(test)]
    pub fn default_for_test() -> Self {
        SessionId(0)
    }
}

struct Peer {
    addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
}

/// Generates process-lifetime-unique session ids. A monotonic counter is
/// the synthetic stand-in for the file-descriptor identity a raw-socket
/// implementation would use.
#[derive(Default)]
pub struct SessionIdGenerator(AtomicU64);

impl SessionIdGenerator {
    pub fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct Registry {
    peers: Mutex<HashMap<SessionId, Peer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<Frame>) {
        self.peers.lock().unwrap().insert(id, Peer { addr, outbound });
    }

    pub fn remove(&self, id: SessionId) {
        self.peers.lock().unwrap().remove(&id);
    }

    pub fn list(&self) -> Vec<(SessionId, SocketAddr)> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, peer)| (*id, peer.addr))
            .collect()
    }

    /// Best-effort delivery to one session. `Ok(())` only means the frame
    /// was handed to that session's writer channel, not that it reached
    /// the wire.
    pub async fn unicast(&self, id: SessionId, frame: Frame) -> bool {
        let sender = self.peers.lock().unwrap().get(&id).map(|p| p.outbound.clone());
        match sender {
            Some(sender) => sender.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Sends `frame` to every registered session except `exclude` (the
    /// sender, for chat-broadcast routing). Delivery is best-effort per
    /// peer; one full/closed channel doesn't stop delivery to the rest.
    pub async fn broadcast(&self, frame: Frame, exclude: Option<SessionId>) {
        let senders: Vec<mpsc::Sender<Frame>> = self
            .peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, peer)| peer.outbound.clone())
            .collect();
        for sender in senders {
            let _ = sender.send(frame.clone()).await;
        }
    }

    pub async fn broadcast_all(&self, frame: Frame) {
        self.broadcast(frame, None).await;
    }

    pub async fn close_all(&self) {
        self.broadcast_all(Frame::close(1000, "")).await;
    }

    pub fn find_by_addr(&self, addr: &str) -> Vec<SessionId> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, peer)| peer.addr.ip().to_string() == addr)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unicast_delivers_to_registered_peer() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        registry.register(SessionId(1), addr, tx);

        let delivered = registry.unicast(SessionId(1), Frame::close(1000, "")).await;
        assert!(delivered);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unicast_to_unknown_session_fails() {
        let registry = Registry::new();
        assert!(!registry.unicast(SessionId(42), Frame::close(1000, "")).await);
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let registry = Registry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        registry.register(SessionId(1), addr, tx1);
        registry.register(SessionId(2), addr, tx2);

        registry
            .broadcast(Frame::close(1000, ""), Some(SessionId(1)))
            .await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn id_generator_is_monotonic_and_unique() {
        let gen = SessionIdGenerator::default();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
