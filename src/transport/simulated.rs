//! In-process peer substrate simulator
//!
//! Provides a simulated relay where multiple peers can register names,
//! connect to each other and exchange messages entirely in-process. Used
//! for integration testing and the demo binary without a signaling server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::substrate::{ConnectionEvent, ConnectionState, PeerConnection, PeerHandle, Substrate};
use super::TransportError;

type Registry = Arc<Mutex<HashMap<String, mpsc::Sender<Box<dyn PeerConnection>>>>>;

/// The simulated "relay": a shared name registry through which all
/// simulated peers find each other.
pub struct SimSubstrate {
    /// Maps a registered peer name -> sender for delivering inbound connections.
    peers: Registry,
    /// Delay between a connect and both ends reporting `Open`.
    open_latency: Duration,
}

impl SimSubstrate {
    /// Create a substrate whose connections open immediately.
    pub fn new() -> Arc<Self> {
        Self::with_open_latency(Duration::ZERO)
    }

    /// Create a substrate whose connections open after `open_latency`.
    /// Uses tokio time, so paused clocks advance instantly in tests.
    pub fn with_open_latency(open_latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            peers: Arc::new(Mutex::new(HashMap::new())),
            open_latency,
        })
    }

    /// Whether a live peer currently holds `name`.
    pub async fn is_registered(&self, name: &str) -> bool {
        let peers = self.peers.lock().await;
        peers.get(name).map(|tx| !tx.is_closed()).unwrap_or(false)
    }
}

#[async_trait]
impl Substrate for SimSubstrate {
    async fn register_peer(&self, name: Option<&str>) -> Result<Box<dyn PeerHandle>, TransportError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let (conn_tx, conn_rx) = mpsc::channel(16);
        {
            let mut peers = self.peers.lock().await;
            // A dropped peer leaves a closed sender behind; its name is free again.
            if peers.get(&name).map(|tx| !tx.is_closed()).unwrap_or(false) {
                return Err(TransportError::NameTaken(name));
            }
            peers.insert(name.clone(), conn_tx);
        }
        log::debug!("Registered simulated peer {}", name);
        Ok(Box::new(SimPeer {
            name,
            registry: Arc::clone(&self.peers),
            open_latency: self.open_latency,
            conn_rx: Mutex::new(conn_rx),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// A simulated peer registered on a `SimSubstrate`.
pub struct SimPeer {
    name: String,
    registry: Registry,
    open_latency: Duration,
    /// Receiver for inbound connections.
    conn_rx: Mutex<mpsc::Receiver<Box<dyn PeerConnection>>>,
    destroyed: AtomicBool,
}

#[async_trait]
impl PeerHandle for SimPeer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, target: &str) -> Result<Box<dyn PeerConnection>, TransportError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }
        let conn_sender = {
            let peers = self.registry.lock().await;
            peers.get(target).filter(|tx| !tx.is_closed()).cloned()
        };

        let (local, remote) = SimConnection::create_pair(self.name.clone(), target.to_string());
        let unavailable = format!("Could not connect to peer {}", target);

        let Some(conn_sender) = conn_sender else {
            local.link.fail(local.side, unavailable);
            return Ok(Box::new(local));
        };
        if let Err(mpsc::error::SendError(remote)) = conn_sender.send(Box::new(remote)).await {
            local.link.fail(local.side, unavailable);
            drop(remote);
            return Ok(Box::new(local));
        }

        let link = Arc::clone(&local.link);
        let latency = self.open_latency;
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            link.open();
        });

        Ok(Box::new(local))
    }

    async fn accept(&self) -> Result<Box<dyn PeerConnection>, TransportError> {
        let mut rx = self.conn_rx.lock().await;
        rx.recv().await.ok_or(TransportError::Destroyed)
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut peers = self.registry.lock().await;
        peers.remove(&self.name);
        log::debug!("Released simulated peer {}", self.name);
        Ok(())
    }
}

/// Shared state of both ends of one simulated data channel.
struct Link {
    states: std::sync::Mutex<[ConnectionState; 2]>,
    inboxes: [mpsc::UnboundedSender<ConnectionEvent>; 2],
}

impl Link {
    fn states(&self) -> std::sync::MutexGuard<'_, [ConnectionState; 2]> {
        // State updates never panic midway, so a poisoned lock still holds valid states.
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self, side: usize) -> ConnectionState {
        self.states()[side]
    }

    fn open(&self) {
        let mut states = self.states();
        if states.iter().all(|s| *s == ConnectionState::Connecting) {
            for side in 0..2 {
                states[side] = ConnectionState::Open;
                let _ = self.inboxes[side].send(ConnectionEvent::Open);
            }
        }
    }

    fn shutdown(&self) {
        let mut states = self.states();
        for side in 0..2 {
            if matches!(states[side], ConnectionState::Connecting | ConnectionState::Open) {
                states[side] = ConnectionState::Closed;
                let _ = self.inboxes[side].send(ConnectionEvent::Close);
            }
        }
    }

    fn fail(&self, side: usize, message: String) {
        let mut states = self.states();
        *states = [ConnectionState::Failed; 2];
        let _ = self.inboxes[side].send(ConnectionEvent::Error(message));
        let _ = self.inboxes[side].send(ConnectionEvent::Close);
    }

    fn deliver(&self, from: usize, data: &[u8]) -> Result<(), TransportError> {
        let states = self.states();
        let to = 1 - from;
        if states[from] != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        if states[to] != ConnectionState::Open {
            return Err(TransportError::Disconnected);
        }
        self.inboxes[to]
            .send(ConnectionEvent::Data(data.to_vec()))
            .map_err(|_| TransportError::Disconnected)
    }
}

/// A simulated data channel backed by tokio mpsc channels.
pub struct SimConnection {
    link: Arc<Link>,
    side: usize,
    peer_name: String,
    events: Mutex<mpsc::UnboundedReceiver<ConnectionEvent>>,
}

impl SimConnection {
    /// Create both ends of a channel between `name_a` and `name_b`.
    fn create_pair(name_a: String, name_b: String) -> (SimConnection, SimConnection) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            states: std::sync::Mutex::new([ConnectionState::Connecting; 2]),
            inboxes: [tx_a, tx_b],
        });

        let conn_a = SimConnection {
            link: Arc::clone(&link),
            side: 0,
            peer_name: name_b,
            events: Mutex::new(rx_a),
        };
        let conn_b = SimConnection {
            link,
            side: 1,
            peer_name: name_a,
            events: Mutex::new(rx_b),
        };
        (conn_a, conn_b)
    }
}

#[async_trait]
impl PeerConnection for SimConnection {
    fn peer_name(&self) -> &str {
        &self.peer_name
    }

    fn state(&self) -> ConnectionState {
        self.link.state(self.side)
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.link.deliver(self.side, data)
    }

    async fn next_event(&self) -> Option<ConnectionEvent> {
        let mut events = self.events.lock().await;
        // Read the state first: terminal transitions enqueue their last event
        // under the same lock, so an empty inbox afterwards means nothing is left.
        let terminal = matches!(self.state(), ConnectionState::Closed | ConnectionState::Failed);
        match events.try_recv() {
            Ok(event) => Some(event),
            Err(_) if terminal => None,
            Err(_) => events.recv().await,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.link.shutdown();
        Ok(())
    }
}

impl Drop for SimConnection {
    fn drop(&mut self) {
        self.link.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect_pair(
        substrate: &Arc<SimSubstrate>,
    ) -> (Box<dyn PeerHandle>, Box<dyn PeerHandle>, Box<dyn PeerConnection>, Box<dyn PeerConnection>) {
        let host = substrate.register_peer(Some("ROOM01")).await.unwrap();
        let guest = substrate.register_peer(None).await.unwrap();
        let conn_guest = guest.connect("ROOM01").await.unwrap();
        let conn_host = host.accept().await.unwrap();
        (host, guest, conn_host, conn_guest)
    }

    #[tokio::test]
    async fn test_name_collision() {
        let substrate = SimSubstrate::new();
        let _first = substrate.register_peer(Some("ROOM01")).await.unwrap();

        let second = substrate.register_peer(Some("ROOM01")).await;
        assert!(matches!(second, Err(TransportError::NameTaken(name)) if name == "ROOM01"));
    }

    #[tokio::test]
    async fn test_name_released_on_destroy_and_drop() {
        let substrate = SimSubstrate::new();
        let first = substrate.register_peer(Some("ROOM01")).await.unwrap();
        first.destroy().await.unwrap();
        assert!(!substrate.is_registered("ROOM01").await);

        let second = substrate.register_peer(Some("ROOM01")).await.unwrap();
        drop(second);
        assert!(!substrate.is_registered("ROOM01").await);
        assert!(substrate.register_peer(Some("ROOM01")).await.is_ok());
    }

    #[tokio::test]
    async fn test_anonymous_names_are_unique() {
        let substrate = SimSubstrate::new();
        let a = substrate.register_peer(None).await.unwrap();
        let b = substrate.register_peer(None).await.unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[tokio::test]
    async fn test_connection_opens_and_transfers() {
        let substrate = SimSubstrate::new();
        let (_host, guest, conn_host, conn_guest) = connect_pair(&substrate).await;

        assert_eq!(conn_guest.next_event().await, Some(ConnectionEvent::Open));
        assert_eq!(conn_host.next_event().await, Some(ConnectionEvent::Open));
        assert_eq!(conn_host.peer_name(), guest.name());
        assert_eq!(conn_guest.peer_name(), "ROOM01");

        conn_guest.send(b"hello from guest").await.unwrap();
        assert_eq!(
            conn_host.next_event().await,
            Some(ConnectionEvent::Data(b"hello from guest".to_vec()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_before_open_is_rejected() {
        let substrate = SimSubstrate::with_open_latency(Duration::from_secs(1));
        let (_host, _guest, _conn_host, conn_guest) = connect_pair(&substrate).await;

        assert_eq!(conn_guest.state(), ConnectionState::Connecting);
        assert_eq!(conn_guest.send(b"early").await, Err(TransportError::NotOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_latency() {
        let substrate = SimSubstrate::with_open_latency(Duration::from_millis(100));
        let (_host, _guest, _conn_host, conn_guest) = connect_pair(&substrate).await;

        let before = tokio::time::Instant::now();
        assert_eq!(conn_guest.next_event().await, Some(ConnectionEvent::Open));
        let elapsed = before.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_unknown_target_fails() {
        let substrate = SimSubstrate::new();
        let guest = substrate.register_peer(None).await.unwrap();
        let conn = guest.connect("NOBODY").await.unwrap();

        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(matches!(conn.next_event().await, Some(ConnectionEvent::Error(_))));
        assert_eq!(conn.next_event().await, Some(ConnectionEvent::Close));
        assert_eq!(conn.next_event().await, None);
    }

    #[tokio::test]
    async fn test_close_reaches_both_ends() {
        let substrate = SimSubstrate::new();
        let (_host, _guest, conn_host, conn_guest) = connect_pair(&substrate).await;
        assert_eq!(conn_guest.next_event().await, Some(ConnectionEvent::Open));
        assert_eq!(conn_host.next_event().await, Some(ConnectionEvent::Open));

        conn_guest.close().await.unwrap();

        assert_eq!(conn_host.next_event().await, Some(ConnectionEvent::Close));
        assert_eq!(conn_host.next_event().await, None);
        assert_eq!(conn_guest.next_event().await, Some(ConnectionEvent::Close));
        assert_eq!(conn_host.send(b"late").await, Err(TransportError::NotOpen));
    }

    #[tokio::test]
    async fn test_dropping_one_end_closes_the_other() {
        let substrate = SimSubstrate::new();
        let (_host, _guest, conn_host, conn_guest) = connect_pair(&substrate).await;
        assert_eq!(conn_host.next_event().await, Some(ConnectionEvent::Open));

        drop(conn_guest);

        assert_eq!(conn_host.next_event().await, Some(ConnectionEvent::Close));
        assert_eq!(conn_host.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_destroyed_peer_rejects_connect_and_accept() {
        let substrate = SimSubstrate::new();
        let host = substrate.register_peer(Some("ROOM01")).await.unwrap();
        host.destroy().await.unwrap();

        assert!(matches!(host.connect("X").await, Err(TransportError::Destroyed)));
        assert!(matches!(host.accept().await, Err(TransportError::Destroyed)));
    }
}
