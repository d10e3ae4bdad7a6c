//! Host connection manager
//!
//! Registers the room name on the substrate, accepts any number of guest
//! connections and routes every decoded payload to one subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::HostError;
use crate::config::RoomId;
use crate::message::MessagePayload;
use crate::transport::{ConnectionEvent, PeerConnection, PeerHandle, Substrate, TransportError};

/// Lifecycle of a host session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Registering,
    Ready,
    Error(HostError),
    Closed,
}

type Connections = Arc<RwLock<HashMap<Uuid, Arc<dyn PeerConnection>>>>;
type Subscriber = Arc<RwLock<Option<mpsc::Sender<MessagePayload>>>>;

pub struct HostSession {
    room: RoomId,
    substrate: Arc<dyn Substrate>,
    inbox_capacity: usize,
    state: Arc<watch::Sender<HostState>>,
    peer: RwLock<Option<Arc<dyn PeerHandle>>>,
    /// Inbound guest connections keyed by a per-connection id.
    connections: Connections,
    /// The single payload consumer, if one is registered.
    subscriber: Subscriber,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HostSession {
    pub fn new(substrate: Arc<dyn Substrate>, room: RoomId, inbox_capacity: usize) -> Self {
        let (state, _) = watch::channel(HostState::Idle);
        Self {
            room,
            substrate,
            inbox_capacity: inbox_capacity.max(1),
            state: Arc::new(state),
            peer: RwLock::new(None),
            connections: Arc::new(RwLock::new(HashMap::new())),
            subscriber: Arc::new(RwLock::new(None)),
            accept_task: std::sync::Mutex::new(None),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn state(&self) -> HostState {
        self.state.borrow().clone()
    }

    /// Observe every state transition.
    pub fn watch_state(&self) -> watch::Receiver<HostState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == HostState::Ready
    }

    /// Claim the room name and start accepting guests.
    ///
    /// A name collision ends the session in `HostState::Error(RoomInUse)`;
    /// no other name is tried.
    pub async fn start(&self) -> Result<(), HostError> {
        if self.state() != HostState::Idle {
            return Err(HostError::InvalidState("start() may only be called once"));
        }
        self.state.send_replace(HostState::Registering);

        let peer: Arc<dyn PeerHandle> = match self.substrate.register_peer(Some(self.room.as_str())).await {
            Ok(peer) => Arc::from(peer),
            Err(e) => {
                let err = match e {
                    TransportError::NameTaken(_) => HostError::RoomInUse(self.room.clone()),
                    other => HostError::Transport(other),
                };
                log::error!("Host registration for room {} failed: {}", self.room, err);
                self.state.send_replace(HostState::Error(err.clone()));
                return Err(err);
            }
        };

        *self.peer.write().await = Some(Arc::clone(&peer));
        self.state.send_replace(HostState::Ready);
        log::info!("Host peer opened with id {}", peer.name());

        let state = Arc::clone(&self.state);
        let connections = Arc::clone(&self.connections);
        let subscriber = Arc::clone(&self.subscriber);
        let handle = tokio::spawn(async move {
            loop {
                match peer.accept().await {
                    Ok(conn) => {
                        Self::add_connection(&connections, &subscriber, Arc::from(conn)).await;
                    }
                    Err(e) => {
                        // shutdown() stops this task before releasing the peer,
                        // so any error seen here came from the substrate.
                        log::error!("Host peer {} lost: {}", peer.name(), e);
                        state.send_modify(|s| {
                            if *s == HostState::Ready {
                                *s = HostState::Error(HostError::Transport(e.clone()));
                            }
                        });
                        break;
                    }
                }
            }
        });
        if let Ok(mut slot) = self.accept_task.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Register the single payload consumer.
    ///
    /// Fails with `AlreadySubscribed` while another receiver is alive; call
    /// `unsubscribe` (or drop that receiver) first.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<MessagePayload>, HostError> {
        let mut slot = self.subscriber.write().await;
        if slot.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false) {
            return Err(HostError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        *slot = Some(tx);
        Ok(rx)
    }

    pub async fn unsubscribe(&self) {
        self.subscriber.write().await.take();
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Peer names of the currently connected guests.
    pub async fn guests(&self) -> Vec<String> {
        let conns = self.connections.read().await;
        conns.values().map(|c| c.peer_name().to_string()).collect()
    }

    /// Stop accepting, close every guest connection and release the room name.
    pub async fn shutdown(&self) {
        let accept_task = self.accept_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = accept_task {
            handle.abort();
            // Wait it out so no connection is added after the drain below.
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::warn!("Accept loop for room {} ended abnormally: {}", self.room, e);
                }
            }
        }

        let drained: Vec<Arc<dyn PeerConnection>> = {
            let mut conns = self.connections.write().await;
            conns.drain().map(|(_, c)| c).collect()
        };
        for conn in drained {
            let _ = conn.close().await;
        }

        if let Some(peer) = self.peer.write().await.take() {
            if let Err(e) = peer.destroy().await {
                log::warn!("Failed to release room {}: {}", self.room, e);
            }
        }
        self.subscriber.write().await.take();
        self.state.send_replace(HostState::Closed);
        log::info!("Host session for room {} closed", self.room);
    }

    /// Track a guest connection and start its receive loop.
    async fn add_connection(
        connections: &Connections,
        subscriber: &Subscriber,
        conn: Arc<dyn PeerConnection>,
    ) {
        let id = Uuid::new_v4();
        {
            let mut conns = connections.write().await;
            conns.insert(id, Arc::clone(&conn));
        }
        log::info!("Guest connected: {}", conn.peer_name());

        let connections = Arc::clone(connections);
        let subscriber = Arc::clone(subscriber);
        tokio::spawn(async move {
            while let Some(event) = conn.next_event().await {
                match event {
                    ConnectionEvent::Open => {
                        log::debug!("Channel to {} open", conn.peer_name());
                    }
                    ConnectionEvent::Data(data) => match MessagePayload::decode(&data) {
                        Ok(payload) => {
                            log::debug!("Received message from {}", conn.peer_name());
                            Self::forward(&subscriber, payload).await;
                        }
                        Err(e) => {
                            log::warn!("Dropping message from {}: {}", conn.peer_name(), e);
                        }
                    },
                    ConnectionEvent::Error(message) => {
                        log::warn!("Connection error from {}: {}", conn.peer_name(), message);
                    }
                    ConnectionEvent::Close => break,
                }
            }
            connections.write().await.remove(&id);
            log::info!("Guest disconnected: {}", conn.peer_name());
        });
    }

    async fn forward(subscriber: &Subscriber, payload: MessagePayload) {
        // Clone the sender out so backpressure never holds the lock.
        let tx = subscriber.read().await.clone();
        match tx {
            Some(tx) => {
                if tx.send(payload).await.is_err() {
                    log::debug!("Subscriber went away; message dropped");
                }
            }
            None => log::debug!("No subscriber registered; message dropped"),
        }
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.accept_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
