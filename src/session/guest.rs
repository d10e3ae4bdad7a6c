//! Guest connection manager
//!
//! Registers an anonymous peer, connects to the room's host under a
//! timeout and sends messages while the channel is open.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::GuestError;
use crate::config::{RetryPolicy, RoomId, WallConfig};
use crate::message::MessagePayload;
use crate::transport::{ConnectionEvent, PeerConnection, PeerHandle, Substrate};

/// Lifecycle of a guest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestState {
    Idle,
    Registering,
    Connecting,
    Open,
    Closed,
    Failed(GuestError),
}

pub struct GuestSession {
    room: RoomId,
    substrate: Arc<dyn Substrate>,
    connect_timeout: Duration,
    send_cooldown: Duration,
    retry: RetryPolicy,
    state: Arc<watch::Sender<GuestState>>,
    peer: RwLock<Option<Arc<dyn PeerHandle>>>,
    connection: Arc<RwLock<Option<Arc<dyn PeerConnection>>>>,
    /// Latest user-facing condition, cleared when the channel opens.
    last_error: Arc<std::sync::Mutex<Option<GuestError>>>,
    last_sent: std::sync::Mutex<Option<Instant>>,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GuestSession {
    pub fn new(substrate: Arc<dyn Substrate>, room: RoomId, config: &WallConfig) -> Self {
        let (state, _) = watch::channel(GuestState::Idle);
        Self {
            room,
            substrate,
            connect_timeout: config.connect_timeout(),
            send_cooldown: config.send_cooldown(),
            retry: config.connect_retry.clone(),
            state: Arc::new(state),
            peer: RwLock::new(None),
            connection: Arc::new(RwLock::new(None)),
            last_error: Arc::new(std::sync::Mutex::new(None)),
            last_sent: std::sync::Mutex::new(None),
            watcher: std::sync::Mutex::new(None),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn state(&self) -> GuestState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<GuestState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == GuestState::Open
    }

    pub fn last_error(&self) -> Option<GuestError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Our substrate-assigned peer name, once registered.
    pub async fn peer_name(&self) -> Option<String> {
        self.peer.read().await.as_ref().map(|p| p.name().to_string())
    }

    /// Register on the substrate and connect to the room's host.
    ///
    /// Each attempt that does not reach `Open` within the connect timeout is
    /// aborted. With the default retry policy exactly one attempt is made.
    pub async fn connect(&self) -> Result<(), GuestError> {
        if self.state() != GuestState::Idle {
            return Err(GuestError::InvalidState("connect() may only be called once per session"));
        }
        self.state.send_replace(GuestState::Registering);

        let peer: Arc<dyn PeerHandle> = match self.substrate.register_peer(None).await {
            Ok(peer) => Arc::from(peer),
            Err(e) => return Err(self.fail(e.into())),
        };
        log::info!("Guest peer opened with id {}", peer.name());
        *self.peer.write().await = Some(Arc::clone(&peer));

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.state.send_replace(GuestState::Connecting);
            log::info!("Attempting to connect to host {} ({}/{})", self.room, attempt, max_attempts);
            match self.attempt(peer.as_ref()).await {
                Ok(conn) => {
                    self.on_open(conn).await;
                    return Ok(());
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt, &mut rand::thread_rng());
                    log::warn!("Connect attempt {} failed: {}; retrying in {:?}", attempt, err, delay);
                    self.set_error(err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(self.fail(err)),
            }
        }
    }

    /// One connection attempt, raced against the connect timeout.
    async fn attempt(&self, peer: &dyn PeerHandle) -> Result<Arc<dyn PeerConnection>, GuestError> {
        let conn: Arc<dyn PeerConnection> = Arc::from(peer.connect(self.room.as_str()).await?);

        let watched = Arc::clone(&conn);
        let opened = async move {
            while let Some(event) = watched.next_event().await {
                match event {
                    ConnectionEvent::Open => return Ok(()),
                    ConnectionEvent::Error(message) => return Err(GuestError::ConnectionFailed(message)),
                    ConnectionEvent::Close => break,
                    ConnectionEvent::Data(_) => {}
                }
            }
            Err(GuestError::ConnectionFailed("connection closed before opening".to_string()))
        };
        let deadline = tokio::time::sleep(self.connect_timeout);

        // Open is polled first: a channel that opens at any instant before the
        // deadline is never reported as a timeout, and the deadline is dropped.
        tokio::select! {
            biased;
            result = opened => {
                if let Err(err) = result {
                    let _ = conn.close().await;
                    return Err(err);
                }
                Ok(conn)
            }
            _ = deadline => {
                log::warn!("Connection to {} timed out after {:?}", self.room, self.connect_timeout);
                let _ = conn.close().await;
                Err(GuestError::Timeout)
            }
        }
    }

    async fn on_open(&self, conn: Arc<dyn PeerConnection>) {
        *self.connection.write().await = Some(Arc::clone(&conn));
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = None;
        }
        self.state.send_replace(GuestState::Open);
        log::info!("Connected to host {}", self.room);

        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.connection);
        let last_error = Arc::clone(&self.last_error);
        let handle = tokio::spawn(async move {
            while let Some(event) = conn.next_event().await {
                match event {
                    ConnectionEvent::Close => break,
                    ConnectionEvent::Error(message) => {
                        log::error!("Connection error: {}", message);
                        let err = GuestError::ConnectionFailed(message);
                        if let Ok(mut last_error) = last_error.lock() {
                            *last_error = Some(err.clone());
                        }
                        // No further sends on a channel that reported an error.
                        slot.write().await.take();
                        state.send_replace(GuestState::Failed(err));
                        let _ = conn.close().await;
                        break;
                    }
                    ConnectionEvent::Data(_) => log::debug!("Ignoring data from host"),
                    ConnectionEvent::Open => {}
                }
            }
            slot.write().await.take();
            state.send_modify(|s| {
                if *s == GuestState::Open {
                    *s = GuestState::Closed;
                }
            });
            log::info!("Connection closed");
        });
        if let Ok(mut watcher) = self.watcher.lock() {
            *watcher = Some(handle);
        }
    }

    /// Send one message to the host.
    ///
    /// Never queues: without an open channel the payload is dropped and
    /// `NotConnected` is raised.
    pub async fn send_message(&self, payload: &MessagePayload) -> Result<(), GuestError> {
        let conn = self.connection.read().await.clone();
        let conn = match conn {
            Some(conn) if conn.is_open() => conn,
            _ => {
                log::error!("Connection not ready");
                self.set_error(GuestError::NotConnected);
                return Err(GuestError::NotConnected);
            }
        };

        if let Some(remaining) = self.cooldown_remaining() {
            return Err(GuestError::CoolingDown {
                remaining_ms: remaining.as_millis() as u64,
            });
        }

        let data = payload.encode()?;
        if let Err(e) = conn.send(&data).await {
            let err = GuestError::from(e);
            self.set_error(err.clone());
            return Err(err);
        }
        if let Ok(mut last_sent) = self.last_sent.lock() {
            *last_sent = Some(Instant::now());
        }
        log::info!("Message sent to {}", self.room);
        Ok(())
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let last_sent = self.last_sent.lock().ok().and_then(|t| *t)?;
        let elapsed = last_sent.elapsed();
        if elapsed < self.send_cooldown {
            Some(self.send_cooldown - elapsed)
        } else {
            None
        }
    }

    /// Close the channel and release the guest peer.
    pub async fn disconnect(&self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
        if let Some(conn) = self.connection.write().await.take() {
            let _ = conn.close().await;
        }
        if let Some(peer) = self.peer.write().await.take() {
            let _ = peer.destroy().await;
        }
        self.state.send_modify(|s| {
            if !matches!(s, GuestState::Failed(_)) {
                *s = GuestState::Closed;
            }
        });
    }

    fn set_error(&self, err: GuestError) {
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(err);
        }
    }

    fn fail(&self, err: GuestError) -> GuestError {
        log::error!("Guest session for {} failed: {}", self.room, err);
        self.set_error(err.clone());
        self.state.send_replace(GuestState::Failed(err.clone()));
        err
    }
}

impl Drop for GuestSession {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}
