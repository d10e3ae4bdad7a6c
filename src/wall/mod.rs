//! Host display: bubble store, physics and the frame loop
//!
//! `MessageWall` ties a host session to a bubble store. Payloads from the
//! session become bubbles; the animation loop steps them every frame.

pub mod animation;
pub mod bubble;
pub mod physics;
pub mod store;

pub use animation::AnimationLoop;
pub use bubble::{Bubble, Rect, Surface};
pub use store::BubbleStore;

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{RoomId, WallConfig};
use crate::message::MessagePayload;
use crate::session::{HostError, HostSession, HostState};
use crate::transport::Substrate;

pub struct MessageWall {
    host: HostSession,
    store: Arc<Mutex<BubbleStore>>,
    surface: watch::Sender<Surface>,
    animation: AnimationLoop,
    ingest_task: JoinHandle<()>,
}

impl MessageWall {
    /// Claim `room`, then start ingesting payloads and animating bubbles.
    pub async fn start(
        substrate: Arc<dyn Substrate>,
        room: RoomId,
        config: &WallConfig,
        surface: Surface,
    ) -> Result<Self, HostError> {
        config
            .validate()
            .map_err(|e| HostError::InvalidConfig(e.to_string()))?;
        let host = HostSession::new(substrate, room, config.inbox_capacity);
        let inbox = host.subscribe().await?;
        host.start().await?;

        let store = Arc::new(Mutex::new(BubbleStore::new(config)));
        let (surface_tx, surface_rx) = watch::channel(surface);

        let ingest_task = Self::spawn_ingest(inbox, Arc::clone(&store), surface_rx.clone());
        let animation = AnimationLoop::spawn(Arc::clone(&store), surface_rx, config.frame_interval());

        Ok(Self {
            host,
            store,
            surface: surface_tx,
            animation,
            ingest_task,
        })
    }

    fn spawn_ingest(
        mut inbox: mpsc::Receiver<MessagePayload>,
        store: Arc<Mutex<BubbleStore>>,
        surface: watch::Receiver<Surface>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(payload) = inbox.recv().await {
                let surface = *surface.borrow();
                let mut store = store.lock().await;
                let (id, name) = {
                    let bubble = store.ingest(payload, surface);
                    (bubble.id, bubble.name.clone())
                };
                log::info!(
                    "New bubble {} from {} ({} / {})",
                    id,
                    name,
                    store.len(),
                    store.capacity()
                );
            }
        })
    }

    pub fn room(&self) -> &RoomId {
        self.host.room()
    }

    pub fn host(&self) -> &HostSession {
        &self.host
    }

    pub fn state(&self) -> HostState {
        self.host.state()
    }

    pub fn surface(&self) -> Surface {
        *self.surface.borrow()
    }

    /// New surface size; applied from the next frame and the next spawn.
    pub fn resize(&self, surface: Surface) {
        self.surface.send_replace(surface);
    }

    pub async fn snapshot(&self) -> Vec<Bubble> {
        self.store.lock().await.snapshot()
    }

    pub async fn bubble_count(&self) -> usize {
        self.store.lock().await.len()
    }

    pub fn frames(&self) -> u64 {
        self.animation.frames()
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_running()
    }

    /// Stop the frame loop, discard every bubble and close the host session.
    pub async fn shutdown(&self) {
        self.animation.cancel();
        self.ingest_task.abort();
        self.store.lock().await.clear();
        self.host.shutdown().await;
    }
}

impl Drop for MessageWall {
    fn drop(&mut self) {
        self.ingest_task.abort();
    }
}
