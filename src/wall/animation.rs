//! Frame loop driving the physics step

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::bubble::{Rect, Surface};
use super::physics::step_all;
use super::store::BubbleStore;

/// A running animation loop. Cancelled by `cancel` or on drop.
pub struct AnimationLoop {
    handle: JoinHandle<()>,
    frames: Arc<AtomicU64>,
}

impl AnimationLoop {
    /// Step every bubble once per `frame_interval`.
    ///
    /// The surface is re-read every frame and the QR panel obstacle is
    /// derived from it, so resizes take effect on the next frame.
    pub fn spawn(
        store: Arc<Mutex<BubbleStore>>,
        surface: watch::Receiver<Surface>,
        frame_interval: Duration,
    ) -> Self {
        let frames = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frames);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::info!("Animation loop started, one frame per {:?}", frame_interval);

            loop {
                ticker.tick().await;
                let surface = *surface.borrow();
                let obstacle = Rect::qr_panel(surface);
                {
                    let mut store = store.lock().await;
                    let radius = store.radius();
                    step_all(store.bubbles_mut(), surface, Some(obstacle), radius);
                }
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
        Self { handle, frames }
    }

    /// Frames stepped so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop scheduling frames.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            log::info!("Animation loop cancelled after {} frames", self.frames());
        }
    }
}

impl Drop for AnimationLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
