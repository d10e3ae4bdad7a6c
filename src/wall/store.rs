//! Bounded FIFO of live bubbles

use std::collections::VecDeque;
use std::f64::consts::PI;

use rand::Rng;

use super::bubble::{Bubble, Surface};
use crate::config::WallConfig;
use crate::message::MessagePayload;

pub struct BubbleStore {
    bubbles: VecDeque<Bubble>,
    capacity: usize,
    bubble_size: f64,
    min_speed: f64,
    max_speed: f64,
}

impl BubbleStore {
    pub fn new(config: &WallConfig) -> Self {
        let capacity = config.max_bubbles.max(1);
        Self {
            bubbles: VecDeque::with_capacity(capacity + 1),
            capacity,
            bubble_size: config.bubble_size,
            min_speed: config.min_speed,
            max_speed: config.max_speed,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn radius(&self) -> f64 {
        self.bubble_size / 2.0
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    /// Oldest first.
    pub fn bubbles(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter()
    }

    pub fn bubbles_mut(&mut self) -> impl Iterator<Item = &mut Bubble> {
        self.bubbles.iter_mut()
    }

    pub fn snapshot(&self) -> Vec<Bubble> {
        self.bubbles.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.bubbles.clear();
    }

    pub fn ingest(&mut self, payload: MessagePayload, surface: Surface) -> &Bubble {
        self.ingest_with_rng(payload, surface, &mut rand::thread_rng())
    }

    /// Spawn a bubble for `payload` and append it, evicting the oldest
    /// bubbles beyond capacity.
    ///
    /// The spawn point keeps the whole bubble on the surface; a surface
    /// narrower than one bubble spawns it on the centre line.
    pub fn ingest_with_rng<R: Rng + ?Sized>(
        &mut self,
        payload: MessagePayload,
        surface: Surface,
        rng: &mut R,
    ) -> &Bubble {
        let x = spawn_coordinate(surface.width, self.bubble_size, rng);
        let y = spawn_coordinate(surface.height, self.bubble_size, rng);

        let speed = self.min_speed + rng.gen::<f64>() * (self.max_speed - self.min_speed);
        let angle = rng.gen::<f64>() * PI * 2.0;
        let bubble = Bubble::from_payload(payload, x, y, angle.cos() * speed, angle.sin() * speed);

        self.bubbles.push_back(bubble);
        while self.bubbles.len() > self.capacity {
            if let Some(evicted) = self.bubbles.pop_front() {
                log::debug!("Evicted bubble {} from {}", evicted.id, evicted.name);
            }
        }
        &self.bubbles[self.bubbles.len() - 1]
    }
}

fn spawn_coordinate<R: Rng + ?Sized>(extent: f64, size: f64, rng: &mut R) -> f64 {
    if extent <= size {
        return extent / 2.0;
    }
    rng.gen::<f64>() * (extent - size) + size / 2.0
}
