//! Bubble entity and rendering-surface geometry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{BubbleColor, BubbleIcon, MessagePayload};

/// QR panel inset from the top-right corner of the surface.
const QR_PANEL_MARGIN: f64 = 64.0;
const QR_PANEL_WIDTH: f64 = 232.0;
const QR_PANEL_HEIGHT: f64 = 276.0;

/// Pixel size of the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// The on-screen QR panel bubbles bounce off, pinned to the top-right corner.
    pub fn qr_panel(surface: Surface) -> Self {
        Self {
            x: surface.width - QR_PANEL_MARGIN - QR_PANEL_WIDTH,
            y: QR_PANEL_MARGIN,
            width: QR_PANEL_WIDTH,
            height: QR_PANEL_HEIGHT,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Strict overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.right() > other.left()
            && self.left() < other.right()
            && self.bottom() > other.top()
            && self.top() < other.bottom()
    }
}

/// One accepted message floating on the wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    pub id: Uuid,
    pub name: String,
    pub program: String,
    pub text: String,
    pub color: BubbleColor,
    pub icon: BubbleIcon,
    /// Centre position.
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub created_at: DateTime<Utc>,
}

impl Bubble {
    pub fn from_payload(payload: MessagePayload, x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: payload.name,
            program: payload.program,
            text: payload.text,
            color: payload.color,
            icon: payload.icon,
            x,
            y,
            vx,
            vy,
            created_at: Utc::now(),
        }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    /// Axis-aligned bounding box of the bubble's circle.
    pub fn bounds(&self, radius: f64) -> Rect {
        Rect::new(self.x - radius, self.y - radius, radius * 2.0, radius * 2.0)
    }
}
