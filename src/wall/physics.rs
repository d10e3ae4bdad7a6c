//! Per-frame bubble motion
//!
//! Fixed explicit-Euler step per frame: position advances by one velocity,
//! then walls and the exclusion zone are resolved. Bubbles never collide
//! with each other.

use super::bubble::{Bubble, Rect, Surface};

/// Clearance left between a bubble and an obstacle edge after a bounce.
pub const OBSTACLE_CLEARANCE: f64 = 1.0;

/// Advance every bubble by one frame.
pub fn step_all<'a>(
    bubbles: impl IntoIterator<Item = &'a mut Bubble>,
    surface: Surface,
    obstacle: Option<Rect>,
    radius: f64,
) {
    for bubble in bubbles {
        step_bubble(bubble, surface, obstacle, radius);
    }
}

/// Advance one bubble by one frame.
pub fn step_bubble(bubble: &mut Bubble, surface: Surface, obstacle: Option<Rect>, radius: f64) {
    bubble.x += bubble.vx;
    bubble.y += bubble.vy;

    bounce_walls(bubble, surface, radius);
    if let Some(obstacle) = obstacle {
        bounce_obstacle(bubble, &obstacle, radius);
    }
}

fn bounce_walls(bubble: &mut Bubble, surface: Surface, radius: f64) {
    if bubble.x - radius <= 0.0 || bubble.x + radius >= surface.width {
        bubble.vx = -bubble.vx;
        bubble.x = clamp_axis(bubble.x, radius, surface.width);
    }
    if bubble.y - radius <= 0.0 || bubble.y + radius >= surface.height {
        bubble.vy = -bubble.vy;
        bubble.y = clamp_axis(bubble.y, radius, surface.height);
    }
}

/// Keep a centre coordinate within `[radius, extent - radius]`; the lower
/// bound wins on surfaces smaller than one bubble.
fn clamp_axis(value: f64, radius: f64, extent: f64) -> f64 {
    radius.max(value.min(extent - radius))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

fn bounce_obstacle(bubble: &mut Bubble, obstacle: &Rect, radius: f64) {
    let bounds = bubble.bounds(radius);
    if !bounds.overlaps(obstacle) {
        return;
    }

    // Penetration depth from each obstacle side; the shallowest decides the bounce.
    // Ties resolve left, right, top, bottom.
    let depths = [
        (Side::Left, bounds.right() - obstacle.left()),
        (Side::Right, obstacle.right() - bounds.left()),
        (Side::Top, bounds.bottom() - obstacle.top()),
        (Side::Bottom, obstacle.bottom() - bounds.top()),
    ];
    let mut side = depths[0].0;
    let mut min_depth = depths[0].1;
    for &(candidate, depth) in &depths[1..] {
        if depth < min_depth {
            side = candidate;
            min_depth = depth;
        }
    }

    match side {
        Side::Left => {
            bubble.vx = -bubble.vx;
            bubble.x = obstacle.left() - radius - OBSTACLE_CLEARANCE;
        }
        Side::Right => {
            bubble.vx = -bubble.vx;
            bubble.x = obstacle.right() + radius + OBSTACLE_CLEARANCE;
        }
        Side::Top => {
            bubble.vy = -bubble.vy;
            bubble.y = obstacle.top() - radius - OBSTACLE_CLEARANCE;
        }
        Side::Bottom => {
            bubble.vy = -bubble.vy;
            bubble.y = obstacle.bottom() + radius + OBSTACLE_CLEARANCE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BubbleColor, BubbleIcon, MessagePayload};

    const R: f64 = 90.0;

    fn bubble(x: f64, y: f64, vx: f64, vy: f64) -> Bubble {
        let payload = MessagePayload::compose("", "", "hi", BubbleColor::Orange, BubbleIcon::Heart).unwrap();
        Bubble::from_payload(payload, x, y, vx, vy)
    }

    fn surface() -> Surface {
        Surface::new(1000.0, 800.0)
    }

    #[test]
    fn test_free_flight_is_position_plus_velocity() {
        let mut b = bubble(500.0, 400.0, 1.25, -0.75);
        step_bubble(&mut b, surface(), Some(Rect::new(0.0, 0.0, 50.0, 50.0)), R);
        assert_eq!((b.x, b.y), (501.25, 399.25));
        assert_eq!((b.vx, b.vy), (1.25, -0.75));
    }

    #[test]
    fn test_right_wall_bounce() {
        let mut b = bubble(909.5, 400.0, 1.5, 0.0);
        step_bubble(&mut b, surface(), None, R);
        assert!(b.vx < 0.0);
        assert!(b.x <= 1000.0 - R);
        assert_eq!(b.x, 910.0);
    }

    #[test]
    fn test_left_and_bottom_walls() {
        let mut b = bubble(90.5, 709.0, -2.0, 1.5);
        step_bubble(&mut b, surface(), None, R);
        assert_eq!((b.vx, b.vy), (2.0, -1.5));
        assert_eq!((b.x, b.y), (R, 800.0 - R));
    }

    #[test]
    fn test_bubble_touching_wall_stays_clamped() {
        // Touching the wall counts as a hit, matching the inclusive edge test.
        let mut b = bubble(R, 400.0, 0.0, 0.0);
        step_bubble(&mut b, surface(), None, R);
        assert_eq!(b.x, R);
    }

    #[test]
    fn test_obstacle_bounce_from_left_side() {
        let obstacle = Rect::new(500.0, 300.0, 200.0, 200.0);
        // Right edge 5px into the obstacle, far from its top and bottom.
        let mut b = bubble(414.0, 400.0, 1.0, 0.5);
        step_bubble(&mut b, surface(), Some(obstacle), R);

        assert_eq!(b.vx, -1.0);
        assert_eq!(b.vy, 0.5);
        assert_eq!(b.x + R, obstacle.left() - OBSTACLE_CLEARANCE);
    }

    #[test]
    fn test_obstacle_bounce_from_below() {
        let obstacle = Rect::new(400.0, 100.0, 300.0, 200.0);
        let mut b = bubble(550.0, 392.0, 0.0, -3.0);
        step_bubble(&mut b, surface(), Some(obstacle), R);

        assert_eq!(b.vy, 3.0);
        assert_eq!(b.y - R, obstacle.bottom() + OBSTACLE_CLEARANCE);
        assert_eq!(b.x, 550.0);
    }

    #[test]
    fn test_obstacle_bounce_from_right_and_top() {
        let obstacle = Rect::new(300.0, 300.0, 200.0, 200.0);

        let mut from_right = bubble(592.0, 400.0, -3.0, 0.0);
        step_bubble(&mut from_right, surface(), Some(obstacle), R);
        assert_eq!(from_right.vx, 3.0);
        assert_eq!(from_right.x - R, obstacle.right() + OBSTACLE_CLEARANCE);

        let mut from_top = bubble(400.0, 208.0, 0.0, 3.0);
        step_bubble(&mut from_top, surface(), Some(obstacle), R);
        assert_eq!(from_top.vy, -3.0);
        assert_eq!(from_top.y + R, obstacle.top() - OBSTACLE_CLEARANCE);
    }

    #[test]
    fn test_equal_overlap_prefers_horizontal_axis() {
        let obstacle = Rect::new(500.0, 300.0, 200.0, 200.0);
        // Bottom-right corner 10px into the obstacle's top-left corner on both axes.
        let mut b = bubble(420.0, 220.0, 0.0, 0.0);
        step_bubble(&mut b, surface(), Some(obstacle), R);
        assert_eq!(b.x, obstacle.left() - R - OBSTACLE_CLEARANCE);
        assert_eq!(b.y, 220.0);
    }

    #[test]
    fn test_step_all_moves_every_bubble() {
        let mut bubbles = vec![bubble(200.0, 200.0, 1.0, 0.0), bubble(600.0, 600.0, 0.0, 1.0)];
        step_all(bubbles.iter_mut(), surface(), None, R);
        assert_eq!(bubbles[0].x, 201.0);
        assert_eq!(bubbles[1].y, 601.0);
    }

    #[test]
    fn test_bubbles_stay_on_surface_over_many_frames() {
        let s = surface();
        // Leaves more than one bubble of room on every side.
        let obstacle = Rect::new(400.0, 300.0, 200.0, 200.0);
        let mut bubbles: Vec<Bubble> = (0..10)
            .map(|i| bubble(100.0 + 80.0 * i as f64, 650.0, 1.9 - 0.3 * i as f64, -1.7 + 0.2 * i as f64))
            .collect();

        for _ in 0..5000 {
            step_all(bubbles.iter_mut(), s, Some(obstacle), R);
            for b in &bubbles {
                assert!(b.x >= R - 1e-9 && b.x <= s.width - R + 1e-9);
                assert!(b.y >= R - 1e-9 && b.y <= s.height - R + 1e-9);
            }
        }
    }
}
