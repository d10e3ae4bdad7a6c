//! End-to-end wall tests
//!
//! Hosts and guests talk over the in-process SimSubstrate; time is paused
//! so connection timeouts and frame pacing run on virtual time.
//!
//! Run with:
//!   cargo test --test message_wall

use std::sync::Arc;
use std::time::Duration;

use bubble_wall::session::{GuestError, GuestState, HostError, HostState};
use bubble_wall::{
    BubbleColor, BubbleIcon, GuestSession, HostSession, MessagePayload, MessageWall, RoomId,
    SimSubstrate, Surface, WallConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn room() -> RoomId {
    "ABC123".parse().unwrap()
}

fn surface() -> Surface {
    Surface::new(1920.0, 1080.0)
}

async fn start_wall(substrate: &Arc<SimSubstrate>) -> MessageWall {
    MessageWall::start(substrate.clone(), room(), &WallConfig::default(), surface())
        .await
        .unwrap()
}

async fn send_as_guest(substrate: &Arc<SimSubstrate>, payload: &MessagePayload) {
    let guest = GuestSession::new(substrate.clone(), room(), &WallConfig::default());
    guest.connect().await.unwrap();
    guest.send_message(payload).await.unwrap();
    guest.disconnect().await;
}

/// Let spawned tasks drain without reaching the next frame.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn guest_message_becomes_bubble() {
    let substrate = SimSubstrate::new();
    let wall = start_wall(&substrate).await;

    let payload = MessagePayload::compose("Alex", "BSIT 4-2", "Hi!", BubbleColor::Orange, BubbleIcon::Heart).unwrap();
    send_as_guest(&substrate, &payload).await;
    settle().await;

    let bubbles = wall.snapshot().await;
    assert_eq!(bubbles.len(), 1);
    let bubble = &bubbles[0];
    assert_eq!(bubble.name, "Alex");
    assert_eq!(bubble.program, "BSIT 4-2");
    assert_eq!(bubble.text, "Hi!");
    assert_eq!(bubble.color, BubbleColor::Orange);
    assert_eq!(bubble.icon, BubbleIcon::Heart);
    assert!(bubble.x >= 0.0 && bubble.x <= 1920.0);
    assert!(bubble.y >= 0.0 && bubble.y <= 1080.0);
    let speed = bubble.speed();
    assert!(speed >= 0.5 - 1e-9 && speed <= 2.0 + 1e-9);

    wall.shutdown().await;
    assert_eq!(wall.bubble_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn wall_keeps_newest_twenty_in_arrival_order() {
    let substrate = SimSubstrate::new();
    let wall = start_wall(&substrate).await;

    let guest = GuestSession::new(
        substrate.clone(),
        room(),
        &WallConfig {
            send_cooldown_ms: 0,
            ..WallConfig::default()
        },
    );
    guest.connect().await.unwrap();
    for i in 0..27 {
        let payload =
            MessagePayload::compose("", "", &format!("msg {}", i), BubbleColor::Amber, BubbleIcon::Sparkles).unwrap();
        guest.send_message(&payload).await.unwrap();
    }
    settle().await;

    let texts: Vec<String> = wall.snapshot().await.into_iter().map(|b| b.text).collect();
    let expected: Vec<String> = (7..27).map(|i| format!("msg {}", i)).collect();
    assert_eq!(texts, expected);
}

#[tokio::test(start_paused = true)]
async fn many_guests_share_one_wall() {
    let substrate = SimSubstrate::new();
    let wall = start_wall(&substrate).await;

    let mut sessions = Vec::new();
    for i in 0..5 {
        let guest = GuestSession::new(substrate.clone(), room(), &WallConfig::default());
        guest.connect().await.unwrap();
        let payload =
            MessagePayload::compose(&format!("g{}", i), "", "hello", BubbleColor::Peach, BubbleIcon::Users).unwrap();
        guest.send_message(&payload).await.unwrap();
        sessions.push(guest);
    }
    settle().await;

    assert_eq!(wall.host().connection_count().await, 5);
    assert_eq!(wall.bubble_count().await, 5);

    // One guest leaving does not disturb the others.
    sessions[0].disconnect().await;
    settle().await;
    assert_eq!(wall.host().connection_count().await, 4);
    assert!(sessions[1].is_connected());
}

#[tokio::test(start_paused = true)]
async fn second_host_for_same_room_is_rejected() {
    let substrate = SimSubstrate::new();
    let a = HostSession::new(substrate.clone(), room(), 8);
    let b = HostSession::new(substrate.clone(), room(), 8);

    let (ra, rb) = tokio::join!(a.start(), b.start());

    let states = [a.state(), b.state()];
    assert_eq!(states.iter().filter(|s| **s == HostState::Ready).count(), 1);
    assert!(states.contains(&HostState::Error(HostError::RoomInUse(room()))));
    assert!(ra.is_ok() != rb.is_ok());
}

#[tokio::test(start_paused = true)]
async fn guest_times_out_against_silent_host() {
    let substrate = SimSubstrate::with_open_latency(Duration::from_secs(3600));
    let _wall = start_wall(&substrate).await;

    let guest = GuestSession::new(substrate.clone(), room(), &WallConfig::default());
    assert_eq!(guest.connect().await, Err(GuestError::Timeout));
    assert_eq!(guest.state(), GuestState::Failed(GuestError::Timeout));

    let payload = MessagePayload::compose("", "", "lost", BubbleColor::Orange, BubbleIcon::Heart).unwrap();
    assert_eq!(guest.send_message(&payload).await, Err(GuestError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn slow_open_inside_window_connects() {
    let substrate = SimSubstrate::with_open_latency(Duration::from_millis(14_999));
    let wall = start_wall(&substrate).await;

    let payload = MessagePayload::compose("", "", "made it", BubbleColor::Orange, BubbleIcon::Heart).unwrap();
    send_as_guest(&substrate, &payload).await;
    settle().await;

    assert_eq!(wall.snapshot().await[0].text, "made it");
}

#[tokio::test(start_paused = true)]
async fn guest_without_host_fails() {
    let substrate = SimSubstrate::new();
    let guest = GuestSession::new(substrate.clone(), room(), &WallConfig::default());

    let err = guest.connect().await.unwrap_err();
    assert!(matches!(err, GuestError::ConnectionFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn bubbles_keep_moving_inside_the_surface() {
    let substrate = SimSubstrate::new();
    let wall = start_wall(&substrate).await;

    for i in 0..3 {
        let payload =
            MessagePayload::compose("", "", &format!("{}", i), BubbleColor::Coral, BubbleIcon::Flower2).unwrap();
        send_as_guest(&substrate, &payload).await;
    }
    settle().await;
    let before = wall.snapshot().await;

    tokio::time::sleep(Duration::from_millis(160)).await;
    let after = wall.snapshot().await;

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert_ne!((b.x, b.y), (a.x, a.y));
    }
}
