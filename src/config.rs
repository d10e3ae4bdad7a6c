//! Startup configuration
//!
//! `LaunchConfig` decides host vs guest role and the room once, from the
//! location the app was opened with. `WallConfig` carries the tunables and
//! can be loaded from a JSON file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_ID_LENGTH: usize = 6;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid room id: {0:?}")]
    InvalidRoomId(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Shared room token: the host's peer name and the `#room=` fragment value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::thread_rng())
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token = (0..ROOM_ID_LENGTH)
            .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ConfigError::InvalidRoomId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RoomId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

/// Role and room, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub role: Role,
    pub room: RoomId,
    /// True when no room was supplied and a fresh one was generated.
    pub generated: bool,
}

impl LaunchConfig {
    /// Resolve a location such as `https://wall.example/?mode=host#room=ABC123`.
    ///
    /// A room in the fragment without `mode=host` means guest. With
    /// `mode=host` the host reclaims that room. Without a room a new host
    /// room is generated.
    pub fn from_location(location: &str) -> Self {
        Self::from_location_with_rng(location, &mut rand::thread_rng())
    }

    pub fn from_location_with_rng<R: Rng + ?Sized>(location: &str, rng: &mut R) -> Self {
        let (before_hash, fragment) = match location.split_once('#') {
            Some((before, fragment)) => (before, Some(fragment)),
            None => (location, None),
        };
        let query = before_hash.split_once('?').map(|(_, q)| q).unwrap_or("");
        let host_mode = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, value)| key == "mode" && value == "host");

        match fragment.and_then(room_from_fragment) {
            Some(room) => Self {
                role: if host_mode { Role::Host } else { Role::Guest },
                room,
                generated: false,
            },
            None => Self {
                role: Role::Host,
                room: RoomId::generate_with_rng(rng),
                generated: true,
            },
        }
    }

    /// Link guests open (QR code target).
    pub fn guest_url(&self, base: &str) -> String {
        format!("{}#room={}", base, self.room)
    }

    /// Link that reopens this room as host.
    pub fn host_url(&self, base: &str) -> String {
        format!("{}?mode=host#room={}", base, self.room)
    }
}

/// Extract the leading `[A-Za-z0-9-]+` run after `room=`.
fn room_from_fragment(fragment: &str) -> Option<RoomId> {
    let rest = fragment.strip_prefix("room=")?;
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Bounded retry for guest connection attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 1 disables retry.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Fraction of each delay randomised away, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 1000,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt + 1` (`attempt` counts from 1).
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay_ms.saturating_mul(1u64 << exp) as f64;
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 - jitter * rng.gen::<f64>();
        Duration::from_millis((base * factor) as u64)
    }
}

/// Tunables for the wall and both session managers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub max_bubbles: usize,
    pub bubble_size: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub connect_timeout_ms: u64,
    pub frame_interval_ms: u64,
    pub send_cooldown_ms: u64,
    /// Capacity of the host → store payload channel.
    pub inbox_capacity: usize,
    pub connect_retry: RetryPolicy,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            max_bubbles: 20,
            bubble_size: 180.0,
            min_speed: 0.5,
            max_speed: 2.0,
            connect_timeout_ms: 15_000,
            frame_interval_ms: 16,
            send_cooldown_ms: 2000,
            inbox_capacity: 64,
            connect_retry: RetryPolicy::default(),
        }
    }
}

impl WallConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bubbles == 0 {
            return Err(invalid("max_bubbles", "must be at least 1"));
        }
        if !(self.bubble_size > 0.0) {
            return Err(invalid("bubble_size", "must be positive"));
        }
        if !(self.min_speed >= 0.0 && self.min_speed <= self.max_speed) {
            return Err(invalid("min_speed", "must be within [0, max_speed]"));
        }
        if self.frame_interval_ms == 0 {
            return Err(invalid("frame_interval_ms", "must be at least 1"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("inbox_capacity", "must be at least 1"));
        }
        if self.connect_retry.max_attempts == 0 {
            return Err(invalid("connect_retry.max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn send_cooldown(&self) -> Duration {
        Duration::from_millis(self.send_cooldown_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
