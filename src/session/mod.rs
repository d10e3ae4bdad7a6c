//! Host and guest connection managers
//!
//! The host claims the room name on the substrate and funnels every guest's
//! payloads to a single subscriber. A guest registers anonymously, connects
//! to the room with a bounded timeout and sends messages while open.

pub mod guest;
pub mod host;

pub use guest::{GuestSession, GuestState};
pub use host::{HostSession, HostState};

use thiserror::Error;

use crate::config::RoomId;
use crate::message::PayloadError;
use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Room ID already in use. Please refresh the page.")]
    RoomInUse(RoomId),

    #[error("A message subscriber is already registered")]
    AlreadySubscribed,

    #[error("Invalid host state: {0}")]
    InvalidState(&'static str),

    #[error("Invalid wall configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestError {
    #[error("Connection timeout - check if host is online")]
    Timeout,

    #[error("Failed to connect to host. Make sure the host is online. ({0})")]
    ConnectionFailed(String),

    #[error("Not connected to host")]
    NotConnected,

    #[error("Please wait {remaining_ms} ms before sending another message")]
    CoolingDown { remaining_ms: u64 },

    #[error("Invalid guest state: {0}")]
    InvalidState(&'static str),

    #[error("{0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("{0}")]
    Transport(#[from] TransportError),
}
