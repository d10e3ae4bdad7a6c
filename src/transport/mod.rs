//! Peer transport layer for the message wall
//!
//! Provides the substrate abstraction traits (named peer registration,
//! outbound connects, inbound accepts, structured data channels) and an
//! in-process simulated substrate for testing.

pub mod simulated;
pub mod substrate;

pub use simulated::SimSubstrate;
pub use substrate::{ConnectionEvent, ConnectionState, PeerConnection, PeerHandle, Substrate};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Another peer already holds the requested name.
    #[error("Peer name already taken: {0}")]
    NameTaken(String),

    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("Connection is not open")]
    NotOpen,

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Peer has been destroyed")]
    Destroyed,

    #[error("Network error: {0}")]
    Network(String),
}
