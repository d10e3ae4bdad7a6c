//! Substrate trait definitions and core types
//!
//! Defines the abstract peer-to-peer interface that both the simulated
//! substrate and a real relay/WebRTC binding conform to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TransportError;

/// Lifecycle of a single data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Events emitted by a data channel, in the order the substrate produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Data(Vec<u8>),
    Close,
    Error(String),
}

/// One end of a reliable data channel between two named peers.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Name of the peer at the other end.
    fn peer_name(&self) -> &str;

    fn state(&self) -> ConnectionState;

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send one structured message. Fails unless the channel is open.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next lifecycle or data event.
    ///
    /// Returns `None` once the channel has been fully torn down and no
    /// further events can arrive.
    async fn next_event(&self) -> Option<ConnectionEvent>;

    /// Close the channel. The remote end observes `ConnectionEvent::Close`.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A peer registered on the substrate under a unique name.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// The name assigned on registration.
    fn name(&self) -> &str;

    /// Start a reliable connection to `target`.
    ///
    /// The returned connection is still `Connecting`; it reports `Open`,
    /// `Error` or `Close` through `next_event`.
    async fn connect(&self, target: &str) -> Result<Box<dyn PeerConnection>, TransportError>;

    /// Accept the next inbound connection.
    async fn accept(&self) -> Result<Box<dyn PeerConnection>, TransportError>;

    /// Release the registered name. Further connects and accepts fail.
    async fn destroy(&self) -> Result<(), TransportError>;
}

/// The peer-discovery/relay service.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Register a peer. `None` requests an anonymous, substrate-assigned name.
    ///
    /// Fails with `TransportError::NameTaken` when `name` is already held by a
    /// live peer.
    async fn register_peer(&self, name: Option<&str>) -> Result<Box<dyn PeerHandle>, TransportError>;
}
