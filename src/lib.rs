// Bubble Wall - peer-to-peer message wall

pub mod config;
pub mod message;
pub mod session;
pub mod transport;
pub mod wall;

pub use config::{LaunchConfig, Role, RoomId, WallConfig};
pub use message::{BubbleColor, BubbleIcon, MessagePayload};
pub use session::{GuestError, GuestSession, GuestState, HostError, HostSession, HostState};
pub use transport::{SimSubstrate, Substrate};
pub use wall::{Bubble, MessageWall, Surface};
