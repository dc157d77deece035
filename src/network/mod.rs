//! Network Layer
//!
//! TCP server, room lifecycle and the lobby. All game rules live in `game/`;
//! this layer only routes commands in and lines out.

pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;

pub use protocol::{ClientMessage, ProtocolError, RoomListing, ServerMessage};
pub use registry::{ClientId, RegistryError, RoomRegistry};
pub use room::{Room, RoomConfig, RoomError, RoomHandle, RoomPhase};
pub use server::{GameServer, GameServerError};
