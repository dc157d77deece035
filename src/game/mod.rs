//! Game Logic Module
//!
//! The match simulation. Nothing in here touches sockets or clocks; the
//! network layer drives it one tick at a time.
//!
//! ## Module Structure
//!
//! - `grid`: Tile grid and cell math
//! - `map`: Arena generation and spawn corners
//! - `input`: Held movement keys
//! - `state`: Match, player, bomb and item state
//! - `collision`: Hitbox tests against tiles, bombs and players
//! - `bomb`: Placement, fuses, blasts, drops
//! - `arena`: Late-match shrink schedule
//! - `events`: Events emitted for broadcast
//! - `tick`: Per-tick step and match configuration

pub mod arena;
pub mod bomb;
pub mod collision;
pub mod events;
pub mod grid;
pub mod input;
pub mod map;
pub mod state;
pub mod tick;

// Re-export key types
pub use events::{GameEvent, GameEventData, MatchOutcome};
pub use grid::{GridPos, Tile, TileGrid};
pub use input::{Direction, MoveIntent};
pub use state::{MatchState, PlayerId, PlayerState};
pub use tick::{MatchConfig, TickResult};
