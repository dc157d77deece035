//! # Bomb Arena Game Server
//!
//! Authoritative multi-room server for a grid-based bomb arena game.
//! Clients send key toggles and actions over a line-based TCP protocol; the
//! server simulates every room and streams the results back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BOMB ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Match simulation (no I/O)                 │
//! │  ├── grid.rs     - Tile grid and cell math                   │
//! │  ├── map.rs      - Arena generation                          │
//! │  ├── state.rs    - Match and player state                    │
//! │  ├── collision.rs- Hitbox movement checks                    │
//! │  ├── bomb.rs     - Fuses, blasts, item drops                 │
//! │  ├── arena.rs    - Shrinking arena                           │
//! │  └── tick.rs     - Per-tick step                             │
//! │                                                              │
//! │  network/        - Sockets, rooms, lobby                     │
//! │  ├── protocol.rs - Line codec                                │
//! │  ├── room.rs     - Room lifecycle and tick loop              │
//! │  ├── registry.rs - Room registry and lobby dispatch          │
//! │  └── server.rs   - TCP accept loop and connections           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each room runs as its own tokio task on a 16 ms interval. Within a tick
//! the order is fixed: movement, bombs, arena, clock, then broadcast.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use core::rng::DeterministicRng;
pub use game::state::{MatchState, PlayerId, PlayerState};
pub use network::{GameServer, GameServerError, RoomRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick period in milliseconds.
pub const TICK_MILLIS: u64 = 16;

/// Tile edge length in pixels.
pub const TILE_SIZE: f32 = 32.0;

/// Grid width in tiles.
pub const GRID_COLS: usize = 13;

/// Grid height in tiles.
pub const GRID_ROWS: usize = 13;

/// Players allowed in one room.
pub const MAX_ROOM_PLAYERS: usize = 4;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5000;

/// Whole ticks that fit in a duration.
pub const fn ticks_from_millis(millis: u64) -> u32 {
    (millis / TICK_MILLIS) as u32
}

/// Match duration in ticks (180 seconds).
pub const MATCH_DURATION_TICKS: u32 = ticks_from_millis(180_000);
