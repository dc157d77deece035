//! Game Events
//!
//! Everything the simulation wants clients to hear about, in the order it
//! happened. The room turns these into protocol lines.

use crate::game::arena::{ArenaBounds, ShrinkPattern};
use crate::game::grid::GridPos;
use crate::game::state::{ItemKind, PlayerId};

/// One tile of a blast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlastSegment {
    /// Tile covered.
    pub pos: GridPos,
    /// Part of an up/down ray.
    pub vertical: bool,
}

/// How a match ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Clock ran out with nobody left standing, or in a solo match.
    TimeUp,
    /// One player left.
    Winner(PlayerId),
    /// Clock ran out with several players alive.
    Survivors(Vec<PlayerId>),
    /// Everyone died in the same tick.
    Draw,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEventData {
    /// A bomb was placed.
    BombPlaced {
        /// Cell the bomb sits on
        pos: GridPos,
        /// Player who placed it
        owner: PlayerId,
    },

    /// A bomb went off. `segments[0]` is the centre.
    Explosion {
        /// Cell the bomb sat on
        center: GridPos,
        /// Every cell the blast reached, centre first
        segments: Vec<BlastSegment>,
    },

    /// A breakable tile turned into floor.
    TileBroken {
        /// Cell of the broken crate
        pos: GridPos,
    },

    /// An item dropped from a broken tile.
    ItemSpawned {
        /// Cell the item dropped on
        pos: GridPos,
        /// Item type
        kind: ItemKind,
    },

    /// A player collected an item.
    ItemPicked {
        /// Collector
        player: PlayerId,
        /// Cell the item was on
        pos: GridPos,
        /// Item type
        kind: ItemKind,
    },

    /// A player was eliminated.
    PlayerDied {
        /// Eliminated player
        player: PlayerId,
    },

    /// A shrink step is pending.
    ArenaWarning {
        /// Which edges will close
        pattern: ShrinkPattern,
        /// Playable area once the step lands
        bounds: ArenaBounds,
    },

    /// A shrink step finished. The grid changed.
    ArenaShrunk {
        /// Which edges closed
        pattern: ShrinkPattern,
        /// Playable area after the step
        bounds: ArenaBounds,
    },

    /// The match is decided.
    MatchEnded {
        /// How the match was decided
        outcome: MatchOutcome,
    },
}

/// A game event stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameEvent {
    /// Tick number.
    pub tick: u32,
    /// Payload.
    pub data: GameEventData,
}

impl GameEvent {
    /// Create an event.
    pub fn new(tick: u32, data: GameEventData) -> Self {
        Self { tick, data }
    }
}
