//! Game State Definitions
//!
//! All state owned by one running match. Players live in a BTreeMap so every
//! pass over them runs in id order.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::rng::DeterministicRng;
use crate::game::arena::ArenaState;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::grid::{cell_of, GridPos, TileGrid};
use crate::game::input::{Direction, MoveIntent};
use crate::TICK_MILLIS;

/// Starting bomb capacity.
pub const DEFAULT_MAX_BOMBS: u32 = 1;
/// Starting blast range in tiles.
pub const DEFAULT_BLAST_RANGE: u32 = 2;
/// Walking speed in pixels per 1/60 s.
pub const DEFAULT_SPEED: f32 = 3.0;
/// Speed while a SPEED_UP boost is active.
pub const BOOSTED_SPEED: f32 = 5.0;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Per-room player identifier, handed out in join order starting at 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Animation state reported in `STATE` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AnimState {
    /// Standing still.
    #[default]
    Idle,
    /// Holding a direction.
    Walk,
    /// Eliminated.
    Dead,
}

impl AnimState {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AnimState::Idle => "IDLE",
            AnimState::Walk => "WALK",
            AnimState::Dead => "DEAD",
        }
    }
}

/// Full state of one player in a match.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Player identifier.
    pub id: PlayerId,
    /// Sprite top-left, pixels.
    pub x: f32,
    /// Sprite top-left, pixels.
    pub y: f32,
    /// Held movement keys.
    pub intent: MoveIntent,
    /// Derived animation.
    pub anim: AnimState,
    /// Last facing.
    pub facing: Direction,
    /// Still in the match.
    pub alive: bool,
    /// Ticks since death.
    pub dead_ticks: u32,
    /// Bombs on the field that this player owns.
    pub active_bombs: u32,
    /// Base capacity.
    pub max_bombs: u32,
    /// Extra capacity from BOMB_UP pickups.
    pub bonus_bombs: u32,
    /// Base blast range.
    pub blast_range: u32,
    /// Current speed.
    pub speed: f32,
    /// Remaining SPEED_UP ticks.
    pub boost_ticks: u32,
    /// Next bomb gets +1 range.
    pub fire_pending: bool,
}

impl PlayerState {
    /// Create a player standing on a spawn tile.
    pub fn new(id: PlayerId, spawn: GridPos) -> Self {
        let (x, y) = spawn.origin();
        Self {
            id,
            x,
            y,
            intent: MoveIntent::default(),
            anim: AnimState::Idle,
            facing: Direction::Down,
            alive: true,
            dead_ticks: 0,
            active_bombs: 0,
            max_bombs: DEFAULT_MAX_BOMBS,
            bonus_bombs: 0,
            blast_range: DEFAULT_BLAST_RANGE,
            speed: DEFAULT_SPEED,
            boost_ticks: 0,
            fire_pending: false,
        }
    }

    /// Cell used for pickups, blast hits and bomb placement.
    #[inline]
    pub fn cell(&self) -> GridPos {
        cell_of(self.x, self.y)
    }

    /// How many bombs may be on the field at once.
    #[inline]
    pub fn bomb_capacity(&self) -> u32 {
        self.max_bombs + self.bonus_bombs
    }

    /// Mark dead. Returns false if already dead.
    pub fn kill(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.dead_ticks = 0;
        self.anim = AnimState::Dead;
        self.intent.clear();
        true
    }

    /// Recompute animation and facing from the held keys.
    pub fn refresh_animation(&mut self) {
        if !self.alive {
            self.anim = AnimState::Dead;
            return;
        }
        match self.intent.facing() {
            Some(dir) => {
                self.anim = AnimState::Walk;
                self.facing = dir;
            }
            None => self.anim = AnimState::Idle,
        }
    }
}

// =============================================================================
// BOMBS & ITEMS
// =============================================================================

/// A placed bomb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bomb {
    /// Tile the bomb sits on.
    pub pos: GridPos,
    /// Who placed it.
    pub owner: PlayerId,
    /// Blast range in tiles.
    pub range: u32,
    /// Ticks until detonation.
    pub fuse_ticks: u32,
    /// Ticks until the bomb blocks movement.
    pub grace_ticks: u32,
    /// Detonated, waiting to be purged.
    pub exploded: bool,
}

impl Bomb {
    /// Blocks movement once the grace period is over.
    #[inline]
    pub fn is_solid(&self) -> bool {
        !self.exploded && self.grace_ticks == 0
    }
}

/// Power-up kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// +1 bomb capacity.
    BombUp,
    /// Next bomb +1 range.
    FireUp,
    /// Temporary speed boost.
    SpeedUp,
}

impl ItemKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::BombUp => "BOMB_UP",
            ItemKind::FireUp => "FIRE_UP",
            ItemKind::SpeedUp => "SPEED_UP",
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// One player entry of a `STATE` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSnapshot {
    /// Player identifier.
    pub id: PlayerId,
    /// Truncated x.
    pub x: i32,
    /// Truncated y.
    pub y: i32,
    /// Animation.
    pub anim: AnimState,
    /// Facing.
    pub facing: Direction,
}

/// Everything a `STATE` frame carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Whole seconds left, rounded up.
    pub clock_secs: u32,
    /// Visible players in id order.
    pub players: Vec<PlayerSnapshot>,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// Ticks simulated so far.
    pub tick: u32,
    /// Ticks left on the match clock.
    pub ticks_remaining: u32,
    /// The arena.
    pub grid: TileGrid,
    /// Players by id.
    pub players: BTreeMap<PlayerId, PlayerState>,
    /// Bombs in placement order.
    pub bombs: Vec<Bomb>,
    /// Items on the floor, at most one per tile.
    pub items: BTreeMap<GridPos, ItemKind>,
    /// Shrink progress.
    pub arena: ArenaState,
    /// Drives item drops.
    pub rng: DeterministicRng,
    /// At some point two or more players were in the match.
    pub contested: bool,
    events: Vec<GameEvent>,
}

impl MatchState {
    /// Create a match on a generated grid.
    pub fn new(grid: TileGrid, rng: DeterministicRng, duration_ticks: u32) -> Self {
        let arena = ArenaState::new(grid.cols(), grid.rows());
        Self {
            tick: 0,
            ticks_remaining: duration_ticks,
            grid,
            players: BTreeMap::new(),
            bombs: Vec::new(),
            items: BTreeMap::new(),
            arena,
            rng,
            contested: false,
            events: Vec::new(),
        }
    }

    /// Add a player at a spawn tile.
    pub fn add_player(&mut self, id: PlayerId, spawn: GridPos) {
        self.players.insert(id, PlayerState::new(id, spawn));
        if self.players.len() > 1 {
            self.contested = true;
        }
    }

    /// Remove a player. Their bombs stay armed.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerState> {
        self.players.remove(&id)
    }

    /// Get a player.
    pub fn get_player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Get a player mutably.
    pub fn get_player_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    /// Number of live players.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Ids of live players in id order.
    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| p.id)
            .collect()
    }

    /// Unexploded bomb on a tile.
    pub fn bomb_at(&self, pos: GridPos) -> Option<&Bomb> {
        self.bombs.iter().find(|b| b.pos == pos && !b.exploded)
    }

    /// Kill a player, emitting `PlayerDied` only on the first call.
    pub fn kill_player(&mut self, id: PlayerId) -> bool {
        let killed = self
            .players
            .get_mut(&id)
            .map(|p| p.kill())
            .unwrap_or(false);
        if killed {
            self.push_event(GameEventData::PlayerDied { player: id });
        }
        killed
    }

    /// Kill every live player whose cell is `pos`.
    pub fn kill_players_at(&mut self, pos: GridPos) {
        let victims: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.alive && p.cell() == pos)
            .map(|p| p.id)
            .collect();
        for id in victims {
            self.kill_player(id);
        }
    }

    /// Whole seconds left, rounded up.
    pub fn clock_secs(&self) -> u32 {
        let millis = self.ticks_remaining as u64 * TICK_MILLIS;
        millis.div_ceil(1000) as u32
    }

    /// Build a `STATE` frame. Players dead for `corpse_ticks` or longer are left out.
    pub fn snapshot(&self, corpse_ticks: u32) -> StateSnapshot {
        let players = self
            .players
            .values()
            .filter(|p| p.alive || p.dead_ticks < corpse_ticks)
            .map(|p| PlayerSnapshot {
                id: p.id,
                x: p.x as i32,
                y: p.y as i32,
                anim: p.anim,
                facing: p.facing,
            })
            .collect();

        StateSnapshot {
            clock_secs: self.clock_secs(),
            players,
        }
    }

    /// Queue an event stamped with the current tick.
    pub fn push_event(&mut self, data: GameEventData) {
        self.events.push(GameEvent::new(self.tick, data));
    }

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}
