//! Collision Detection
//!
//! Axis-separated movement checks against the tile grid, solid bombs and
//! other live players. The hitbox is a square inset inside the sprite so
//! players can slip through one-tile corridors without pixel-perfect lining up.

use std::collections::BTreeMap;

use crate::game::grid::{tile_at, TileGrid};
use crate::game::state::{Bomb, PlayerId, PlayerState};
use crate::TILE_SIZE;

/// Side length of the square hitbox.
pub const HITBOX_SIZE: f32 = 20.5;

/// Distance from the sprite's top-left to the hitbox's top-left.
pub const HITBOX_INSET: f32 = (TILE_SIZE - HITBOX_SIZE) / 2.0;

/// Movement axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal.
    X,
    /// Vertical.
    Y,
}

/// Axis-aligned hitbox in pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hitbox {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Right edge.
    pub right: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl Hitbox {
    /// Hitbox of a sprite whose top-left is at (x, y).
    #[inline]
    pub fn at(x: f32, y: f32) -> Self {
        let left = x + HITBOX_INSET;
        let top = y + HITBOX_INSET;
        Self {
            left,
            top,
            right: left + HITBOX_SIZE,
            bottom: top + HITBOX_SIZE,
        }
    }

    /// Strict overlap. Touching edges do not collide.
    #[inline]
    pub fn overlaps(&self, other: &Hitbox) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }

    fn corners(&self) -> [(f32, f32); 4] {
        [
            (self.left, self.top),
            (self.right, self.top),
            (self.left, self.bottom),
            (self.right, self.bottom),
        ]
    }
}

/// True if a pixel point is inside a solid tile, off the grid, or on a solid bomb.
pub fn point_blocked(px: f32, py: f32, grid: &TileGrid, bombs: &[Bomb]) -> bool {
    let pos = tile_at(px, py);
    if grid.get(pos).is_solid() {
        return true;
    }
    bombs.iter().any(|b| b.pos == pos && b.is_solid())
}

/// True if any hitbox corner of a sprite at (x, y) is blocked by the map.
pub fn blocked_by_map(x: f32, y: f32, grid: &TileGrid, bombs: &[Bomb]) -> bool {
    Hitbox::at(x, y)
        .corners()
        .iter()
        .any(|&(px, py)| point_blocked(px, py, grid, bombs))
}

/// True if a sprite at (x, y) would overlap another live player.
pub fn blocked_by_players(
    x: f32,
    y: f32,
    mover: PlayerId,
    players: &BTreeMap<PlayerId, PlayerState>,
) -> bool {
    let hitbox = Hitbox::at(x, y);
    players
        .values()
        .filter(|other| other.id != mover && other.alive)
        .any(|other| hitbox.overlaps(&Hitbox::at(other.x, other.y)))
}

/// Decide whether a move along one axis is allowed.
///
/// `proposed` is the new coordinate on `axis`; `perpendicular` is the
/// unchanged coordinate on the other axis.
pub fn resolve_axis(
    axis: Axis,
    proposed: f32,
    perpendicular: f32,
    mover: PlayerId,
    players: &BTreeMap<PlayerId, PlayerState>,
    grid: &TileGrid,
    bombs: &[Bomb],
) -> bool {
    let (x, y) = match axis {
        Axis::X => (proposed, perpendicular),
        Axis::Y => (perpendicular, proposed),
    };
    !blocked_by_map(x, y, grid, bombs) && !blocked_by_players(x, y, mover, players)
}
