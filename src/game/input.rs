//! Movement Input
//!
//! Held-direction flags as toggled by `INPUT;<DIR>;<TRUE|FALSE>`.
//! The server keeps the latest flags per player and applies them every tick.

use std::fmt;
use std::str::FromStr;

/// One of the four cardinal directions.
///
/// Doubles as an input key and as a player's facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Towards row 0.
    Up,
    /// Towards the last row. Initial facing of every player.
    #[default]
    Down,
    /// Towards column 0.
    Left,
    /// Towards the last column.
    Right,
}

impl Direction {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized direction token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction: {0}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

/// Currently held movement keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveIntent {
    /// UP held.
    pub up: bool,
    /// DOWN held.
    pub down: bool,
    /// LEFT held.
    pub left: bool,
    /// RIGHT held.
    pub right: bool,
}

impl MoveIntent {
    /// Press or release one key.
    pub fn set(&mut self, dir: Direction, pressed: bool) {
        match dir {
            Direction::Up => self.up = pressed,
            Direction::Down => self.down = pressed,
            Direction::Left => self.left = pressed,
            Direction::Right => self.right = pressed,
        }
    }

    /// Release every key.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Per-axis displacement for a step length.
    ///
    /// Opposite keys cancel out.
    pub fn displacement(&self, step: f32) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.left {
            dx -= step;
        }
        if self.right {
            dx += step;
        }
        if self.up {
            dy -= step;
        }
        if self.down {
            dy += step;
        }
        (dx, dy)
    }

    /// Facing implied by the held keys.
    ///
    /// Priority is DOWN, UP, LEFT, RIGHT.
    pub fn facing(&self) -> Option<Direction> {
        if self.down {
            Some(Direction::Down)
        } else if self.up {
            Some(Direction::Up)
        } else if self.left {
            Some(Direction::Left)
        } else if self.right {
            Some(Direction::Right)
        } else {
            None
        }
    }
}
