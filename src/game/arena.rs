//! Arena Shrink
//!
//! Late in a match the playable area closes in one ring side at a time. Each
//! scheduled step first warns (broadcasting the bounds it will shrink to),
//! then walls off the outer columns or rows and eliminates anyone caught
//! outside the new bounds.

use std::fmt;

use crate::game::events::GameEventData;
use crate::game::grid::{GridPos, Tile};
use crate::game::state::MatchState;
use crate::ticks_from_millis;

/// Which pair of sides closes in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShrinkPattern {
    /// Left and right columns.
    LeftRight,
    /// Top and bottom rows.
    TopBottom,
}

impl ShrinkPattern {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ShrinkPattern::LeftRight => "LR",
            ShrinkPattern::TopBottom => "TB",
        }
    }
}

impl fmt::Display for ShrinkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive playable tile bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaBounds {
    /// Leftmost playable column.
    pub left: i32,
    /// Rightmost playable column.
    pub right: i32,
    /// Topmost playable row.
    pub top: i32,
    /// Bottom playable row.
    pub bottom: i32,
}

impl ArenaBounds {
    /// Everything inside the outer wall ring.
    pub fn initial(cols: usize, rows: usize) -> Self {
        Self {
            left: 1,
            right: cols as i32 - 2,
            top: 1,
            bottom: rows as i32 - 2,
        }
    }

    /// Bounds after one step, or None if the step would leave no room.
    pub fn shrunk(&self, pattern: ShrinkPattern) -> Option<Self> {
        let next = match pattern {
            ShrinkPattern::LeftRight => Self {
                left: self.left + 1,
                right: self.right - 1,
                ..*self
            },
            ShrinkPattern::TopBottom => Self {
                top: self.top + 1,
                bottom: self.bottom - 1,
                ..*self
            },
        };
        (next.left <= next.right && next.top <= next.bottom).then_some(next)
    }

    /// True if `pos` lies inside on the axis that `pattern` shrinks.
    pub fn contains_on_axis(&self, pos: GridPos, pattern: ShrinkPattern) -> bool {
        match pattern {
            ShrinkPattern::LeftRight => pos.x >= self.left && pos.x <= self.right,
            ShrinkPattern::TopBottom => pos.y >= self.top && pos.y <= self.bottom,
        }
    }

    /// True if `pos` lies inside on both axes.
    pub fn contains(&self, pos: GridPos) -> bool {
        self.contains_on_axis(pos, ShrinkPattern::LeftRight)
            && self.contains_on_axis(pos, ShrinkPattern::TopBottom)
    }
}

/// One scheduled step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShrinkStep {
    /// Fires when the clock reaches this many ticks.
    pub at_remaining_ticks: u32,
    /// Sides that close in.
    pub pattern: ShrinkPattern,
}

/// Shrink configuration.
#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Steps in firing order.
    pub schedule: Vec<ShrinkStep>,
    /// Warning length.
    pub warning_ticks: u32,
    /// Gap between repeated warnings.
    pub warning_repeat_ticks: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        use ShrinkPattern::*;
        let schedule = [
            (30_000, LeftRight),
            (20_000, TopBottom),
            (10_000, LeftRight),
            (5_000, TopBottom),
            (2_000, LeftRight),
        ]
        .into_iter()
        .map(|(millis, pattern)| ShrinkStep {
            at_remaining_ticks: ticks_from_millis(millis),
            pattern,
        })
        .collect();

        Self {
            schedule,
            warning_ticks: ticks_from_millis(5_000),
            warning_repeat_ticks: ticks_from_millis(1_000),
        }
    }
}

/// A step in its warning phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingShrink {
    /// Sides that close in.
    pub pattern: ShrinkPattern,
    /// Bounds once the step runs.
    pub target: ArenaBounds,
    /// Ticks until it runs.
    pub ticks_left: u32,
}

/// Shrink progress for one match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaState {
    /// Current bounds.
    pub bounds: ArenaBounds,
    /// Index of the next unstarted step.
    pub next_step: usize,
    /// Step currently warning.
    pub pending: Option<PendingShrink>,
}

impl ArenaState {
    /// Fresh state for a grid.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            bounds: ArenaBounds::initial(cols, rows),
            next_step: 0,
            pending: None,
        }
    }
}

/// Advance the shrink schedule by one tick.
///
/// A warning never outlasts the gap to the next step's threshold, and the
/// last step always lands before the clock runs out.
pub fn update_arena(state: &mut MatchState, config: &ArenaConfig) {
    if let Some(mut pending) = state.arena.pending {
        pending.ticks_left = pending.ticks_left.saturating_sub(1);
        if pending.ticks_left > 0 {
            state.arena.pending = Some(pending);
            if config.warning_repeat_ticks > 0 && pending.ticks_left % config.warning_repeat_ticks == 0 {
                state.push_event(GameEventData::ArenaWarning {
                    pattern: pending.pattern,
                    bounds: pending.target,
                });
            }
            return;
        }
        state.arena.pending = None;
        execute_shrink(state, pending.pattern, pending.target);
    }

    while let Some(step) = config.schedule.get(state.arena.next_step).copied() {
        if state.ticks_remaining > step.at_remaining_ticks {
            return;
        }
        state.arena.next_step += 1;

        match state.arena.bounds.shrunk(step.pattern) {
            Some(target) => {
                let room_left = match config.schedule.get(state.arena.next_step) {
                    Some(next) => state.ticks_remaining.saturating_sub(next.at_remaining_ticks),
                    None => state.ticks_remaining.saturating_sub(1),
                };
                state.arena.pending = Some(PendingShrink {
                    pattern: step.pattern,
                    target,
                    ticks_left: config.warning_ticks.min(room_left).max(1),
                });
                state.push_event(GameEventData::ArenaWarning {
                    pattern: step.pattern,
                    bounds: target,
                });
                return;
            }
            None => {
                tracing::debug!(pattern = %step.pattern, "Skipping shrink step, arena too small");
            }
        }
    }
}

/// Wall off the outer ring on one axis and tighten the bounds.
fn execute_shrink(state: &mut MatchState, pattern: ShrinkPattern, target: ArenaBounds) {
    let victims: Vec<_> = state
        .players
        .values()
        .filter(|p| p.alive && !target.contains_on_axis(p.cell(), pattern))
        .map(|p| p.id)
        .collect();
    for id in victims {
        state.kill_player(id);
    }

    let b = state.arena.bounds;
    let ring: Vec<GridPos> = match pattern {
        ShrinkPattern::LeftRight => (b.top..=b.bottom)
            .flat_map(|y| [GridPos::new(b.left, y), GridPos::new(b.right, y)])
            .collect(),
        ShrinkPattern::TopBottom => (b.left..=b.right)
            .flat_map(|x| [GridPos::new(x, b.top), GridPos::new(x, b.bottom)])
            .collect(),
    };

    for pos in &ring {
        state.grid.set(*pos, Tile::Wall);
        state.items.remove(pos);
    }

    // Bombs buried in the new walls are defused and refunded
    let mut refunds = Vec::new();
    state.bombs.retain(|bomb| {
        let buried = !bomb.exploded && ring.contains(&bomb.pos);
        if buried {
            refunds.push(bomb.owner);
        }
        !buried
    });
    for owner in refunds {
        if let Some(p) = state.players.get_mut(&owner) {
            p.active_bombs = p.active_bombs.saturating_sub(1);
        }
    }

    state.arena.bounds = target;
    state.push_event(GameEventData::ArenaShrunk {
        pattern,
        bounds: target,
    });
}
