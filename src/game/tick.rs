//! Authoritative Simulation Tick
//!
//! One fixed 16 ms step of a running match: movement and pickups, then
//! bombs, then the arena shrink, then the clock and win check.

use crate::core::rng::DeterministicRng;
use crate::game::arena::{update_arena, ArenaConfig};
use crate::game::bomb::{tick_bombs, BombConfig};
use crate::game::collision::{resolve_axis, Axis};
use crate::game::events::{GameEvent, GameEventData, MatchOutcome};
use crate::game::map::{self, BREAKABLE_DENSITY};
use crate::game::state::{ItemKind, MatchState, PlayerId, BOOSTED_SPEED, DEFAULT_SPEED};
use crate::{ticks_from_millis, GRID_COLS, GRID_ROWS, MATCH_DURATION_TICKS, TICK_MILLIS};

/// Speeds are tuned in pixels per 1/60 s; this scales them to one tick.
pub const SPEED_SCALE: f32 = TICK_MILLIS as f32 / 1000.0 * 60.0;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Set on the tick the match is decided
    pub outcome: Option<MatchOutcome>,
}

/// Configuration for match simulation.
#[derive(Clone, Debug)]
pub struct MatchConfig {
    /// Grid width.
    pub cols: usize,
    /// Grid height.
    pub rows: usize,
    /// Crate density for generated maps.
    pub breakable_density: f64,
    /// Match clock.
    pub duration_ticks: u32,
    /// Bomb timings and drops.
    pub bomb: BombConfig,
    /// Shrink schedule.
    pub arena: ArenaConfig,
    /// SPEED_UP duration.
    pub boost_ticks: u32,
    /// How long a dead player stays in `STATE` frames.
    pub corpse_ticks: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            cols: GRID_COLS,
            rows: GRID_ROWS,
            breakable_density: BREAKABLE_DENSITY,
            duration_ticks: MATCH_DURATION_TICKS,
            bomb: BombConfig::default(),
            arena: ArenaConfig::default(),
            boost_ticks: ticks_from_millis(5_000),
            corpse_ticks: ticks_from_millis(1_500),
        }
    }
}

/// Start a match: fresh map, every player on their spawn slot.
///
/// `roster` is in join order; position in it picks the spawn corner.
pub fn new_match(roster: &[PlayerId], config: &MatchConfig, mut rng: DeterministicRng) -> MatchState {
    let grid = map::generate(config.cols, config.rows, config.breakable_density, &mut rng);
    let mut state = MatchState::new(grid, rng, config.duration_ticks);
    for (slot, id) in roster.iter().enumerate() {
        state.add_player(*id, map::spawn_point(slot, config.cols, config.rows));
    }
    state
}

/// Run one simulation tick.
pub fn tick(state: &mut MatchState, config: &MatchConfig) -> TickResult {
    state.tick += 1;
    state.ticks_remaining = state.ticks_remaining.saturating_sub(1);

    // 1. Movement, boosts, pickups
    update_players(state, config);

    // 2. Fuses and blasts
    tick_bombs(state, &config.bomb);

    // 3. Shrinking arena
    update_arena(state, &config.arena);

    // 4. End conditions
    let outcome = check_end_conditions(state);
    if let Some(outcome) = &outcome {
        state.push_event(GameEventData::MatchEnded { outcome: outcome.clone() });
    }

    TickResult {
        events: state.take_events(),
        outcome,
    }
}

fn update_players(state: &mut MatchState, config: &MatchConfig) {
    let ids: Vec<PlayerId> = state.players.keys().copied().collect();

    for id in ids {
        let Some(player) = state.players.get_mut(&id) else {
            continue;
        };

        if !player.alive {
            player.dead_ticks = player.dead_ticks.saturating_add(1);
            player.refresh_animation();
            continue;
        }

        if player.boost_ticks > 0 {
            player.boost_ticks -= 1;
            if player.boost_ticks == 0 {
                player.speed = DEFAULT_SPEED;
            }
        }

        let (dx, dy) = player.intent.displacement(player.speed * SPEED_SCALE);
        let (mut x, mut y) = (player.x, player.y);

        if dx != 0.0
            && resolve_axis(Axis::X, x + dx, y, id, &state.players, &state.grid, &state.bombs)
        {
            x += dx;
        }
        if dy != 0.0
            && resolve_axis(Axis::Y, y + dy, x, id, &state.players, &state.grid, &state.bombs)
        {
            y += dy;
        }

        let Some(player) = state.players.get_mut(&id) else {
            continue;
        };
        player.x = x;
        player.y = y;
        player.refresh_animation();

        collect_item(state, id, config);
    }
}

/// Pick up whatever lies on the player's cell.
fn collect_item(state: &mut MatchState, id: PlayerId, config: &MatchConfig) {
    let Some(cell) = state.get_player(&id).map(|p| p.cell()) else {
        return;
    };
    let Some(kind) = state.items.remove(&cell) else {
        return;
    };

    if let Some(player) = state.get_player_mut(&id) {
        match kind {
            ItemKind::BombUp => player.bonus_bombs += 1,
            ItemKind::FireUp => player.fire_pending = true,
            ItemKind::SpeedUp => {
                if player.boost_ticks == 0 {
                    player.speed = BOOSTED_SPEED;
                    player.boost_ticks = config.boost_ticks;
                }
            }
        }
    }

    state.push_event(GameEventData::ItemPicked { player: id, pos: cell, kind });
}

fn check_end_conditions(state: &MatchState) -> Option<MatchOutcome> {
    let alive = state.alive_ids();

    if state.contested && alive.len() <= 1 {
        return Some(match alive.first() {
            Some(winner) => MatchOutcome::Winner(*winner),
            None => MatchOutcome::Draw,
        });
    }

    if state.ticks_remaining == 0 {
        return Some(match alive.len() {
            0 => MatchOutcome::TimeUp,
            1 if state.contested => MatchOutcome::Winner(alive[0]),
            1 => MatchOutcome::TimeUp,
            _ => MatchOutcome::Survivors(alive),
        });
    }

    None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::{GridPos, Tile, TileGrid};
    use crate::game::input::Direction;
    use crate::game::state::AnimState;

    fn open_match(duration: u32) -> MatchState {
        let mut grid = TileGrid::new(13, 13);
        for i in 0..13 {
            grid.set(GridPos::new(i, 0), Tile::Wall);
            grid.set(GridPos::new(i, 12), Tile::Wall);
            grid.set(GridPos::new(0, i), Tile::Wall);
            grid.set(GridPos::new(12, i), Tile::Wall);
        }
        MatchState::new(grid, DeterministicRng::new(3), duration)
    }

    fn quiet_config() -> MatchConfig {
        MatchConfig {
            arena: ArenaConfig {
                schedule: Vec::new(),
                ..ArenaConfig::default()
            },
            ..MatchConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = MatchConfig::default();
        assert_eq!(config.duration_ticks, 11_250);
        assert_eq!(config.corpse_ticks, 93);
        assert_eq!(config.boost_ticks, 312);
    }

    #[test]
    fn test_new_match_spawns_in_corners() {
        let roster = [PlayerId(0), PlayerId(1)];
        let state = new_match(&roster, &MatchConfig::default(), DeterministicRng::new(9));
        assert_eq!(state.get_player(&PlayerId(0)).unwrap().cell(), GridPos::new(1, 1));
        assert_eq!(state.get_player(&PlayerId(1)).unwrap().cell(), GridPos::new(11, 11));
        assert!(state.contested);
        assert_eq!(state.grid.get(GridPos::new(1, 1)), Tile::Floor);
    }

    #[test]
    fn test_walk_right() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.get_player_mut(&PlayerId(0)).unwrap().intent.set(Direction::Right, true);

        tick(&mut state, &config);
        let p = state.get_player(&PlayerId(0)).unwrap();
        assert!((p.x - (32.0 + 3.0 * SPEED_SCALE)).abs() < 1e-4);
        assert_eq!(p.y, 32.0);
        assert_eq!(p.anim, AnimState::Walk);
        assert_eq!(p.facing, Direction::Right);
    }

    #[test]
    fn test_slide_along_wall() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        {
            // Hitbox top edge flush against the border row
            let p = state.get_player_mut(&PlayerId(0)).unwrap();
            p.y = 26.25;
            p.intent.set(Direction::Up, true);
            p.intent.set(Direction::Right, true);
        }

        tick(&mut state, &config);
        let p = state.get_player(&PlayerId(0)).unwrap();
        assert!(p.x > 32.0);
        assert_eq!(p.y, 26.25);
        assert_eq!(p.facing, Direction::Up);
    }

    #[test]
    fn test_pickups() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.items.insert(GridPos::new(1, 1), ItemKind::SpeedUp);

        let result = tick(&mut state, &config);
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            GameEventData::ItemPicked { kind: ItemKind::SpeedUp, .. }
        )));
        let p = state.get_player(&PlayerId(0)).unwrap();
        assert_eq!(p.speed, BOOSTED_SPEED);
        assert_eq!(p.boost_ticks, config.boost_ticks);

        // A second boost while one is active is swallowed without effect
        state.items.insert(GridPos::new(1, 1), ItemKind::SpeedUp);
        tick(&mut state, &config);
        assert_eq!(state.get_player(&PlayerId(0)).unwrap().boost_ticks, config.boost_ticks - 1);
        assert!(state.items.is_empty());

        for _ in 0..config.boost_ticks {
            tick(&mut state, &config);
        }
        assert_eq!(state.get_player(&PlayerId(0)).unwrap().speed, DEFAULT_SPEED);

        state.items.insert(GridPos::new(1, 1), ItemKind::BombUp);
        tick(&mut state, &config);
        assert_eq!(state.get_player(&PlayerId(0)).unwrap().bomb_capacity(), 2);
    }

    #[test]
    fn test_players_block_each_other() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.add_player(PlayerId(1), GridPos::new(2, 1));
        state.get_player_mut(&PlayerId(0)).unwrap().intent.set(Direction::Right, true);

        for _ in 0..20 {
            tick(&mut state, &config);
        }
        let a = state.get_player(&PlayerId(0)).unwrap();
        let b = state.get_player(&PlayerId(1)).unwrap();
        assert!(b.x - a.x >= crate::game::collision::HITBOX_SIZE);
    }

    #[test]
    fn test_last_player_standing_wins() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.add_player(PlayerId(1), GridPos::new(11, 11));

        assert!(tick(&mut state, &config).outcome.is_none());
        state.kill_player(PlayerId(1));
        let result = tick(&mut state, &config);
        assert_eq!(result.outcome, Some(MatchOutcome::Winner(PlayerId(0))));
        assert!(result.events.iter().any(|e| matches!(e.data, GameEventData::MatchEnded { .. })));
    }

    #[test]
    fn test_everyone_dead_is_draw() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.add_player(PlayerId(1), GridPos::new(11, 11));
        state.kill_player(PlayerId(0));
        state.kill_player(PlayerId(1));
        assert_eq!(tick(&mut state, &config).outcome, Some(MatchOutcome::Draw));
    }

    #[test]
    fn test_time_up_outcomes() {
        let config = quiet_config();

        let mut solo = open_match(2);
        solo.add_player(PlayerId(0), GridPos::new(1, 1));
        assert!(tick(&mut solo, &config).outcome.is_none());
        assert_eq!(tick(&mut solo, &config).outcome, Some(MatchOutcome::TimeUp));

        let mut duo = open_match(1);
        duo.add_player(PlayerId(0), GridPos::new(1, 1));
        duo.add_player(PlayerId(1), GridPos::new(11, 11));
        assert_eq!(
            tick(&mut duo, &config).outcome,
            Some(MatchOutcome::Survivors(vec![PlayerId(0), PlayerId(1)]))
        );
    }

    #[test]
    fn test_corpse_ticks_accumulate() {
        let mut state = open_match(1000);
        let config = quiet_config();
        state.add_player(PlayerId(0), GridPos::new(1, 1));
        state.kill_player(PlayerId(0));
        for _ in 0..5 {
            tick(&mut state, &config);
        }
        let p = state.get_player(&PlayerId(0)).unwrap();
        assert_eq!(p.dead_ticks, 5);
        assert_eq!(p.anim, AnimState::Dead);
    }
}
