//! Bombs and Explosions
//!
//! Placement, fuse countdown, ray-cast blasts, crate destruction and item
//! drops. Blasts do not set off other bombs.

use crate::core::rng::DeterministicRng;
use crate::game::events::{BlastSegment, GameEventData};
use crate::game::grid::{GridPos, Tile};
use crate::game::state::{Bomb, ItemKind, MatchState, PlayerId};
use crate::ticks_from_millis;

/// Bomb and drop tuning.
#[derive(Clone, Debug)]
pub struct BombConfig {
    /// Ticks from placement to detonation.
    pub fuse_ticks: u32,
    /// Ticks before a bomb blocks movement.
    pub grace_ticks: u32,
    /// Chance a broken crate drops anything.
    pub drop_chance: f64,
    /// Roll below this drops BOMB_UP.
    pub bomb_up_below: f64,
    /// Roll below this (and not BOMB_UP) drops FIRE_UP; anything else is SPEED_UP.
    pub fire_up_below: f64,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            fuse_ticks: ticks_from_millis(2_000),
            grace_ticks: ticks_from_millis(500),
            drop_chance: 0.30,
            bomb_up_below: 0.40,
            fire_up_below: 0.80,
        }
    }
}

/// Why a bomb could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaceBombError {
    /// No such player in the match.
    #[error("player {0} is not in the match")]
    UnknownPlayer(PlayerId),
    /// Dead players cannot place bombs.
    #[error("player {0} is dead")]
    Dead(PlayerId),
    /// Capacity reached.
    #[error("player {0} already has {1} bombs out")]
    AtCapacity(PlayerId, u32),
    /// The cell is a wall or crate.
    #[error("tile {0} is solid")]
    SolidTile(GridPos),
    /// A bomb is already there.
    #[error("tile {0} already holds a bomb")]
    Occupied(GridPos),
}

/// Place a bomb on the player's current cell.
pub fn place_bomb(
    state: &mut MatchState,
    player_id: PlayerId,
    config: &BombConfig,
) -> Result<GridPos, PlaceBombError> {
    let player = state
        .get_player(&player_id)
        .ok_or(PlaceBombError::UnknownPlayer(player_id))?;

    if !player.alive {
        return Err(PlaceBombError::Dead(player_id));
    }
    if player.active_bombs >= player.bomb_capacity() {
        return Err(PlaceBombError::AtCapacity(player_id, player.active_bombs));
    }

    let pos = player.cell();
    if state.grid.get(pos).is_solid() {
        return Err(PlaceBombError::SolidTile(pos));
    }
    if state.bomb_at(pos).is_some() {
        return Err(PlaceBombError::Occupied(pos));
    }

    let player = match state.get_player_mut(&player_id) {
        Some(p) => p,
        None => return Err(PlaceBombError::UnknownPlayer(player_id)),
    };
    let mut range = player.blast_range;
    if player.fire_pending {
        range += 1;
        player.fire_pending = false;
    }
    player.active_bombs += 1;

    state.bombs.push(Bomb {
        pos,
        owner: player_id,
        range,
        fuse_ticks: config.fuse_ticks.max(1),
        grace_ticks: config.grace_ticks,
        exploded: false,
    });
    state.push_event(GameEventData::BombPlaced { pos, owner: player_id });

    Ok(pos)
}

/// Bomb phase of a tick: purge spent bombs, count down, detonate.
pub fn tick_bombs(state: &mut MatchState, config: &BombConfig) {
    state.bombs.retain(|b| !b.exploded);

    let mut due = Vec::new();
    for (i, bomb) in state.bombs.iter_mut().enumerate() {
        bomb.grace_ticks = bomb.grace_ticks.saturating_sub(1);
        bomb.fuse_ticks = bomb.fuse_ticks.saturating_sub(1);
        if bomb.fuse_ticks == 0 {
            due.push(i);
        }
    }

    for i in due {
        explode(state, i, config);
    }
}

/// Tiles a blast from `center` covers, centre first, then +x, -x, +y, -y.
///
/// A wall stops a ray before its tile; a crate stops it after.
pub fn blast_segments(state: &MatchState, center: GridPos, range: u32) -> Vec<BlastSegment> {
    let mut segments = vec![BlastSegment { pos: center, vertical: false }];

    for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        for step in 1..=range as i32 {
            let pos = center.offset(dx * step, dy * step);
            match state.grid.get(pos) {
                Tile::Wall => break,
                Tile::Breakable => {
                    segments.push(BlastSegment { pos, vertical: dy != 0 });
                    break;
                }
                Tile::Floor => segments.push(BlastSegment { pos, vertical: dy != 0 }),
            }
        }
    }

    segments
}

fn explode(state: &mut MatchState, index: usize, config: &BombConfig) {
    let Some(bomb) = state.bombs.get_mut(index) else {
        return;
    };
    if bomb.exploded {
        return;
    }
    bomb.exploded = true;
    let (center, range, owner) = (bomb.pos, bomb.range, bomb.owner);

    let segments = blast_segments(state, center, range);
    state.push_event(GameEventData::Explosion {
        center,
        segments: segments.clone(),
    });

    for segment in &segments {
        state.kill_players_at(segment.pos);

        if state.grid.get(segment.pos) == Tile::Breakable {
            state.grid.set(segment.pos, Tile::Floor);
            state.push_event(GameEventData::TileBroken { pos: segment.pos });

            if let Some(kind) = roll_item(&mut state.rng, config) {
                state.items.insert(segment.pos, kind);
                state.push_event(GameEventData::ItemSpawned { pos: segment.pos, kind });
            }
        }
    }

    if let Some(p) = state.get_player_mut(&owner) {
        p.active_bombs = p.active_bombs.saturating_sub(1);
    }
}

/// Roll the drop for one broken crate.
pub fn roll_item(rng: &mut DeterministicRng, config: &BombConfig) -> Option<ItemKind> {
    if !rng.chance(config.drop_chance) {
        return None;
    }
    let roll = rng.next_unit();
    Some(if roll < config.bomb_up_below {
        ItemKind::BombUp
    } else if roll < config.fire_up_below {
        ItemKind::FireUp
    } else {
        ItemKind::SpeedUp
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::GameEvent;
    use crate::game::grid::TileGrid;
    use proptest::prelude::*;

    fn arena() -> MatchState {
        let mut grid = TileGrid::new(13, 13);
        for i in 0..13 {
            grid.set(GridPos::new(i, 0), Tile::Wall);
            grid.set(GridPos::new(i, 12), Tile::Wall);
            grid.set(GridPos::new(0, i), Tile::Wall);
            grid.set(GridPos::new(12, i), Tile::Wall);
        }
        MatchState::new(grid, DeterministicRng::new(5), 10_000)
    }

    fn no_drops() -> BombConfig {
        BombConfig {
            drop_chance: 0.0,
            ..BombConfig::default()
        }
    }

    fn run_until_quiet(state: &mut MatchState, config: &BombConfig) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..(config.fuse_ticks + 2) {
            tick_bombs(state, config);
            events.extend(state.take_events());
        }
        events
    }

    fn explosions(events: &[GameEvent]) -> Vec<&GameEventData> {
        events
            .iter()
            .map(|e| &e.data)
            .filter(|d| matches!(d, GameEventData::Explosion { .. }))
            .collect()
    }

    #[test]
    fn test_default_timings() {
        let config = BombConfig::default();
        assert_eq!(config.fuse_ticks, 125);
        assert_eq!(config.grace_ticks, 31);
    }

    #[test]
    fn test_place_and_capacity() {
        let mut state = arena();
        let config = BombConfig::default();
        state.add_player(PlayerId(0), GridPos::new(3, 3));

        assert_eq!(place_bomb(&mut state, PlayerId(0), &config), Ok(GridPos::new(3, 3)));
        assert_eq!(
            place_bomb(&mut state, PlayerId(0), &config),
            Err(PlaceBombError::AtCapacity(PlayerId(0), 1))
        );

        state.get_player_mut(&PlayerId(0)).unwrap().bonus_bombs = 1;
        assert_eq!(
            place_bomb(&mut state, PlayerId(0), &config),
            Err(PlaceBombError::Occupied(GridPos::new(3, 3)))
        );
    }

    #[test]
    fn test_place_rejects_solid_and_dead() {
        let mut state = arena();
        let config = BombConfig::default();
        state.add_player(PlayerId(0), GridPos::new(3, 3));
        state.grid.set(GridPos::new(3, 3), Tile::Breakable);
        assert_eq!(
            place_bomb(&mut state, PlayerId(0), &config),
            Err(PlaceBombError::SolidTile(GridPos::new(3, 3)))
        );

        state.kill_player(PlayerId(0));
        assert_eq!(place_bomb(&mut state, PlayerId(0), &config), Err(PlaceBombError::Dead(PlayerId(0))));
        assert_eq!(
            place_bomb(&mut state, PlayerId(7), &config),
            Err(PlaceBombError::UnknownPlayer(PlayerId(7)))
        );
    }

    #[test]
    fn test_fire_up_consumed_by_next_bomb() {
        let mut state = arena();
        let config = BombConfig::default();
        state.add_player(PlayerId(0), GridPos::new(3, 3));
        state.get_player_mut(&PlayerId(0)).unwrap().fire_pending = true;

        place_bomb(&mut state, PlayerId(0), &config).unwrap();
        assert_eq!(state.bombs[0].range, 3);
        assert!(!state.get_player(&PlayerId(0)).unwrap().fire_pending);
    }

    #[test]
    fn test_blast_shape_and_walls() {
        let mut state = arena();
        state.grid.set(GridPos::new(6, 5), Tile::Wall);
        state.grid.set(GridPos::new(5, 7), Tile::Breakable);
        state.grid.set(GridPos::new(5, 8), Tile::Breakable);

        let segments = blast_segments(&state, GridPos::new(5, 5), 2);
        let tiles: Vec<(i32, i32, bool)> = segments.iter().map(|s| (s.pos.x, s.pos.y, s.vertical)).collect();
        assert_eq!(
            tiles,
            vec![
                (5, 5, false),
                // +x blocked immediately by the wall
                (4, 5, false),
                (3, 5, false),
                (5, 6, true),
                (5, 7, true),
                (5, 4, true),
                (5, 3, true),
            ]
        );
    }

    #[test]
    fn test_explosion_breaks_crate_and_kills() {
        let mut state = arena();
        let config = no_drops();
        state.add_player(PlayerId(0), GridPos::new(3, 3));
        state.add_player(PlayerId(1), GridPos::new(5, 3));
        state.grid.set(GridPos::new(3, 5), Tile::Breakable);

        place_bomb(&mut state, PlayerId(0), &config).unwrap();
        state.take_events();
        let events = run_until_quiet(&mut state, &config);

        assert_eq!(explosions(&events).len(), 1);
        assert!(!state.get_player(&PlayerId(0)).unwrap().alive);
        assert!(!state.get_player(&PlayerId(1)).unwrap().alive);
        assert_eq!(state.grid.get(GridPos::new(3, 5)), Tile::Floor);
        assert!(events.iter().any(|e| e.data == GameEventData::TileBroken { pos: GridPos::new(3, 5) }));
        assert_eq!(state.get_player(&PlayerId(0)).unwrap().active_bombs, 0);
        assert!(state.bombs.is_empty());

        // Explosion is reported before its consequences
        assert!(matches!(events[0].data, GameEventData::Explosion { .. }));
    }

    #[test]
    fn test_fuse_length() {
        let mut state = arena();
        let config = no_drops();
        state.add_player(PlayerId(0), GridPos::new(3, 3));
        place_bomb(&mut state, PlayerId(0), &config).unwrap();
        state.take_events();

        for _ in 0..config.fuse_ticks - 1 {
            tick_bombs(&mut state, &config);
        }
        assert!(explosions(&state.take_events()).is_empty());
        tick_bombs(&mut state, &config);
        assert_eq!(explosions(&state.take_events()).len(), 1);
    }

    #[test]
    fn test_grace_period() {
        let mut state = arena();
        let config = no_drops();
        state.add_player(PlayerId(0), GridPos::new(3, 3));
        place_bomb(&mut state, PlayerId(0), &config).unwrap();
        assert!(!state.bombs[0].is_solid());

        for _ in 0..config.grace_ticks {
            tick_bombs(&mut state, &config);
        }
        assert!(state.bombs[0].is_solid());
    }

    #[test]
    fn test_item_drop_distribution() {
        let config = BombConfig::default();
        let mut rng = DeterministicRng::new(0xB0B);
        let trials = 200_000;
        let (mut bomb_up, mut fire_up, mut speed_up) = (0u32, 0u32, 0u32);

        for _ in 0..trials {
            match roll_item(&mut rng, &config) {
                Some(ItemKind::BombUp) => bomb_up += 1,
                Some(ItemKind::FireUp) => fire_up += 1,
                Some(ItemKind::SpeedUp) => speed_up += 1,
                None => {}
            }
        }

        let drops = (bomb_up + fire_up + speed_up) as f64;
        let rate = drops / trials as f64;
        assert!((rate - 0.30).abs() < 0.01, "drop rate {}", rate);
        assert!((bomb_up as f64 / drops - 0.40).abs() < 0.015);
        assert!((fire_up as f64 / drops - 0.40).abs() < 0.015);
        assert!((speed_up as f64 / drops - 0.20).abs() < 0.015);
    }

    proptest! {
        #[test]
        fn prop_blast_never_crosses_wall(
            walls in proptest::collection::vec((1i32..12, 1i32..12), 0..30),
            crates in proptest::collection::vec((1i32..12, 1i32..12), 0..30),
            cx in 1i32..12,
            cy in 1i32..12,
            range in 1u32..6,
        ) {
            let mut state = arena();
            for (x, y) in crates {
                state.grid.set(GridPos::new(x, y), Tile::Breakable);
            }
            for (x, y) in walls {
                state.grid.set(GridPos::new(x, y), Tile::Wall);
            }
            let center = GridPos::new(cx, cy);
            state.grid.set(center, Tile::Floor);

            let segments = blast_segments(&state, center, range);
            prop_assert_eq!(segments[0].pos, center);

            for seg in &segments[1..] {
                let dx = seg.pos.x - center.x;
                let dy = seg.pos.y - center.y;
                prop_assert!(dx == 0 || dy == 0);
                let dist = dx.abs() + dy.abs();
                prop_assert!(dist >= 1 && dist as u32 <= range);
                prop_assert!(state.grid.get(seg.pos) != Tile::Wall);

                // Every tile between the centre and this one is open floor
                let (sx, sy) = (dx.signum(), dy.signum());
                for k in 1..dist {
                    let between = center.offset(sx * k, sy * k);
                    prop_assert_eq!(state.grid.get(between), Tile::Floor);
                }
            }
        }

        #[test]
        fn prop_each_bomb_explodes_once(
            spots in proptest::collection::btree_set((1i32..12, 1i32..12), 1..8),
        ) {
            let mut state = arena();
            let config = no_drops();
            for (i, (x, y)) in spots.iter().enumerate() {
                let id = PlayerId(i as u32);
                state.add_player(id, GridPos::new(*x, *y));
                place_bomb(&mut state, id, &config).unwrap();
            }
            state.take_events();

            let events = run_until_quiet(&mut state, &config);
            prop_assert_eq!(explosions(&events).len(), spots.len());
            prop_assert!(state.bombs.is_empty());
            for p in state.players.values() {
                prop_assert!(p.active_bombs <= p.bomb_capacity());
            }
        }
    }
}
