//! Arena Map Generation
//!
//! Classic layout: a wall border, a pillar on every even/even tile, and
//! breakable crates scattered over the rest. Each corner spawn gets an
//! L-shaped clearing so nobody starts boxed in.

use crate::core::rng::DeterministicRng;
use crate::game::grid::{GridPos, Tile, TileGrid};

/// Share of open tiles that start as breakable crates.
pub const BREAKABLE_DENSITY: f64 = 0.70;

/// Spawn tiles in slot order: top-left, bottom-right, top-right, bottom-left.
pub fn spawn_points(cols: usize, rows: usize) -> [GridPos; 4] {
    let right = cols as i32 - 2;
    let bottom = rows as i32 - 2;
    [
        GridPos::new(1, 1),
        GridPos::new(right, bottom),
        GridPos::new(right, 1),
        GridPos::new(1, bottom),
    ]
}

/// Spawn tile for a roster slot. Slots past the fourth wrap around.
pub fn spawn_point(slot: usize, cols: usize, rows: usize) -> GridPos {
    spawn_points(cols, rows)[slot % 4]
}

/// First spawn tile no live player is standing on.
pub fn free_spawn_point(occupied: &[GridPos], cols: usize, rows: usize) -> Option<GridPos> {
    spawn_points(cols, rows)
        .into_iter()
        .find(|corner| !occupied.contains(corner))
}

/// Generate a fresh arena.
pub fn generate(cols: usize, rows: usize, density: f64, rng: &mut DeterministicRng) -> TileGrid {
    let mut grid = TileGrid::new(cols, rows);

    for y in 0..rows {
        for x in 0..cols {
            let pos = GridPos::new(x as i32, y as i32);
            let border = x == 0 || y == 0 || x == cols - 1 || y == rows - 1;
            let pillar = x % 2 == 0 && y % 2 == 0;

            let tile = if border || pillar {
                Tile::Wall
            } else if rng.chance(density) {
                Tile::Breakable
            } else {
                Tile::Floor
            };
            grid.set(pos, tile);
        }
    }

    if cols > 4 && rows > 4 {
        for corner in spawn_points(cols, rows) {
            clear_spawn(&mut grid, corner);
        }
    }

    grid
}

/// Clear the corner tile and the two tiles next to it along each axis,
/// heading towards the middle of the map.
fn clear_spawn(grid: &mut TileGrid, corner: GridPos) {
    let inward_x = if corner.x <= 1 { 1 } else { -1 };
    let inward_y = if corner.y <= 1 { 1 } else { -1 };

    let clearing = [
        corner,
        corner.offset(inward_x, 0),
        corner.offset(2 * inward_x, 0),
        corner.offset(0, inward_y),
        corner.offset(0, 2 * inward_y),
    ];

    for pos in clearing {
        if grid.get(pos) == Tile::Breakable {
            grid.set(pos, Tile::Floor);
        }
    }
}
