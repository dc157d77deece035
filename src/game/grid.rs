//! Tile Grid
//!
//! The destructible arena. Tiles are stored row by row (`y * cols + x`), the
//! same order the `MAP` line streams them in. Anything outside the grid reads
//! as Wall.

use std::fmt;

use crate::TILE_SIZE;

/// Half a tile, the offset used to derive a player's grid cell.
pub const HALF_TILE: f32 = TILE_SIZE / 2.0;

// =============================================================================
// TILE
// =============================================================================

/// A single grid tile. The discriminant is the wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Tile {
    /// Walkable.
    #[default]
    Floor = 0,
    /// Indestructible.
    Wall = 1,
    /// Destroyed by blasts, may drop an item.
    Breakable = 2,
}

impl Tile {
    /// Numeric code sent in `MAP` lines.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Blocks movement and bomb placement.
    #[inline]
    pub fn is_solid(self) -> bool {
        !matches!(self, Tile::Floor)
    }
}

// =============================================================================
// GRID POSITION
// =============================================================================

/// Integer tile coordinates. Signed so neighbours of edge tiles can be
/// expressed and rejected as out of bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position shifted by a delta.
    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Pixel coordinates of the tile's top-left corner.
    pub fn origin(self) -> (f32, f32) {
        (self.x as f32 * TILE_SIZE, self.y as f32 * TILE_SIZE)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Grid cell a player occupies for pickups and blast hits.
///
/// Uses the sprite's top-left plus half a tile, not the hitbox centre.
#[inline]
pub fn cell_of(x: f32, y: f32) -> GridPos {
    GridPos::new(
        ((x + HALF_TILE) / TILE_SIZE).floor() as i32,
        ((y + HALF_TILE) / TILE_SIZE).floor() as i32,
    )
}

/// Tile containing a pixel point.
#[inline]
pub fn tile_at(px: f32, py: f32) -> GridPos {
    GridPos::new(
        (px / TILE_SIZE).floor() as i32,
        (py / TILE_SIZE).floor() as i32,
    )
}

// =============================================================================
// TILE GRID
// =============================================================================

/// Rectangular tile map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    cols: usize,
    rows: usize,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// All-floor grid.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            tiles: vec![Tile::Floor; cols * rows],
        }
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 {
            return None;
        }
        let (x, y) = (pos.x as usize, pos.y as usize);
        if x >= self.cols || y >= self.rows {
            return None;
        }
        Some(y * self.cols + x)
    }

    /// Tile at a position. Out of bounds reads as Wall.
    #[inline]
    pub fn get(&self, pos: GridPos) -> Tile {
        self.index(pos).map_or(Tile::Wall, |i| self.tiles[i])
    }

    /// Overwrite a tile. Returns false if the position is off the grid.
    pub fn set(&mut self, pos: GridPos, tile: Tile) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    /// Count tiles of one kind.
    pub fn count(&self, tile: Tile) -> usize {
        self.tiles.iter().filter(|t| **t == tile).count()
    }

    /// Comma-separated tile codes, row by row, no trailing separator.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.tiles.len() * 2);
        for (i, tile) in self.tiles.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push(char::from(b'0' + tile.code()));
        }
        out
    }
}
