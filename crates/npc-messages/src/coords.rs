//! Map coordinates and tiles.

use serde::{Deserialize, Serialize};

/// A point on the map, in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f32,
    pub y: f32,
}

impl Coordinates {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Coordinates) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// The tile containing this point
    pub fn tile(&self) -> TilePos {
        TilePos::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

/// Integer tile position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Center point of the tile
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.x as f32 + 0.5, self.y as f32 + 0.5)
    }

    /// Tiles at exactly Chebyshev distance `radius`, ordered by euclidean
    /// distance from this tile, then by (y, x).
    ///
    /// Radius 0 yields the tile itself.
    pub fn ring(&self, radius: u32) -> Vec<TilePos> {
        if radius == 0 {
            return vec![*self];
        }

        let r = radius as i32;
        let mut tiles = Vec::with_capacity(8 * radius as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs() == r || dy.abs() == r {
                    tiles.push(TilePos::new(self.x + dx, self.y + dy));
                }
            }
        }

        tiles.sort_by_key(|t| {
            let dx = t.x - self.x;
            let dy = t.y - self.y;
            (dx * dx + dy * dy, t.y, t.x)
        });
        tiles
    }
}
