//! 3x3 elevation neighborhoods that cross tile seams.

use crate::cache::TileCache;
use crate::coord::PixelCoord;
use crate::source::TileSource;
use crate::Result;

/// A 3x3 grid of elevations in meters, indexed `[row][col]`.
///
/// Row 0 is north, column 0 is west, and `[1][1]` is the sampled pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationGrid(pub [[f64; 3]; 3]);

impl ElevationGrid {
    /// Grid with every cell at the same elevation.
    pub fn flat(elevation_m: f64) -> Self {
        Self([[elevation_m; 3]; 3])
    }

    /// Elevation at `[row][col]`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    /// Elevation of the center pixel.
    pub fn center(&self) -> f64 {
        self.0[1][1]
    }

    /// Rows from north to south.
    pub fn rows(&self) -> &[[f64; 3]; 3] {
        &self.0
    }
}

/// Assemble the 3x3 neighborhood centered on `center`.
///
/// Neighbors that fall off the edge of the center tile are read from the
/// adjacent tile's matching edge pixel. Every tile goes through `cache`, so
/// the up to four tiles touched are fetched once each. Any fetch failure
/// fails the whole grid.
pub fn assemble_grid<S: TileSource>(
    cache: &TileCache<S>,
    center: &PixelCoord,
) -> Result<ElevationGrid> {
    let mut grid = [[0.0; 3]; 3];

    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let pixel = center.offset(dx, dy)?;
            let tile = cache.get_tile(&pixel.tile)?;
            grid[(dy + 1) as usize][(dx + 1) as usize] = tile.elevation(pixel.x, pixel.y);
        }
    }

    Ok(ElevationGrid(grid))
}
