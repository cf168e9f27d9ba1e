//! Decoded raster tile representation.

use crate::coord::{TileCoord, TILE_SIZE};
use crate::{terrarium, Result, TerrainError};

/// One decoded terrain tile: `TILE_SIZE x TILE_SIZE` RGB pixels.
///
/// Pixels are stored in row-major order (north to south, west to east).
/// Tiles are immutable once built and shared through the cache.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterTile {
    pixels: Vec<[u8; 3]>,
}

impl std::fmt::Debug for RasterTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterTile")
            .field("size", &TILE_SIZE)
            .finish_non_exhaustive()
    }
}

impl RasterTile {
    /// Decode an encoded image (PNG for Terrarium tiles) into a tile.
    pub fn from_image_bytes(coord: &TileCoord, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| TerrainError::TileDecode {
            zoom: coord.zoom,
            x: coord.x,
            y: coord.y,
            reason: e.to_string(),
        })?;
        let rgb = image.to_rgb8();

        let (width, height) = rgb.dimensions();
        if width != TILE_SIZE || height != TILE_SIZE {
            return Err(TerrainError::TileSize {
                width,
                height,
                expected: TILE_SIZE,
            });
        }

        let pixels = rgb.pixels().map(|p| p.0).collect();
        Ok(Self { pixels })
    }

    /// Build a tile from a per-pixel function of (x, y).
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let mut pixels = Vec::with_capacity((TILE_SIZE * TILE_SIZE) as usize);
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                pixels.push(f(x, y));
            }
        }
        Self { pixels }
    }

    /// A tile where every pixel encodes the same elevation.
    pub fn uniform(elevation_m: f64) -> Self {
        let rgb = terrarium::encode(elevation_m);
        Self {
            pixels: vec![rgb; (TILE_SIZE * TILE_SIZE) as usize],
        }
    }

    /// Raw RGB value at an in-tile pixel.
    ///
    /// # Panics
    /// Panics if `x` or `y` is not below `TILE_SIZE`.
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(x < TILE_SIZE && y < TILE_SIZE, "pixel ({}, {}) outside tile", x, y);
        self.pixels[(y * TILE_SIZE + x) as usize]
    }

    /// Decoded elevation in meters at an in-tile pixel.
    pub fn elevation(&self, x: u32, y: u32) -> f64 {
        let [r, g, b] = self.rgb(x, y);
        terrarium::decode(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb(f(x, y)));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let coord = TileCoord::new(15, 5240, 11443);
        let bytes = png_bytes(TILE_SIZE, TILE_SIZE, |x, y| [128, x as u8, y as u8]);
        let tile = RasterTile::from_image_bytes(&coord, &bytes).unwrap();

        assert_eq!(tile.rgb(3, 200), [128, 3, 200]);
        assert_eq!(tile.elevation(10, 0), 10.0);
    }

    #[test]
    fn test_rejects_garbage() {
        let coord = TileCoord::new(1, 0, 1);
        let err = RasterTile::from_image_bytes(&coord, b"<html>not found</html>").unwrap_err();
        assert!(matches!(err, TerrainError::TileDecode { zoom: 1, x: 0, y: 1, .. }));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let coord = TileCoord::new(1, 0, 0);
        let bytes = png_bytes(512, 512, |_, _| [128, 0, 0]);
        let err = RasterTile::from_image_bytes(&coord, &bytes).unwrap_err();
        assert!(matches!(err, TerrainError::TileSize { width: 512, .. }));
    }

    #[test]
    fn test_uniform_and_from_fn() {
        let flat = RasterTile::uniform(812.0);
        assert_eq!(flat.elevation(0, 0), 812.0);
        assert_eq!(flat.elevation(TILE_SIZE - 1, TILE_SIZE - 1), 812.0);

        let ramp = RasterTile::from_fn(|x, _| terrarium::encode(x as f64));
        assert_eq!(ramp.elevation(42, 7), 42.0);
    }
}
