//! Web-Mercator projection onto the global tiled raster.
//!
//! ## Tile Coordinate System
//!
//! Uses the OpenStreetMap Slippy Map tile naming convention:
//! - `zoom` is the zoom level (0-24, 15 by default)
//! - `x` is the column (0 to 2^zoom - 1, from west to east)
//! - `y` is the row (0 to 2^zoom - 1, from north to south)
//!
//! Every tile is [`TILE_SIZE`] x [`TILE_SIZE`] pixels, so the whole world at
//! zoom `z` is a `2^z * TILE_SIZE` pixel square. Pixel coordinates in this
//! module are *global* (not tile-local) unless stated otherwise.

use crate::{Result, TerrainError};
use std::f64::consts::PI;

/// Edge length of a terrain tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Minimum valid zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 24;

/// Default zoom level (about 4.8m per pixel at the equator).
pub const DEFAULT_ZOOM: u8 = 15;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees (positive = north).
    pub latitude: f64,
    /// Longitude in degrees (positive = east).
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting values that cannot be projected.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || latitude.abs() >= 90.0 {
            return Err(TerrainError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || longitude.abs() > 180.0 {
            return Err(TerrainError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Check that a zoom level is within the supported range.
pub fn validate_zoom(zoom: u8) -> Result<()> {
    if !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
        return Err(TerrainError::InvalidZoomLevel(zoom));
    }
    Ok(())
}

/// Width (and height) of the global raster in pixels at a zoom level.
pub fn world_size_px(zoom: u8) -> i64 {
    (1i64 << zoom) * TILE_SIZE as i64
}

/// Project a latitude/longitude to a fractional global pixel coordinate.
///
/// Standard Web-Mercator forward projection:
/// - x = (lon + 180) / 360 * 2^z * TILE_SIZE
/// - y = (1 - ln(tan(lat) + sec(lat)) / π) / 2 * 2^z * TILE_SIZE
///
/// Latitudes beyond ±85.0511° project outside the raster; that is reported
/// later when the tile row is resolved, not here.
pub fn project(latitude: f64, longitude: f64, zoom: u8) -> Result<(f64, f64)> {
    validate_zoom(zoom)?;
    let point = GeoPoint::new(latitude, longitude)?;

    let world = world_size_px(zoom) as f64;
    let lat_rad = point.latitude.to_radians();

    let pixel_x = (point.longitude + 180.0) / 360.0 * world;
    let pixel_y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * world;

    Ok((pixel_x, pixel_y))
}

/// OSM-style tile coordinates (zoom, x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level.
    pub zoom: u8,
    /// X coordinate (column, 0 at 180°W, increases eastward).
    pub x: u32,
    /// Y coordinate (row, 0 at ~85.05°N, increases southward).
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate.
    ///
    /// # Panics
    /// Panics if coordinates are out of range for the zoom level.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        let max_coord = 1u64 << zoom;
        assert!((x as u64) < max_coord, "x={} out of range for zoom {}", x, zoom);
        assert!((y as u64) < max_coord, "y={} out of range for zoom {}", y, zoom);
        Self { zoom, x, y }
    }

    /// Build a tile coordinate from unbounded indices.
    ///
    /// Columns wrap around the antimeridian; rows beyond the poles are an error.
    pub fn wrapped(zoom: u8, x: i64, y: i64) -> Result<Self> {
        validate_zoom(zoom)?;
        let n = 1i64 << zoom;
        let x = x.rem_euclid(n);
        if !(0..n).contains(&y) {
            return Err(TerrainError::TileOutOfRange { zoom, x, y });
        }
        Ok(Self {
            zoom,
            x: x as u32,
            y: y as u32,
        })
    }

    /// Tile containing a latitude/longitude.
    pub fn from_lat_lon(latitude: f64, longitude: f64, zoom: u8) -> Result<Self> {
        Ok(PixelCoord::from_lat_lon(latitude, longitude, zoom)?.tile)
    }

    /// Get the bounding box for this tile.
    ///
    /// Returns (min_lat, max_lat, min_lon, max_lon).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let n = (1u64 << self.zoom) as f64;

        let min_lon = self.x as f64 / n * 360.0 - 180.0;
        let max_lon = (self.x + 1) as f64 / n * 360.0 - 180.0;

        // Inverse of the Slippy Map formula
        let max_lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        let min_lat = (PI * (1.0 - 2.0 * (self.y + 1) as f64 / n))
            .sinh()
            .atan()
            .to_degrees();

        (min_lat, max_lat, min_lon, max_lon)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// A single pixel: the tile it lives in plus its in-tile offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    /// Tile containing the pixel.
    pub tile: TileCoord,
    /// Column within the tile (0..TILE_SIZE).
    pub x: u32,
    /// Row within the tile (0..TILE_SIZE).
    pub y: u32,
}

impl PixelCoord {
    /// Resolve a global integer pixel coordinate into tile + in-tile offset.
    pub fn from_global(zoom: u8, pixel_x: i64, pixel_y: i64) -> Result<Self> {
        let size = TILE_SIZE as i64;
        let tile = TileCoord::wrapped(zoom, pixel_x.div_euclid(size), pixel_y.div_euclid(size))?;
        Ok(Self {
            tile,
            x: pixel_x.rem_euclid(size) as u32,
            y: pixel_y.rem_euclid(size) as u32,
        })
    }

    /// Pixel under a latitude/longitude.
    ///
    /// The projected coordinate is truncated toward zero, not rounded; the
    /// truncation decides which pixel (and therefore which tile) is sampled.
    pub fn from_lat_lon(latitude: f64, longitude: f64, zoom: u8) -> Result<Self> {
        let (pixel_x, pixel_y) = project(latitude, longitude, zoom)?;
        Self::from_global(zoom, pixel_x.trunc() as i64, pixel_y.trunc() as i64)
    }

    /// Global pixel coordinate of this pixel.
    pub fn global(&self) -> (i64, i64) {
        let size = TILE_SIZE as i64;
        (
            self.tile.x as i64 * size + self.x as i64,
            self.tile.y as i64 * size + self.y as i64,
        )
    }

    /// The pixel `dx` columns east and `dy` rows south of this one.
    ///
    /// Works for any offset: the tile and in-tile position are recomputed
    /// from the global coordinate rather than stepped one tile at a time.
    pub fn offset(&self, dx: i64, dy: i64) -> Result<Self> {
        let (gx, gy) = self.global();
        Self::from_global(self.tile.zoom, gx + dx, gy + dy)
    }
}
