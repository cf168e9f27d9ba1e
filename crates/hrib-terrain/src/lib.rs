//! # hrib-terrain
//!
//! Terrain context for geolocated observations, sampled from Terrarium
//! elevation tiles.
//!
//! This crate provides:
//! - Web-Mercator projection of latitude/longitude onto the global tiled
//!   raster, with truncation to whole pixels
//! - Decoding of Terrarium-encoded pixels into elevations
//! - A read-through tile cache that fetches each tile at most once per run
//! - 3x3 elevation neighborhoods that cross tile seams correctly
//! - Slope and aspect estimation with Horn's method
//!
//! ## Overview
//!
//! Tiles are 256x256 PNGs served from
//! `https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png`.
//! At zoom 15 (the default) one pixel is about 4.8m at the equator.
//!
//! ## Examples
//!
//! ```no_run
//! use hrib_terrain::{HttpTileSource, TerrainSampler, DEFAULT_ZOOM};
//!
//! let sampler = TerrainSampler::new(HttpTileSource::new()?, DEFAULT_ZOOM)?;
//!
//! // Fetches up to four tiles on the first call, none on repeated nearby calls
//! let sample = sampler.sample(46.8523, -121.7603)?;
//! let rounded = sample.slope_aspect.rounded();
//! println!(
//!     "elevation {:.1} m, slope {}°, aspect {}°",
//!     sample.elevation_m(),
//!     rounded.slope_degrees,
//!     rounded.aspect_degrees
//! );
//! # Ok::<(), hrib_terrain::TerrainError>(())
//! ```

mod cache;
mod coord;
mod error;
mod neighborhood;
mod sampler;
mod slope;
mod source;
pub mod terrarium;
mod tile;

pub use cache::{CacheStats, TileCache};
pub use coord::{
    project, validate_zoom, world_size_px, GeoPoint, PixelCoord, TileCoord, DEFAULT_ZOOM,
    MAX_ZOOM, MIN_ZOOM, TILE_SIZE,
};
pub use error::TerrainError;
pub use neighborhood::{assemble_grid, ElevationGrid};
pub use sampler::{TerrainSample, TerrainSampler};
pub use slope::{estimate, SlopeAspect};
pub use source::{
    HttpTileSource, StaticTileSource, TileSource, DEFAULT_TERRAIN_URL, DEFAULT_TILE_TIMEOUT,
};
pub use tile::RasterTile;

/// Conversion factor from meters to feet.
pub const METERS_TO_FEET: f64 = 3.28084;

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
