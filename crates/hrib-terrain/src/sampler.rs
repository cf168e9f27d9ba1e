//! Point sampling: projection, neighborhood assembly and slope estimation.

use crate::cache::{CacheStats, TileCache};
use crate::coord::{validate_zoom, PixelCoord, DEFAULT_ZOOM};
use crate::neighborhood::{assemble_grid, ElevationGrid};
use crate::slope::{estimate, SlopeAspect};
use crate::source::TileSource;
use crate::Result;
use tracing::debug;

/// Terrain context around one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSample {
    /// Pixel the point projected onto.
    pub pixel: PixelCoord,
    /// Elevations around the pixel, center included.
    pub grid: ElevationGrid,
    /// Unrounded slope and aspect.
    pub slope_aspect: SlopeAspect,
}

impl TerrainSample {
    /// Elevation of the sampled pixel in meters.
    pub fn elevation_m(&self) -> f64 {
        self.grid.center()
    }
}

/// Samples terrain at points through a shared tile cache.
///
/// # Example
///
/// ```no_run
/// use hrib_terrain::{HttpTileSource, TerrainSampler};
///
/// let sampler = TerrainSampler::new(HttpTileSource::new()?, 15)?;
/// let sample = sampler.sample(45.3735, -121.6959)?;
/// println!("{:.1} m, slope {:.2}°", sample.elevation_m(), sample.slope_aspect.slope_degrees);
/// # Ok::<(), hrib_terrain::TerrainError>(())
/// ```
#[derive(Debug)]
pub struct TerrainSampler<S> {
    cache: TileCache<S>,
    zoom: u8,
}

impl<S: TileSource> TerrainSampler<S> {
    /// Sampler over an unbounded cache.
    pub fn new(source: S, zoom: u8) -> Result<Self> {
        Self::with_cache(TileCache::new(source), zoom)
    }

    /// Sampler over an existing cache.
    pub fn with_cache(cache: TileCache<S>, zoom: u8) -> Result<Self> {
        validate_zoom(zoom)?;
        Ok(Self { cache, zoom })
    }

    /// Sampler at the default zoom.
    pub fn with_default_zoom(source: S) -> Result<Self> {
        Self::new(source, DEFAULT_ZOOM)
    }

    /// Zoom level used for every sample.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The tile cache.
    pub fn cache(&self) -> &TileCache<S> {
        &self.cache
    }

    /// Cache counters so far.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Sample the terrain at a latitude/longitude.
    pub fn sample(&self, latitude: f64, longitude: f64) -> Result<TerrainSample> {
        let pixel = PixelCoord::from_lat_lon(latitude, longitude, self.zoom)?;
        let grid = assemble_grid(&self.cache, &pixel)?;
        let slope_aspect = estimate(&grid)?;

        debug!(
            latitude,
            longitude,
            tile = %pixel.tile,
            px = pixel.x,
            py = pixel.y,
            elevation_m = grid.center(),
            slope = slope_aspect.slope_degrees,
            "sampled terrain"
        );

        Ok(TerrainSample {
            pixel,
            grid,
            slope_aspect,
        })
    }
}
