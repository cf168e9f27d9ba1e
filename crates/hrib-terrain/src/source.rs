//! Remote and in-memory sources of terrain tiles.

use crate::coord::TileCoord;
use crate::tile::RasterTile;
use crate::{Result, TerrainError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// AWS Open Data Terrarium tiles.
pub const DEFAULT_TERRAIN_URL: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";

/// Default per-request timeout for tile downloads.
pub const DEFAULT_TILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can produce a decoded tile for a coordinate.
///
/// Implementations are called at most once per coordinate by
/// [`TileCache`](crate::TileCache), possibly from several threads.
pub trait TileSource: Send + Sync {
    /// Fetch and decode one tile.
    fn fetch(&self, coord: &TileCoord) -> Result<RasterTile>;
}

impl<S: TileSource + ?Sized> TileSource for Box<S> {
    fn fetch(&self, coord: &TileCoord) -> Result<RasterTile> {
        (**self).fetch(coord)
    }
}

/// Tiles fetched over HTTP from a `{z}/{x}/{y}` URL template.
pub struct HttpTileSource {
    client: reqwest::blocking::Client,
    url_template: String,
}

impl std::fmt::Debug for HttpTileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTileSource")
            .field("url_template", &self.url_template)
            .finish()
    }
}

impl HttpTileSource {
    /// Source for the public AWS Terrarium bucket.
    pub fn new() -> Result<Self> {
        Self::with_template(DEFAULT_TERRAIN_URL, DEFAULT_TILE_TIMEOUT)
    }

    /// Source for a custom URL template containing `{z}`, `{x}` and `{y}`.
    pub fn with_template(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    /// URL of one tile.
    pub fn tile_url(&self, coord: &TileCoord) -> String {
        self.url_template
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    fn fetch_error(coord: &TileCoord, reason: String) -> TerrainError {
        TerrainError::TileFetch {
            zoom: coord.zoom,
            x: coord.x,
            y: coord.y,
            reason,
        }
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, coord: &TileCoord) -> Result<RasterTile> {
        let url = self.tile_url(coord);
        debug!(tile = %coord, %url, "downloading terrain tile");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Self::fetch_error(coord, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::fetch_error(coord, format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Self::fetch_error(coord, e.to_string()))?;
        debug!(tile = %coord, bytes = bytes.len(), "tile downloaded");

        RasterTile::from_image_bytes(coord, &bytes)
    }
}

/// Tiles held in memory, with an optional fallback for every other coordinate.
///
/// Counts calls to [`TileSource::fetch`] so callers can observe cache
/// behaviour. Coordinates with neither an entry nor a fallback fail with
/// [`TerrainError::TileFetch`].
#[derive(Debug, Default)]
pub struct StaticTileSource {
    tiles: HashMap<TileCoord, RasterTile>,
    fallback: Option<RasterTile>,
    fetches: AtomicUsize,
}

impl StaticTileSource {
    /// Empty source; every fetch fails until tiles are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that answers every coordinate with the same tile.
    pub fn everywhere(tile: RasterTile) -> Self {
        Self {
            fallback: Some(tile),
            ..Self::default()
        }
    }

    /// Add or replace the tile for one coordinate.
    pub fn with_tile(mut self, coord: TileCoord, tile: RasterTile) -> Self {
        self.tiles.insert(coord, tile);
        self
    }

    /// Number of fetches served or failed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl TileSource for StaticTileSource {
    fn fetch(&self, coord: &TileCoord) -> Result<RasterTile> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.tiles
            .get(coord)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| TerrainError::TileFetch {
                zoom: coord.zoom,
                x: coord.x,
                y: coord.y,
                reason: "no such tile".to_string(),
            })
    }
}
