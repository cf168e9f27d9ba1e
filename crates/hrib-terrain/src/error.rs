//! Error types for the terrain crate.

use thiserror::Error;

/// Errors that can occur while sampling terrain tiles.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The tile source was unreachable or answered with a non-success status.
    #[error("Failed to fetch tile z={zoom} x={x} y={y}: {reason}")]
    TileFetch {
        /// Zoom level.
        zoom: u8,
        /// Tile column.
        x: u32,
        /// Tile row.
        y: u32,
        /// Reason for failure.
        reason: String,
    },

    /// The tile body could not be decoded as an image.
    #[error("Failed to decode tile z={zoom} x={x} y={y}: {reason}")]
    TileDecode {
        /// Zoom level.
        zoom: u8,
        /// Tile column.
        x: u32,
        /// Tile row.
        y: u32,
        /// Decoder message.
        reason: String,
    },

    /// A decoded tile does not have the expected dimensions.
    #[error("Tile has size {width}x{height}, expected {expected}x{expected}")]
    TileSize {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Expected edge length in pixels.
        expected: u32,
    },

    /// Latitude is not finite or lies at/beyond a pole, where Mercator is undefined.
    #[error("Latitude {0} cannot be projected (must be finite and strictly between -90 and 90)")]
    InvalidLatitude(f64),

    /// Longitude is not finite or lies outside [-180, 180].
    #[error("Longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    /// Invalid zoom level.
    #[error("Invalid zoom level {0} (must be 0-24)")]
    InvalidZoomLevel(u8),

    /// A tile row outside the 2^zoom grid was requested.
    #[error("Tile row y={y} is outside the grid at zoom {zoom}")]
    TileOutOfRange {
        /// Zoom level.
        zoom: u8,
        /// Requested tile column (after wrapping).
        x: i64,
        /// Requested tile row.
        y: i64,
    },

    /// An elevation sample handed to the estimator was NaN or infinite.
    #[error("Elevation grid contains a non-finite sample at row {row}, col {col}")]
    NonFiniteElevation {
        /// Grid row (0 = north).
        row: usize,
        /// Grid column (0 = west).
        col: usize,
    },

    /// Cache lock was poisoned (a thread panicked while holding the lock).
    #[error("Tile cache lock was poisoned")]
    CacheLockPoisoned,
}
