//! Error types for the runner.

use hrib_terrain::TerrainError;
use std::path::PathBuf;
use thiserror::Error;

/// Broad cause of a skipped observation, used in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// Missing or unparseable field in the observation row.
    Input,
    /// A remote service failed or answered with a non-success status.
    Remote,
    /// A response or tile could not be decoded.
    Decode,
    /// Local file system failure.
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Input => "input",
            FailureKind::Remote => "remote",
            FailureKind::Decode => "decode",
            FailureKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while enriching observations.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Network failure talking to a remote service.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Terrain sampling failed.
    #[error("Terrain error: {0}")]
    Terrain(#[from] TerrainError),

    /// Neither `observed_on` nor `created_at` holds an ISO date.
    #[error("No usable date (observed_on={observed_on:?}, created_at={created_at:?})")]
    InvalidDate {
        /// Raw `observed_on` value.
        observed_on: String,
        /// Raw `created_at` value.
        created_at: String,
    },

    /// A coordinate field is empty, not a number, or out of range.
    #[error("Invalid {field}: {value:?}")]
    InvalidCoordinate {
        /// Column name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A remote service answered with a non-success status.
    #[error("{service} returned HTTP {status} for {url}")]
    RemoteStatus {
        /// Service name.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// A remote service answered with an unexpected body.
    #[error("Malformed {service} response: {reason}")]
    MalformedResponse {
        /// Service name.
        service: &'static str,
        /// What was missing or wrong.
        reason: String,
    },

    /// A batch folder lacks its README or CSV.
    #[error("Batch {batch} is missing {}", path.display())]
    MissingInput {
        /// Batch folder name.
        batch: String,
        /// Expected file.
        path: PathBuf,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RunnerError {
    /// Classify this error for batch reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            RunnerError::InvalidDate { .. }
            | RunnerError::InvalidCoordinate { .. }
            | RunnerError::Csv(_)
            | RunnerError::Config(_) => FailureKind::Input,
            RunnerError::Http(_) | RunnerError::RemoteStatus { .. } => FailureKind::Remote,
            RunnerError::Json(_)
            | RunnerError::Yaml(_)
            | RunnerError::MalformedResponse { .. } => FailureKind::Decode,
            RunnerError::Io(_) | RunnerError::MissingInput { .. } => FailureKind::Io,
            RunnerError::Terrain(e) => match e {
                TerrainError::TileDecode { .. }
                | TerrainError::TileSize { .. }
                | TerrainError::NonFiniteElevation { .. } => FailureKind::Decode,
                TerrainError::InvalidLatitude(_)
                | TerrainError::InvalidLongitude(_)
                | TerrainError::InvalidZoomLevel(_)
                | TerrainError::TileOutOfRange { .. } => FailureKind::Input,
                TerrainError::Http(_)
                | TerrainError::TileFetch { .. }
                | TerrainError::CacheLockPoisoned => FailureKind::Remote,
            },
        }
    }
}
