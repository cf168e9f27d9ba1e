//! Observation rows from iNaturalist CSV exports.

use crate::{Result, RunnerError};
use chrono::NaiveDate;
use hrib_terrain::GeoPoint;
use serde::Deserialize;
use std::path::Path;

/// One row of an export with the `url`, `created_at`, `observed_on`,
/// `latitude` and `longitude` columns enabled.
///
/// Fields stay as raw strings so a bad value only fails its own row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObservationRow {
    /// Observation page URL.
    #[serde(default)]
    pub url: String,
    /// Upload timestamp, e.g. `2023-05-12 14:33:10 -0700`.
    #[serde(default)]
    pub created_at: String,
    /// Date the organism was observed, e.g. `2023-05-10`; often blank.
    #[serde(default)]
    pub observed_on: String,
    /// Latitude in decimal degrees.
    #[serde(default)]
    pub latitude: String,
    /// Longitude in decimal degrees.
    #[serde(default)]
    pub longitude: String,
}

impl ObservationRow {
    /// The date string used for the soil window.
    ///
    /// `observed_on` wins when non-empty; otherwise the date part of
    /// `created_at`. Returns the raw string alongside the parsed date.
    pub fn date_used(&self) -> Result<(String, NaiveDate)> {
        let observed = self.observed_on.trim();
        let raw = if observed.is_empty() {
            self.created_at.split_whitespace().next().unwrap_or("")
        } else {
            observed
        };

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| (raw.to_string(), date))
            .map_err(|_| RunnerError::InvalidDate {
                observed_on: self.observed_on.clone(),
                created_at: self.created_at.clone(),
            })
    }

    /// Parsed and range-checked location.
    pub fn point(&self) -> Result<GeoPoint> {
        let latitude = parse_coordinate("latitude", &self.latitude)?;
        let longitude = parse_coordinate("longitude", &self.longitude)?;
        GeoPoint::new(latitude, longitude).map_err(|e| {
            let (field, value) = match e {
                hrib_terrain::TerrainError::InvalidLongitude(_) => ("longitude", &self.longitude),
                _ => ("latitude", &self.latitude),
            };
            RunnerError::InvalidCoordinate {
                field,
                value: value.clone(),
            }
        })
    }
}

fn parse_coordinate(field: &'static str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RunnerError::InvalidCoordinate {
            field,
            value: raw.to_string(),
        })
}

/// Format a point the way it appears in output records: `"lat, lon"`.
pub fn format_coordinates(point: &GeoPoint) -> String {
    format!("{:?}, {:?}", point.latitude, point.longitude)
}

/// Read every row of an export.
///
/// Rows that fail to deserialize are returned as errors in place so the
/// caller can skip them individually.
pub fn read_observations(path: &Path) -> Result<Vec<Result<ObservationRow>>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(reader
        .deserialize::<ObservationRow>()
        .map(|row| row.map_err(RunnerError::from))
        .collect())
}
