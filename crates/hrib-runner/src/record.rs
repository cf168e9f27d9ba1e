//! Enriched output records and the NDJSON writer.

use crate::remote::SoilHistory;
use crate::Result;
use hrib_terrain::{SlopeAspect, METERS_TO_FEET};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const TEMPERATURE_PREFIX: &str = "soil_temperature_";
const MOISTURE_PREFIX: &str = "soil_moisture_";
const MEAN_SUFFIX: &str = "_mean";

/// One enriched observation, serialized as a single JSON line.
///
/// Field order is the key order in the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Observation page URL.
    pub observation_url: String,
    /// Date string the soil window ends on.
    pub date_used: String,
    /// `"lat, lon"`.
    pub coordinates: String,
    /// Elevation from the elevation API, in whole feet.
    pub elevation_ft: i64,
    /// Dates of the soil series.
    pub dates: Value,
    /// Soil temperature series by depth band (e.g. `0_to_7cm`).
    pub soil_temperature: Map<String, Value>,
    /// Soil moisture series by depth band.
    pub soil_moisture: Map<String, Value>,
    /// Archive request URL.
    pub open_meteo_api_url: String,
    /// Elevation of the sampled tile pixel, in whole feet.
    pub aws_elevation_ft: i64,
    /// Slope in degrees, 2 decimals.
    pub slope_deg: f64,
    /// Aspect in degrees, 1 decimal.
    pub slope_aspect_deg: f64,
}

/// Meters to whole feet, rounding halves to even.
pub fn meters_to_feet(meters: f64) -> i64 {
    (meters * METERS_TO_FEET).round_ties_even() as i64
}

/// Group soil series by depth band for one variable family.
///
/// `soil_temperature_0_to_7cm_mean` becomes key `0_to_7cm` under the
/// temperature family. Bands keep the order of `variables`.
pub fn depth_bands(history: &SoilHistory, variables: &[String], prefix: &str) -> Map<String, Value> {
    variables
        .iter()
        .filter_map(|variable| {
            let band = variable.strip_prefix(prefix)?;
            let band = band.strip_suffix(MEAN_SUFFIX).unwrap_or(band);
            Some((band.to_string(), history.series(variable)))
        })
        .collect()
}

/// Everything gathered for one observation, before formatting.
#[derive(Debug, Clone)]
pub struct RecordParts<'a> {
    /// Observation page URL.
    pub observation_url: &'a str,
    /// Date string used for the soil window.
    pub date_used: &'a str,
    /// Formatted coordinates.
    pub coordinates: String,
    /// Elevation API result in meters.
    pub elevation_m: f64,
    /// Soil history.
    pub soil: &'a SoilHistory,
    /// Requested soil variables.
    pub soil_variables: &'a [String],
    /// Tile elevation of the sampled pixel in meters.
    pub tile_elevation_m: f64,
    /// Unrounded slope/aspect.
    pub slope_aspect: SlopeAspect,
}

impl OutputRecord {
    /// Assemble a record, applying unit conversion and output rounding.
    pub fn from_parts(parts: RecordParts<'_>) -> Self {
        let rounded = parts.slope_aspect.rounded();
        Self {
            observation_url: parts.observation_url.to_string(),
            date_used: parts.date_used.to_string(),
            coordinates: parts.coordinates,
            elevation_ft: meters_to_feet(parts.elevation_m),
            dates: parts.soil.dates(),
            soil_temperature: depth_bands(parts.soil, parts.soil_variables, TEMPERATURE_PREFIX),
            soil_moisture: depth_bands(parts.soil, parts.soil_variables, MOISTURE_PREFIX),
            open_meteo_api_url: parts.soil.url.clone(),
            aws_elevation_ft: meters_to_feet(parts.tile_elevation_m),
            slope_deg: rounded.slope_degrees,
            slope_aspect_deg: rounded.aspect_degrees,
        }
    }
}

/// Newline-delimited JSON output, flushed after every record so partial
/// output survives an interrupted run.
#[derive(Debug)]
pub struct NdjsonWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

impl NdjsonWriter {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Append one record as a JSON line.
    pub fn write(&mut self, record: &OutputRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SOIL_VARIABLES;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn history() -> SoilHistory {
        let Value::Object(daily) = json!({
            "time": ["2023-05-01", "2023-05-02"],
            "soil_temperature_0_to_7cm_mean": [50.1, 51.3],
            "soil_temperature_7_to_28cm_mean": [48.0, 48.2],
            "soil_moisture_0_to_7cm_mean": [0.31, 0.29],
        }) else {
            unreachable!()
        };
        SoilHistory::new(daily, "https://archive.test/a".into()).unwrap()
    }

    fn variables() -> Vec<String> {
        DEFAULT_SOIL_VARIABLES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_meters_to_feet() {
        assert_eq!(meters_to_feet(0.0), 0);
        assert_eq!(meters_to_feet(100.0), 328);
        assert_eq!(meters_to_feet(4392.0), 14409);
        assert_eq!(meters_to_feet(-10.0), -33);
    }

    #[test]
    fn test_depth_bands_keep_order_and_fill_missing() {
        let bands = depth_bands(&history(), &variables(), TEMPERATURE_PREFIX);
        let keys: Vec<_> = bands.keys().cloned().collect();
        assert_eq!(keys, ["0_to_7cm", "7_to_28cm", "28_to_100cm", "0_to_100cm"]);
        assert_eq!(bands["0_to_7cm"], json!([50.1, 51.3]));
        assert_eq!(bands["0_to_100cm"], json!([]));

        let moisture = depth_bands(&history(), &variables(), MOISTURE_PREFIX);
        assert_eq!(moisture.len(), 4);
        assert_eq!(moisture["0_to_7cm"], json!([0.31, 0.29]));
    }

    #[test]
    fn test_record_key_order_and_rounding() {
        let soil = history();
        let vars = variables();
        let record = OutputRecord::from_parts(RecordParts {
            observation_url: "https://www.inaturalist.org/observations/7",
            date_used: "2023-05-02",
            coordinates: "47.6062, -122.3321".into(),
            elevation_m: 100.0,
            soil: &soil,
            soil_variables: &vars,
            tile_elevation_m: 101.0,
            slope_aspect: SlopeAspect {
                slope_degrees: 12.3456,
                aspect_degrees: 271.06,
            },
        });

        assert_eq!(record.elevation_ft, 328);
        assert_eq!(record.aws_elevation_ft, 331);
        assert_relative_eq!(record.slope_deg, 12.35);
        assert_relative_eq!(record.slope_aspect_deg, 271.1);

        let line = serde_json::to_string(&record).unwrap();
        let keys = [
            "observation_url",
            "date_used",
            "coordinates",
            "elevation_ft",
            "dates",
            "soil_temperature",
            "soil_moisture",
            "open_meteo_api_url",
            "aws_elevation_ft",
            "slope_deg",
            "slope_aspect_deg",
        ];
        let positions: Vec<_> = keys
            .iter()
            .map(|k| line.find(&format!("\"{}\":", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let soil = history();
        let vars = variables();
        let record = OutputRecord::from_parts(RecordParts {
            observation_url: "u",
            date_used: "2023-05-02",
            coordinates: "1.0, 2.0".into(),
            elevation_m: 1.0,
            soil: &soil,
            soil_variables: &vars,
            tile_elevation_m: 1.0,
            slope_aspect: SlopeAspect {
                slope_degrees: 0.0,
                aspect_degrees: 0.0,
            },
        });

        let mut writer = NdjsonWriter::create(&path).unwrap();
        writer.write(&record).unwrap();
        writer.write(&record).unwrap();
        assert_eq!(writer.records(), 2);

        // Flushed per record, so readable while the writer is still open
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["slope_aspect_deg"], json!(0.0));
    }
}
