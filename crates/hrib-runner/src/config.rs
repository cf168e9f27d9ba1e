//! Runner configuration.
//!
//! Configuration is read from an optional YAML file; every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```yaml
//! observations_dir: Observations
//! completed_dir: Completed
//! zoom: 15
//! workers: 4
//! request_delay_ms: 250
//! taxa:
//!   "48701": Boletus_edulis
//! ```

use crate::{Result, RunnerError};
use hrib_terrain::{DEFAULT_TERRAIN_URL, DEFAULT_ZOOM, MAX_ZOOM};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daily Open-Meteo soil variables requested by default.
pub const DEFAULT_SOIL_VARIABLES: [&str; 8] = [
    "soil_temperature_0_to_7cm_mean",
    "soil_temperature_7_to_28cm_mean",
    "soil_temperature_28_to_100cm_mean",
    "soil_temperature_0_to_100cm_mean",
    "soil_moisture_0_to_7cm_mean",
    "soil_moisture_7_to_28cm_mean",
    "soil_moisture_28_to_100cm_mean",
    "soil_moisture_0_to_100cm_mean",
];

/// Configuration for a run over the observations folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    // Folders
    /// Folder holding pending `observations-*` batches.
    pub observations_dir: PathBuf,
    /// Folder that finished batches are moved into.
    pub completed_dir: PathBuf,
    /// Name prefix identifying batch folders.
    pub batch_prefix: String,
    /// Move finished batches into `completed_dir`.
    pub move_completed: bool,

    // Soil history
    /// Timezone used for daily aggregation.
    pub timezone: String,
    /// Number of days of history ending on the observation date.
    pub history_days: u32,
    /// Temperature unit passed to the archive API.
    pub temperature_unit: String,
    /// Daily variables requested from the archive API.
    pub soil_variables: Vec<String>,

    // Terrain
    /// Tile zoom level.
    pub zoom: u8,
    /// Terrain tile URL template with `{z}`, `{x}` and `{y}`.
    pub terrain_url: String,
    /// Maximum tiles kept in memory; unbounded when absent.
    pub tile_cache_capacity: Option<usize>,

    // Remote services
    /// Elevation API endpoint.
    pub elevation_url: String,
    /// Historical weather archive endpoint.
    pub archive_url: String,
    /// Minimum spacing between requests to each service, and the pause
    /// after each observation in sequential mode.
    pub request_delay_ms: u64,
    /// Elevation request timeout.
    pub elevation_timeout_secs: u64,
    /// Archive request timeout.
    pub soil_timeout_secs: u64,
    /// Tile request timeout.
    pub tile_timeout_secs: u64,

    // Scheduling
    /// Observations processed concurrently; 1 is strictly sequential.
    pub workers: usize,

    // Lookups
    /// iNaturalist place id to label.
    pub places: BTreeMap<String, String>,
    /// iNaturalist taxon id to label.
    pub taxa: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let places = [("46", "Washington"), ("10", "Oregon"), ("14", "California")];
        let taxa = [
            // Boletus
            ("48701", "Boletus_edulis"),
            ("438025", "Boletus_rex-veris"),
            ("118150", "Boletus_fibrillosus"),
            ("129328", "Boletus_barrowsii"),
            // Black morels
            ("133686", "Morchella_angusticeps"),
            ("487375", "Morchella_importuna"),
            ("492428", "Morchella_brunnea"),
            ("1063010", "Morchella_norvegiensis"),
            ("500023", "Morchella_populiphila"),
            ("473933", "Morchella_snyderi"),
            ("501698", "Morchella_tomentosa"),
            ("500004", "Morchella_tridentina"),
        ];

        Self {
            observations_dir: PathBuf::from("Observations"),
            completed_dir: PathBuf::from("Completed"),
            batch_prefix: "observations-".to_string(),
            move_completed: true,

            timezone: "America/Los_Angeles".to_string(),
            history_days: 14,
            temperature_unit: "fahrenheit".to_string(),
            soil_variables: DEFAULT_SOIL_VARIABLES.iter().map(|s| s.to_string()).collect(),

            zoom: DEFAULT_ZOOM,
            terrain_url: DEFAULT_TERRAIN_URL.to_string(),
            tile_cache_capacity: None,

            elevation_url: "https://api.open-meteo.com/v1/elevation".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            request_delay_ms: 100,
            elevation_timeout_secs: 20,
            soil_timeout_secs: 30,
            tile_timeout_secs: 10,

            workers: 1,

            places: places
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            taxa: taxa
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl RunnerConfig {
    /// Load a configuration file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a YAML configuration.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as null rather than an empty map
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges and the tile URL template.
    pub fn validate(&self) -> Result<()> {
        if self.zoom > MAX_ZOOM {
            return Err(RunnerError::Config(format!(
                "zoom {} exceeds maximum {}",
                self.zoom, MAX_ZOOM
            )));
        }
        if self.history_days == 0 {
            return Err(RunnerError::Config("history_days must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(RunnerError::Config("workers must be at least 1".into()));
        }
        if self.tile_cache_capacity == Some(0) {
            return Err(RunnerError::Config(
                "tile_cache_capacity must be at least 1 when set".into(),
            ));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.terrain_url.contains(placeholder) {
                return Err(RunnerError::Config(format!(
                    "terrain_url is missing {}",
                    placeholder
                )));
            }
        }
        Ok(())
    }

    /// Spacing between requests to one service.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(RunnerConfig::from_yaml("").unwrap(), RunnerConfig::default());
        assert_eq!(RunnerConfig::from_yaml("{}").unwrap(), RunnerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = RunnerConfig::from_yaml("zoom: 14\nworkers: 3\nmove_completed: false\n").unwrap();
        assert_eq!(config.zoom, 14);
        assert_eq!(config.workers, 3);
        assert!(!config.move_completed);
        assert_eq!(config.history_days, 14);
        assert_eq!(config.places.get("46").map(String::as_str), Some("Washington"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            RunnerConfig::from_yaml("zooom: 14\n"),
            Err(RunnerError::Yaml(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(RunnerConfig::from_yaml("zoom: 25").is_err());
        assert!(RunnerConfig::from_yaml("workers: 0").is_err());
        assert!(RunnerConfig::from_yaml("history_days: 0").is_err());
        assert!(RunnerConfig::from_yaml("tile_cache_capacity: 0").is_err());
        assert!(matches!(
            RunnerConfig::from_yaml("terrain_url: http://tiles.test/{z}/{x}.png"),
            Err(RunnerError::Config(msg)) if msg.contains("{y}")
        ));
    }

    #[test]
    fn test_yaml_roundtrip_of_defaults() {
        let yaml = RunnerConfig::default().to_yaml().unwrap();
        assert_eq!(RunnerConfig::from_yaml(&yaml).unwrap(), RunnerConfig::default());
    }
}
