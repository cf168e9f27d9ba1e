//! Batch folders: discovery, README labels and completion.
//!
//! A batch is one extracted iNaturalist export, e.g.
//! `Observations/observations-665684/` holding `README.txt` and
//! `observations-665684.csv`. The README records the export query, from
//! which the place and taxon ids are read.

use crate::config::RunnerConfig;
use crate::{Result, RunnerError};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

const README_NAME: &str = "README.txt";

/// A pending batch folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Folder name, e.g. `observations-665684`.
    pub name: String,
    /// Folder path.
    pub dir: PathBuf,
}

impl Batch {
    /// Batch for a folder path.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, dir }
    }

    /// Export README path.
    pub fn readme_path(&self) -> PathBuf {
        self.dir.join(README_NAME)
    }

    /// Export CSV path (`<name>.csv`).
    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.name))
    }

    /// Fail with [`RunnerError::MissingInput`] unless both inputs exist.
    pub fn check_inputs(&self) -> Result<()> {
        for path in [self.readme_path(), self.csv_path()] {
            if !path.is_file() {
                return Err(RunnerError::MissingInput {
                    batch: self.name.clone(),
                    path,
                });
            }
        }
        Ok(())
    }

    /// Output path for a label (`<label>.ndjson` inside the batch).
    pub fn output_path(&self, label: &BatchLabel) -> PathBuf {
        self.dir.join(format!("{}.ndjson", label.label()))
    }
}

/// Place and species names for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLabel {
    /// iNaturalist place id, or `unknown`.
    pub place_id: String,
    /// iNaturalist taxon id, or `unknown`.
    pub taxon_id: String,
    /// Place label, e.g. `Washington`.
    pub state: String,
    /// Species label, e.g. `Boletus_edulis`.
    pub species: String,
}

impl BatchLabel {
    /// `<state>_<species>`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.state, self.species)
    }
}

/// `place_id=` and `taxon_id=` patterns in the export query.
fn readme_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"place_id=(\d+)").expect("valid regex"),
            Regex::new(r"taxon_id=(\d+)").expect("valid regex"),
        )
    })
}

fn first_capture(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Read place and taxon labels from README text.
pub fn parse_readme(
    text: &str,
    places: &BTreeMap<String, String>,
    taxa: &BTreeMap<String, String>,
) -> BatchLabel {
    let (place_pattern, taxon_pattern) = readme_patterns();
    let place_id = first_capture(place_pattern, text);
    let taxon_id = first_capture(taxon_pattern, text);

    let state = places
        .get(&place_id)
        .cloned()
        .unwrap_or_else(|| format!("place_{}", place_id));
    let species = taxa
        .get(&taxon_id)
        .cloned()
        .unwrap_or_else(|| format!("taxon_{}", taxon_id));

    BatchLabel {
        place_id,
        taxon_id,
        state,
        species,
    }
}

/// Read and parse a batch README.
pub fn read_label(batch: &Batch, config: &RunnerConfig) -> Result<BatchLabel> {
    let text = fs::read_to_string(batch.readme_path())?;
    Ok(parse_readme(&text, &config.places, &config.taxa))
}

/// Pending batch folders under `config.observations_dir`, sorted by name.
pub fn discover_batches(config: &RunnerConfig) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();
    for entry in fs::read_dir(&config.observations_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&config.batch_prefix) {
            batches.push(Batch::new(entry.path()));
        }
    }
    batches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(batches)
}

/// Move a finished batch to `<completed_dir>/<name> (<label>)`.
pub fn move_to_completed(batch: &Batch, label: &BatchLabel, completed_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(completed_dir)?;
    let destination = completed_dir.join(format!("{} ({})", batch.name, label.label()));
    fs::rename(&batch.dir, &destination)?;
    info!(batch = %batch.name, destination = %destination.display(), "moved to completed");
    Ok(destination)
}
