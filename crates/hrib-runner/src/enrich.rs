//! Observation enrichment: per-row pipeline, batch loop and run summary.
//!
//! Each row is enriched independently; a row that fails for any reason is
//! logged and recorded in the [`BatchReport`] and the batch moves on. Only
//! problems with the batch itself (missing inputs, an unwritable output
//! file, a failed move) stop a batch, and those never stop the run.

use crate::batch::{discover_batches, move_to_completed, read_label, Batch, BatchLabel};
use crate::config::RunnerConfig;
use crate::error::FailureKind;
use crate::observation::{format_coordinates, read_observations, ObservationRow};
use crate::record::{NdjsonWriter, OutputRecord, RecordParts};
use crate::remote::{ElevationApi, OpenMeteoArchive, OpenMeteoElevation, SoilApi};
use crate::{Result, RunnerError};
use hrib_terrain::{HttpTileSource, TerrainSampler, TileCache, TileSource};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One observation that was not enriched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedObservation {
    /// Data row number, starting at 1 (the header is not counted).
    pub row: usize,
    /// Observation URL, empty when the row could not be read.
    pub url: String,
    /// Cause category.
    pub kind: FailureKind,
    /// Error message.
    pub reason: String,
}

/// Result of processing one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Batch folder name.
    pub batch: String,
    /// Place/species label from the README.
    pub label: BatchLabel,
    /// NDJSON output path (inside the batch folder, before any move).
    pub output: PathBuf,
    /// Records written.
    pub succeeded: usize,
    /// Rows skipped, in row order.
    pub skipped: Vec<SkippedObservation>,
    /// Destination folder when the batch was moved to completed.
    pub moved_to: Option<PathBuf>,
}

impl BatchReport {
    fn new(batch: &Batch, label: BatchLabel, output: PathBuf) -> Self {
        Self {
            batch: batch.name.clone(),
            label,
            output,
            succeeded: 0,
            skipped: Vec::new(),
            moved_to: None,
        }
    }

    /// Rows seen.
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped.len()
    }

    /// Skipped rows counted by cause.
    pub fn skipped_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Outcome of one batch within a run.
#[derive(Debug)]
pub enum BatchOutcome {
    /// The batch was processed (rows may still have been skipped).
    Completed(BatchReport),
    /// The batch could not be processed or moved.
    Failed {
        /// Batch folder name.
        batch: String,
        /// What went wrong.
        error: RunnerError,
    },
}

impl BatchOutcome {
    /// Batch folder name.
    pub fn batch(&self) -> &str {
        match self {
            BatchOutcome::Completed(report) => &report.batch,
            BatchOutcome::Failed { batch, .. } => batch,
        }
    }
}

/// URL of the row (if it was readable) and its enrichment result.
type RowOutcome = (String, Result<OutputRecord>);

/// Enriches observations with remote elevation, soil history and terrain.
pub struct Enricher {
    config: RunnerConfig,
    elevation: Box<dyn ElevationApi>,
    soil: Box<dyn SoilApi>,
    terrain: TerrainSampler<Box<dyn TileSource>>,
    show_progress: bool,
}

impl Enricher {
    /// Enricher with explicit collaborators.
    pub fn new(
        config: RunnerConfig,
        elevation: Box<dyn ElevationApi>,
        soil: Box<dyn SoilApi>,
        tiles: Box<dyn TileSource>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = TileCache::with_capacity(tiles, config.tile_cache_capacity);
        let terrain = TerrainSampler::with_cache(cache, config.zoom)?;
        Ok(Self {
            config,
            elevation,
            soil,
            terrain,
            show_progress: true,
        })
    }

    /// Enricher talking to the configured Open-Meteo and tile endpoints.
    pub fn from_config(config: RunnerConfig) -> Result<Self> {
        let elevation = OpenMeteoElevation::from_config(&config)?;
        let soil = OpenMeteoArchive::from_config(&config)?;
        let tiles = HttpTileSource::with_template(
            config.terrain_url.clone(),
            Duration::from_secs(config.tile_timeout_secs),
        )?;
        Self::new(config, Box::new(elevation), Box::new(soil), Box::new(tiles))
    }

    /// Show or hide the per-batch progress bar.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The terrain sampler and its tile cache.
    pub fn terrain(&self) -> &TerrainSampler<Box<dyn TileSource>> {
        &self.terrain
    }

    /// Enrich one observation.
    pub fn enrich(&self, row: &ObservationRow) -> Result<OutputRecord> {
        let (date_used, end_date) = row.date_used()?;
        let point = row.point()?;

        let elevation_m = self.elevation.elevation_m(&point)?;
        let soil = self.soil.history(&point, end_date)?;
        let terrain = self.terrain.sample(point.latitude, point.longitude)?;

        Ok(OutputRecord::from_parts(RecordParts {
            observation_url: &row.url,
            date_used: &date_used,
            coordinates: format_coordinates(&point),
            elevation_m,
            soil: &soil,
            soil_variables: &self.config.soil_variables,
            tile_elevation_m: terrain.elevation_m(),
            slope_aspect: terrain.slope_aspect,
        }))
    }

    fn enrich_row(&self, row: Result<ObservationRow>) -> RowOutcome {
        match row {
            Ok(row) => {
                let result = self.enrich(&row);
                (row.url, result)
            }
            Err(e) => (String::new(), Err(e)),
        }
    }

    fn progress_bar(&self, len: usize, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({elapsed}, eta {eta})")
        {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message(label.to_string());
        progress
    }

    /// Enrich every row of a batch into `<label>.ndjson`.
    ///
    /// With one worker rows are processed in order with the configured
    /// delay after each. With more, rows are processed in chunks of
    /// `workers` in parallel and each chunk is written in input order.
    pub fn process_batch(&self, batch: &Batch) -> Result<BatchReport> {
        batch.check_inputs()?;
        let label = read_label(batch, &self.config)?;
        let rows = read_observations(&batch.csv_path())?;
        let output = batch.output_path(&label);

        info!(
            batch = %batch.name,
            label = %label.label(),
            rows = rows.len(),
            "processing batch"
        );

        let mut writer = NdjsonWriter::create(&output)?;
        let mut report = BatchReport::new(batch, label, output);
        let progress = self.progress_bar(rows.len(), &report.label.label());
        let workers = self.config.workers.max(1);

        if workers == 1 {
            let delay = self.config.request_delay();
            for (index, row) in rows.into_iter().enumerate() {
                let outcome = self.enrich_row(row);
                record_outcome(&mut report, &mut writer, index + 1, outcome)?;
                progress.inc(1);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| RunnerError::Config(format!("worker pool: {}", e)))?;

            let mut rows = rows.into_iter().peekable();
            let mut next_row = 1;
            while rows.peek().is_some() {
                let chunk: Vec<_> = rows.by_ref().take(workers).collect();
                let outcomes: Vec<RowOutcome> = pool.install(|| {
                    chunk
                        .into_par_iter()
                        .map(|row| self.enrich_row(row))
                        .collect()
                });
                for outcome in outcomes {
                    record_outcome(&mut report, &mut writer, next_row, outcome)?;
                    next_row += 1;
                    progress.inc(1);
                }
            }
        }
        progress.finish_and_clear();

        let stats = self.terrain.cache_stats();
        debug!(
            batch = %report.batch,
            hits = stats.hits,
            misses = stats.misses,
            tiles = stats.tiles_cached,
            "tile cache"
        );
        info!(
            batch = %report.batch,
            succeeded = report.succeeded,
            skipped = report.skipped.len(),
            output = %writer.path().display(),
            "batch finished"
        );
        for (kind, count) in report.skipped_by_kind() {
            info!(batch = %report.batch, %kind, count, "skipped observations");
        }

        Ok(report)
    }

    /// Process every pending batch, moving finished ones to the completed
    /// folder when configured.
    ///
    /// Fails only when the observations folder cannot be listed; batch
    /// problems are reported as [`BatchOutcome::Failed`].
    pub fn run_all(&self) -> Result<Vec<BatchOutcome>> {
        let batches = discover_batches(&self.config)?;
        if batches.is_empty() {
            info!(dir = %self.config.observations_dir.display(), "no pending batches");
        }

        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            let outcome = match self.finish_batch(&batch) {
                Ok(report) => BatchOutcome::Completed(report),
                Err(error) => {
                    match &error {
                        RunnerError::MissingInput { .. } => {
                            warn!(batch = %batch.name, %error, "skipping batch")
                        }
                        _ => error!(batch = %batch.name, %error, "batch failed"),
                    }
                    BatchOutcome::Failed {
                        batch: batch.name.clone(),
                        error,
                    }
                }
            };
            outcomes.push(outcome);
        }

        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Completed(_)))
            .count();
        info!(
            batches = outcomes.len(),
            completed,
            failed = outcomes.len() - completed,
            "all observations processed"
        );
        Ok(outcomes)
    }

    fn finish_batch(&self, batch: &Batch) -> Result<BatchReport> {
        let mut report = self.process_batch(batch)?;
        if self.config.move_completed {
            let destination = move_to_completed(batch, &report.label, &self.config.completed_dir)?;
            report.moved_to = Some(destination);
        }
        Ok(report)
    }
}

fn record_outcome(
    report: &mut BatchReport,
    writer: &mut NdjsonWriter,
    row: usize,
    (url, result): RowOutcome,
) -> Result<()> {
    match result {
        Ok(record) => {
            writer.write(&record)?;
            report.succeeded += 1;
        }
        Err(error) => {
            let kind = error.kind();
            warn!(batch = %report.batch, row, %url, %kind, %error, "failed row");
            report.skipped.push(SkippedObservation {
                row,
                url,
                kind,
                reason: error.to_string(),
            });
        }
    }
    Ok(())
}
