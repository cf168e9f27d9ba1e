//! `hrib`: enrich observation exports with elevation, soil and terrain.

use clap::{Parser, Subcommand};
use hrib_runner::{BatchOutcome, Enricher, RunnerConfig, RunnerError};
use hrib_terrain::{HttpTileSource, TerrainSampler, TileCache};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hrib")]
#[command(author, version, about = "Enrich species observations with elevation, soil history and terrain", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Folder holding pending observation batches
    #[arg(long, global = true)]
    observations: Option<PathBuf>,

    /// Folder finished batches are moved into
    #[arg(long, global = true)]
    completed: Option<PathBuf>,

    /// Terrain tile zoom level
    #[arg(short, long, global = true)]
    zoom: Option<u8>,

    /// Observations enriched in parallel
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Minimum delay between requests to each service, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Leave finished batches in place
    #[arg(long, global = true)]
    no_move: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Process every pending batch (default)
    Run,
    /// Print the terrain sample for one coordinate
    Terrain {
        /// Latitude in degrees
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(allow_hyphen_values = true)]
        lon: f64,
    },
    /// Print the effective configuration as YAML
    Config,
}

impl Cli {
    fn load_config(&self) -> Result<RunnerConfig, RunnerError> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };
        if let Some(dir) = &self.observations {
            config.observations_dir = dir.clone();
        }
        if let Some(dir) = &self.completed {
            config.completed_dir = dir.clone();
        }
        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.request_delay_ms = delay_ms;
        }
        if self.no_move {
            config.move_completed = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: RunnerConfig) -> Result<ExitCode, RunnerError> {
    let enricher = Enricher::from_config(config)?;
    let outcomes = enricher.run_all()?;

    for outcome in &outcomes {
        match outcome {
            BatchOutcome::Completed(report) => {
                println!(
                    "{}: {} written, {} skipped -> {}",
                    report.batch,
                    report.succeeded,
                    report.skipped.len(),
                    report
                        .moved_to
                        .as_ref()
                        .unwrap_or(&report.output)
                        .display()
                );
            }
            BatchOutcome::Failed { batch, error } => println!("{}: failed ({})", batch, error),
        }
    }

    let failed = outcomes
        .iter()
        .any(|o| matches!(o, BatchOutcome::Failed { .. }));
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn terrain(config: &RunnerConfig, lat: f64, lon: f64) -> Result<ExitCode, RunnerError> {
    let source = HttpTileSource::with_template(
        config.terrain_url.clone(),
        Duration::from_secs(config.tile_timeout_secs),
    )?;
    let cache = TileCache::with_capacity(source, config.tile_cache_capacity);
    let sampler = TerrainSampler::with_cache(cache, config.zoom)?;
    let sample = sampler.sample(lat, lon)?;
    let rounded = sample.slope_aspect.rounded();

    let (min_lat, max_lat, min_lon, max_lon) = sample.pixel.tile.bounds();

    println!("Tile: {} pixel ({}, {})", sample.pixel.tile, sample.pixel.x, sample.pixel.y);
    println!(
        "Tile bounds: lat {:.5}..{:.5}, lon {:.5}..{:.5}",
        min_lat, max_lat, min_lon, max_lon
    );
    println!(
        "Elevation: {:.1} m ({} ft)",
        sample.elevation_m(),
        hrib_runner::record::meters_to_feet(sample.elevation_m())
    );
    println!("Slope: {}°", rounded.slope_degrees);
    println!("Aspect: {}°", rounded.aspect_degrees);
    println!("\nElevation grid (m, north up):");
    for row in sample.grid.rows() {
        println!("  {:>9.2} {:>9.2} {:>9.2}", row[0], row[1], row[2]);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = cli.load_config().and_then(|config| match cli.command {
        None | Some(Command::Run) => run(config),
        Some(Command::Terrain { lat, lon }) => terrain(&config, lat, lon),
        Some(Command::Config) => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "hrib failed");
            ExitCode::FAILURE
        }
    }
}
