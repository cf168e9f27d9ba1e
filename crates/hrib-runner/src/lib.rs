//! # hrib-runner
//!
//! Batch enrichment of iNaturalist observation exports.
//!
//! For every pending `observations-*` folder the runner reads the export
//! CSV, and for each observation:
//! - looks up ground elevation from the Open-Meteo elevation API
//! - fetches a 14-day daily soil temperature/moisture history ending on the
//!   observation date from the Open-Meteo archive
//! - samples elevation, slope and aspect from Terrarium tiles through
//!   [`hrib_terrain`]
//!
//! and writes one JSON line per observation to `<state>_<species>.ndjson`
//! in the batch folder. Finished batches are moved to the completed folder.
//!
//! ## Example
//!
//! ```no_run
//! use hrib_runner::{Enricher, RunnerConfig};
//!
//! let enricher = Enricher::from_config(RunnerConfig::default())?;
//! for outcome in enricher.run_all()? {
//!     println!("{}", outcome.batch());
//! }
//! # Ok::<(), hrib_runner::RunnerError>(())
//! ```

pub mod batch;
pub mod config;
mod enrich;
mod error;
pub mod observation;
pub mod pacing;
pub mod record;
pub mod remote;

pub use config::RunnerConfig;
pub use enrich::{BatchOutcome, BatchReport, Enricher, SkippedObservation};
pub use error::{FailureKind, RunnerError};
pub use record::OutputRecord;

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
