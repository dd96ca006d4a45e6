#![warn(missing_docs)]

//! Mock target catalogs for fiber assignment studies. \
//! Populations of simulated objects are thinned from dense mocks down to the number density
//! the survey expects, tagged with their classification bits, and written out as a target
//! table together with a truth table recording what each target really is.
//!
//! ## Interface
//! The two workflows are [`build_mock_targets()`] for the dark-time tracers and their
//! contaminants, and [`build_mock_stdstar_sky()`] for the calibration targets. Both take a
//! configuration record and the [`TargetMasks`] the classification bits are taken from:
//!
//! ```no_run
//! use desitarget::{build_mock_targets, DarkTimeConfig, TargetMasks};
//!
//! let masks = TargetMasks::builtin()?;
//! let config = DarkTimeConfig::load("mock.yaml")?.with_seed(42);
//! let report = build_mock_targets(&config, &masks)?;
//! println!("{} targets", report.n_targets);
//! # Ok::<(), desitarget::Error>(())
//! ```
//!
//! The steps are also usable on their own, without touching the file system:
//! - [`estimate_density()`] over the reference [`SkyPatch`],
//! - [`select_population()`] for one population,
//! - [`assemble()`](catalog::assemble) to turn selections into a [`Catalog`].
//!
//! ## Parameters
//! - `*_dens`: Goal number density of a population in objects per square degree.
//!     A goal above what the mock offers keeps the whole mock and is reported as a shortfall.
//! - `seed`: Seed of all random draws. Runs without a seed draw one from the OS.
//! - `legacy_density_patch`: Estimate mock densities without the upper RA bound of the
//!     reference patch, reproducing catalogs of earlier pipeline versions.
//!
//! ## Features
//! - `parallel` (default): brick names are computed with rayon.
//! - `database`: the [`db`] module and the `bricks_load` binary for loading brick summaries
//!     into PostgreSQL.

use thiserror::Error;

pub mod bitmask;
pub mod bricks;
pub mod catalog;
pub mod config;
#[cfg(feature = "database")]
pub mod db;
pub mod density;
pub mod io;
pub(crate) mod ndarray_utils;
pub mod selection;
pub mod targetmask;

pub use bitmask::{BitDef, BitMask, BitMaskError};
pub use bricks::Bricks;
pub use catalog::{
    build_mock_stdstar_sky, build_mock_targets, Catalog, CalibrationReport, MockTargetsReport,
    SelectionSummary,
};
pub use config::{ConfigError, DarkTimeConfig, StdStarSkyConfig};
pub use density::{estimate_density, SkyPatch};
pub use io::FitsError;
pub use selection::{
    select_population, MockPopulation, PopulationSpec, Selection, SelectionError, TargetFlags,
    TrueType,
};
pub use targetmask::{TargetMaskError, TargetMasks};

/// Any error of this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Reading or writing a FITS table failed.
    #[error(transparent)]
    Fits(#[from] FitsError),
    /// A bit is missing from a mask.
    #[error(transparent)]
    BitMask(#[from] BitMaskError),
    /// Invalid target mask definitions.
    #[error(transparent)]
    TargetMask(#[from] TargetMaskError),
    /// Invalid population.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// Loading into the database failed.
    #[cfg(feature = "database")]
    #[error(transparent)]
    Db(#[from] db::DbError),
}
