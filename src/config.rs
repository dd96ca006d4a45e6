//! Configuration of the mock catalog workflows.
//!
//! Both workflows read the same flat set of keys, so one YAML file can configure
//! both; each record only picks the keys it needs. Every density and path is
//! required, and values are checked when the record is built.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::density::SkyPatch;

/// Errors loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading configuration {}: {source}", .path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The YAML is malformed or a required key is missing.
    #[error("parsing configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    /// A density is negative or not finite.
    #[error("'{name}' must be a finite, non-negative density, got {value}")]
    InvalidDensity {
        /// Configuration key.
        name: &'static str,
        /// Value given.
        value: f64,
    },
    /// A path is empty.
    #[error("'{name}' must not be empty")]
    EmptyPath {
        /// Configuration key.
        name: &'static str,
    },
}

fn check_density(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(ConfigError::InvalidDensity { name, value })
    }
}

fn check_path(name: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        Err(ConfigError::EmptyPath { name })
    } else {
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration of the dark-time target and truth catalogs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DarkTimeConfig {
    /// Goal density of Lyman-alpha quasars (z >= 2.1), per square degree.
    pub qsolya_dens: f64,
    /// Goal density of tracer quasars (z <= 2.1).
    pub qsotracer_dens: f64,
    /// Goal density of stellar contaminants targeted as quasars.
    pub qso_fake_dens: f64,
    /// Goal density of luminous red galaxies.
    pub lrg_dens: f64,
    /// Goal density of contaminants targeted as LRGs.
    pub lrg_fake_dens: f64,
    /// Goal density of emission line galaxies.
    pub elg_dens: f64,
    /// Goal density of contaminants targeted as ELGs.
    pub elg_fake_dens: f64,
    /// Quasar mock.
    pub qso_file: PathBuf,
    /// ELG mock.
    pub elg_file: PathBuf,
    /// LRG mock.
    pub lrg_file: PathBuf,
    /// Random points, the source of all contaminants.
    pub random_file: PathBuf,
    /// Directory `targets.fits` and `truth.fits` are written to.
    pub output_dir: PathBuf,
    /// Seed of the random draws. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Estimate mock densities on the patch without an upper RA bound.
    #[serde(default)]
    pub legacy_density_patch: bool,
}

impl DarkTimeConfig {
    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read(path.as_ref())?)
    }

    /// Check densities and paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_density("qsolya_dens", self.qsolya_dens)?;
        check_density("qsotracer_dens", self.qsotracer_dens)?;
        check_density("qso_fake_dens", self.qso_fake_dens)?;
        check_density("lrg_dens", self.lrg_dens)?;
        check_density("lrg_fake_dens", self.lrg_fake_dens)?;
        check_density("elg_dens", self.elg_dens)?;
        check_density("elg_fake_dens", self.elg_fake_dens)?;
        check_path("qso_file", &self.qso_file)?;
        check_path("elg_file", &self.elg_file)?;
        check_path("lrg_file", &self.lrg_file)?;
        check_path("random_file", &self.random_file)?;
        check_path("output_dir", &self.output_dir)
    }

    /// Set the seed of the random draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Patch mock densities are estimated on.
    pub fn density_patch(&self) -> SkyPatch {
        if self.legacy_density_patch {
            SkyPatch::legacy()
        } else {
            SkyPatch::reference()
        }
    }
}

/// Configuration of the standard star and sky calibration catalogs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StdStarSkyConfig {
    /// Goal density of standard stars, per square degree.
    pub std_star_dens: f64,
    /// Goal density of sky calibration fibers.
    pub sky_calib_dens: f64,
    /// Random points both catalogs are drawn from.
    pub random_file: PathBuf,
    /// Directory `stdstar.fits` and `sky.fits` are written to.
    pub output_dir: PathBuf,
    /// Seed of the random draws. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Estimate mock densities on the patch without an upper RA bound.
    #[serde(default)]
    pub legacy_density_patch: bool,
}

impl StdStarSkyConfig {
    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read(path.as_ref())?)
    }

    /// Check densities and paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_density("std_star_dens", self.std_star_dens)?;
        check_density("sky_calib_dens", self.sky_calib_dens)?;
        check_path("random_file", &self.random_file)?;
        check_path("output_dir", &self.output_dir)
    }

    /// Set the seed of the random draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Patch mock densities are estimated on.
    pub fn density_patch(&self) -> SkyPatch {
        if self.legacy_density_patch {
            SkyPatch::legacy()
        } else {
            SkyPatch::reference()
        }
    }
}
