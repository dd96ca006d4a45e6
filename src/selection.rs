//! Selection of a target population from a mock by random thinning.
//!
//! A mock is usually much denser than the population it stands in for. Objects are
//! first restricted to a redshift window; the density of what is left is estimated
//! on the reference patch, and every object is then kept independently with the
//! probability that brings that density down to the goal.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use thiserror::Error;

use crate::density::{estimate_density, SkyPatch};
use crate::ndarray_utils::{concat, select_mask, within_closed};

/// Errors when building a [`MockPopulation`].
#[derive(Error, Debug, PartialEq)]
pub enum SelectionError {
    /// Columns of a population have different lengths.
    #[error("column lengths differ: ra {ra}, dec {dec}, z {z}")]
    #[allow(missing_docs)]
    LengthMismatch { ra: usize, dec: usize, z: usize },
    /// A label that is not one of the known true types.
    #[error("unknown true type '{0}'")]
    UnknownTrueType(String),
}

/// Ground-truth classification of a simulated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrueType {
    /// Quasar.
    Qso,
    /// Star.
    Star,
    /// Galaxy.
    Galaxy,
    /// Contaminant of unknown nature.
    Unknown,
    /// Blank sky.
    Sky,
}

impl TrueType {
    /// Label as written to truth tables. At most 10 characters.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrueType::Qso => "QSO",
            TrueType::Star => "STAR",
            TrueType::Galaxy => "GALAXY",
            TrueType::Unknown => "UNKNOWN",
            TrueType::Sky => "SKY",
        }
    }
}

impl FromStr for TrueType {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "QSO" => Ok(TrueType::Qso),
            "STAR" => Ok(TrueType::Star),
            "GALAXY" => Ok(TrueType::Galaxy),
            "UNKNOWN" => Ok(TrueType::Unknown),
            "SKY" => Ok(TrueType::Sky),
            other => Err(SelectionError::UnknownTrueType(other.to_string())),
        }
    }
}

impl fmt::Display for TrueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification bits of a target in the three survey masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetFlags {
    /// `DESI_TARGET`.
    pub desi: i64,
    /// `BGS_TARGET`.
    pub bgs: i64,
    /// `MWS_TARGET`.
    pub mws: i64,
}

impl TargetFlags {
    /// Flags with only a `desi_mask` value set.
    pub fn desi(desi: i64) -> Self {
        Self {
            desi,
            ..Self::default()
        }
    }
}

/// Simulated objects of one mock, stored column-wise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockPopulation {
    /// Right ascension in degrees.
    pub ra: Array1<f64>,
    /// Declination in degrees.
    pub dec: Array1<f64>,
    /// Redshift.
    pub z: Array1<f64>,
}

impl MockPopulation {
    /// Create a population from equal-length columns.
    pub fn new(ra: Array1<f64>, dec: Array1<f64>, z: Array1<f64>) -> Result<Self, SelectionError> {
        if ra.len() != dec.len() || ra.len() != z.len() {
            return Err(SelectionError::LengthMismatch {
                ra: ra.len(),
                dec: dec.len(),
                z: z.len(),
            });
        }
        Ok(Self { ra, dec, z })
    }

    /// Create a population without redshifts. Every object gets `z = 0`.
    pub fn without_redshift(ra: Array1<f64>, dec: Array1<f64>) -> Result<Self, SelectionError> {
        let z = Array1::zeros(ra.len());
        Self::new(ra, dec, z)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.ra.len()
    }

    /// Whether the population holds no objects.
    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    /// Objects where `mask` is `true`, in their original order.
    pub fn filter(&self, mask: ArrayView1<bool>) -> Self {
        Self {
            ra: select_mask(self.ra.view(), mask),
            dec: select_mask(self.dec.view(), mask),
            z: select_mask(self.z.view(), mask),
        }
    }

    /// Objects with `min_z <= z <= max_z`.
    pub fn in_redshift_window(&self, min_z: f64, max_z: f64) -> Self {
        self.filter(within_closed(self.z.view(), min_z, max_z).view())
    }

    /// Append populations end to end.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a MockPopulation>) -> Self {
        let parts: Vec<&MockPopulation> = parts.into_iter().collect();
        Self {
            ra: concat(&parts.iter().map(|p| p.ra.view()).collect::<Vec<_>>()),
            dec: concat(&parts.iter().map(|p| p.dec.view()).collect::<Vec<_>>()),
            z: concat(&parts.iter().map(|p| p.z.view()).collect::<Vec<_>>()),
        }
    }
}

/// Parameters of one target population.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationSpec {
    /// Name used in logs and reports.
    pub label: String,
    /// Lower end of the redshift window, inclusive.
    pub min_z: f64,
    /// Upper end of the redshift window, inclusive.
    pub max_z: f64,
    /// Desired number density in objects per square degree.
    pub goal_density: f64,
    /// Label attached to every selected object.
    pub true_type: TrueType,
    /// Flags attached to every selected object.
    pub flags: TargetFlags,
}

impl PopulationSpec {
    /// Create a population with an unbounded redshift window and no flags set.
    /// Use `with_` functions to set the remaining parameters.
    pub fn new(label: impl Into<String>, true_type: TrueType, goal_density: f64) -> Self {
        Self {
            label: label.into(),
            min_z: f64::NEG_INFINITY,
            max_z: f64::INFINITY,
            goal_density,
            true_type,
            flags: TargetFlags::default(),
        }
    }

    /// Set the redshift window.
    pub fn with_redshift(mut self, min_z: f64, max_z: f64) -> Self {
        self.min_z = min_z;
        self.max_z = max_z;
        self
    }

    /// Set the classification flags.
    pub fn with_flags(mut self, flags: TargetFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Fraction of a mock to keep so that its density drops to `goal_density`.
///
/// A goal that is not strictly positive keeps nothing, whatever the mock density.
/// A mock without objects on the reference patch keeps everything it has.
///
/// # Example
/// ```
/// use desitarget::selection::retention_fraction;
///
/// assert_eq!(retention_fraction(50., 200.), 0.25);
/// assert_eq!(retention_fraction(300., 200.), 1.);
/// assert_eq!(retention_fraction(0., 200.), 0.);
/// assert_eq!(retention_fraction(50., 0.), 1.);
/// ```
pub fn retention_fraction(goal_density: f64, mock_density: f64) -> f64 {
    if !(goal_density > 0.) {
        0.
    } else if mock_density <= 0. {
        1.
    } else {
        (goal_density / mock_density).min(1.)
    }
}

/// Independent draws deciding for each of `n` objects whether it is kept.
///
/// The number of kept objects is binomial with mean `n * fraction`.
pub fn thin<R: Rng + ?Sized>(n: usize, fraction: f64, rng: &mut R) -> Array1<bool> {
    (0..n).map(|_| rng.random::<f64>() < fraction).collect()
}

/// The outcome of selecting one population from a mock.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Label of the population.
    pub label: String,
    /// The retained objects.
    pub objects: MockPopulation,
    /// Label attached to every retained object.
    pub true_type: TrueType,
    /// Flags attached to every retained object.
    pub flags: TargetFlags,
    /// Number of objects inside the redshift window, before thinning.
    pub n_candidates: usize,
    /// Estimated density of the mock inside the redshift window.
    pub mock_density: f64,
    /// Requested density.
    pub goal_density: f64,
    /// Probability with which each candidate was kept.
    pub fraction: f64,
}

impl Selection {
    /// Number of retained objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing was retained.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether the mock is too sparse to reach the requested density.
    pub fn shortfall(&self) -> bool {
        self.mock_density < self.goal_density
    }

    /// `DESI_TARGET` of every retained object.
    pub fn desi_target(&self) -> Array1<i64> {
        Array1::from_elem(self.len(), self.flags.desi)
    }

    /// `BGS_TARGET` of every retained object.
    pub fn bgs_target(&self) -> Array1<i64> {
        Array1::from_elem(self.len(), self.flags.bgs)
    }

    /// `MWS_TARGET` of every retained object.
    pub fn mws_target(&self) -> Array1<i64> {
        Array1::from_elem(self.len(), self.flags.mws)
    }

    /// True type of every retained object.
    pub fn true_types(&self) -> Array1<TrueType> {
        Array1::from_elem(self.len(), self.true_type)
    }
}

/// Select a population from a mock.
///
/// # Arguments
/// - `population`: The mock to select from.
/// - `spec`: Redshift window, goal density and the tag of the population.
/// - `patch`: Patch the mock density is estimated on.
/// - `rng`: Source of the thinning draws.
pub fn select_population<R: Rng + ?Sized>(
    population: &MockPopulation,
    spec: &PopulationSpec,
    patch: &SkyPatch,
    rng: &mut R,
) -> Selection {
    let candidates = population.in_redshift_window(spec.min_z, spec.max_z);
    let mock_density = estimate_density(candidates.ra.view(), candidates.dec.view(), patch);
    let fraction = retention_fraction(spec.goal_density, mock_density);

    if mock_density < spec.goal_density {
        warn!(
            "{}: mock cannot achieve the goal density. Goal {}. Mock {}",
            spec.label, spec.goal_density, mock_density
        );
    }

    let keep = thin(candidates.len(), fraction, rng);
    let objects = candidates.filter(keep.view());
    debug!(
        "{}: keeping {} of {} candidates (fraction {:.4}).",
        spec.label,
        objects.len(),
        candidates.len(),
        fraction
    );

    Selection {
        label: spec.label.clone(),
        objects,
        true_type: spec.true_type,
        flags: spec.flags,
        n_candidates: candidates.len(),
        mock_density,
        goal_density: spec.goal_density,
        fraction,
    }
}
