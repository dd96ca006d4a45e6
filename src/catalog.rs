//! Assembly of mock target catalogs.
//!
//! Two workflows are provided:
//! - [`build_mock_targets`] selects seven dark-time populations (quasars, luminous red
//!   galaxies, emission line galaxies and their contaminants) from four mocks and
//!   writes a target table together with the matching truth table.
//! - [`build_mock_stdstar_sky`] selects standard stars and sky fibers from random
//!   points and writes one target table for each.
//!
//! The selection and assembly steps are also available without file I/O through
//! [`select_all`] and [`assemble`].

use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use log::{debug, info, warn};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bitmask::BitMaskError;
use crate::bricks::Bricks;
use crate::config::{DarkTimeConfig, StdStarSkyConfig};
use crate::density::SkyPatch;
use crate::io::{read_mock_dark_time, write_targets, write_truth, FitsError};
use crate::ndarray_utils::concat;
use crate::selection::{
    select_population, MockPopulation, PopulationSpec, Selection, TargetFlags, TrueType,
};
use crate::targetmask::TargetMasks;
use crate::Error;

/// Exclusive upper bound of target identifiers, `2^62`.
pub const TARGETID_LIMIT: i64 = 1 << 62;

/// File name of the dark-time target table.
pub const TARGETS_FILENAME: &str = "targets.fits";
/// File name of the dark-time truth table.
pub const TRUTH_FILENAME: &str = "truth.fits";
/// File name of the standard star table.
pub const STDSTAR_FILENAME: &str = "stdstar.fits";
/// File name of the sky fiber table.
pub const SKY_FILENAME: &str = "sky.fits";

/// Random generator for a run: seeded when `seed` is given, from OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draw `n` distinct target identifiers uniformly from `[0, 2^62)`.
///
/// Collisions are vanishingly rare; a colliding draw is replaced by a fresh one.
pub fn draw_target_ids<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(n);
    let mut ids = Vec::with_capacity(n);
    let mut collisions = 0usize;
    while ids.len() < n {
        let id = rng.random_range(0..TARGETID_LIMIT);
        if seen.insert(id) {
            ids.push(id);
        } else {
            collisions += 1;
        }
    }
    if collisions > 0 {
        debug!("Redrew {collisions} colliding target ids.");
    }
    ids
}

/// Draw `n` subpriorities uniformly from `[0, 1)`.
pub fn draw_subpriorities<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| rng.random::<f64>()).collect()
}

/// Rows of a target table, stored column-wise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetTable {
    /// `TARGETID`.
    pub targetid: Vec<i64>,
    /// `BRICKNAME`.
    pub brickname: Vec<String>,
    /// `RA` in degrees.
    pub ra: Vec<f64>,
    /// `DEC` in degrees.
    pub dec: Vec<f64>,
    /// `DESI_TARGET`.
    pub desi_target: Vec<i64>,
    /// `BGS_TARGET`.
    pub bgs_target: Vec<i64>,
    /// `MWS_TARGET`.
    pub mws_target: Vec<i64>,
    /// `SUBPRIORITY`.
    pub subpriority: Vec<f64>,
}

impl TargetTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.targetid.len()
    }

    /// Copy of the rows in `range`.
    ///
    /// # Panics
    /// If `range` extends past the last row.
    pub fn rows(&self, range: Range<usize>) -> Self {
        Self {
            targetid: self.targetid[range.clone()].to_vec(),
            brickname: self.brickname[range.clone()].to_vec(),
            ra: self.ra[range.clone()].to_vec(),
            dec: self.dec[range.clone()].to_vec(),
            desi_target: self.desi_target[range.clone()].to_vec(),
            bgs_target: self.bgs_target[range.clone()].to_vec(),
            mws_target: self.mws_target[range.clone()].to_vec(),
            subpriority: self.subpriority[range].to_vec(),
        }
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.targetid.is_empty()
    }
}

/// Rows of a truth table, stored column-wise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TruthTable {
    /// `TARGETID`.
    pub targetid: Vec<i64>,
    /// `BRICKNAME`.
    pub brickname: Vec<String>,
    /// `RA` in degrees.
    pub ra: Vec<f64>,
    /// `DEC` in degrees.
    pub dec: Vec<f64>,
    /// `TRUEZ`.
    pub truez: Vec<f64>,
    /// `TRUETYPE`.
    pub truetype: Vec<TrueType>,
}

impl TruthTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.targetid.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.targetid.is_empty()
    }
}

/// What a selection produced, without the objects themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionSummary {
    /// Label of the population.
    pub label: String,
    /// Objects inside the redshift window.
    pub n_candidates: usize,
    /// Objects retained.
    pub n_selected: usize,
    /// Estimated density of the mock inside the redshift window.
    pub mock_density: f64,
    /// Requested density.
    pub goal_density: f64,
    /// Probability with which each candidate was kept.
    pub fraction: f64,
    /// Whether the mock was too sparse to reach the requested density.
    pub shortfall: bool,
}

impl From<&Selection> for SelectionSummary {
    fn from(selection: &Selection) -> Self {
        Self {
            label: selection.label.clone(),
            n_candidates: selection.n_candidates,
            n_selected: selection.len(),
            mock_density: selection.mock_density,
            goal_density: selection.goal_density,
            fraction: selection.fraction,
            shortfall: selection.shortfall(),
        }
    }
}

/// Target and truth tables of one assembled catalog.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    /// One row per selected object.
    pub targets: TargetTable,
    /// Ground truth, row for row with `targets`.
    pub truth: TruthTable,
}

impl Catalog {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the catalog holds no objects.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn bricknames(bricks: &Bricks, ra: &[f64], dec: &[f64]) -> Vec<String> {
    #[cfg(feature = "parallel")]
    {
        bricks.bricknames_par(ra, dec)
    }
    #[cfg(not(feature = "parallel"))]
    {
        bricks.bricknames(ra, dec)
    }
}

fn concat_columns<T: Clone>(columns: &[Array1<T>]) -> Vec<T> {
    concat(&columns.iter().map(Array1::view).collect::<Vec<_>>()).to_vec()
}

/// Select every population from its mock, in order.
pub fn select_all<R: Rng + ?Sized>(
    populations: &[(&MockPopulation, PopulationSpec)],
    patch: &SkyPatch,
    rng: &mut R,
) -> Vec<Selection> {
    populations
        .iter()
        .map(|(mock, spec)| select_population(mock, spec, patch, rng))
        .collect()
}

/// Concatenate selections and give every object an identifier, a subpriority and a brick.
///
/// Rows appear in the order of `selections`; the truth table matches the target
/// table row for row.
pub fn assemble<R: Rng + ?Sized>(
    selections: &[Selection],
    bricks: &Bricks,
    rng: &mut R,
) -> Catalog {
    let objects = MockPopulation::concat(selections.iter().map(|s| &s.objects));
    let desi_target = selections.iter().map(Selection::desi_target).collect::<Vec<_>>();
    let bgs_target = selections.iter().map(Selection::bgs_target).collect::<Vec<_>>();
    let mws_target = selections.iter().map(Selection::mws_target).collect::<Vec<_>>();
    let true_types = selections.iter().map(Selection::true_types).collect::<Vec<_>>();

    let n = objects.len();
    let targetid = draw_target_ids(n, rng);
    let subpriority = draw_subpriorities(n, rng);
    let ra = objects.ra.to_vec();
    let dec = objects.dec.to_vec();
    let brickname = bricknames(bricks, &ra, &dec);
    info!("Total in targetid {}", n);

    let targets = TargetTable {
        targetid: targetid.clone(),
        brickname: brickname.clone(),
        ra: ra.clone(),
        dec: dec.clone(),
        desi_target: concat_columns(&desi_target),
        bgs_target: concat_columns(&bgs_target),
        mws_target: concat_columns(&mws_target),
        subpriority,
    };
    let truth = TruthTable {
        targetid,
        brickname,
        ra,
        dec,
        truez: objects.z.to_vec(),
        truetype: concat_columns(&true_types),
    };

    Catalog { targets, truth }
}

/// The mock a dark-time population is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockSource {
    /// Quasar mock.
    Qso,
    /// Emission line galaxy mock.
    Elg,
    /// Luminous red galaxy mock.
    Lrg,
    /// Random points.
    Random,
}

/// The seven dark-time populations, in output order.
pub fn dark_time_populations(
    config: &DarkTimeConfig,
    masks: &TargetMasks,
) -> Result<Vec<(MockSource, PopulationSpec)>, BitMaskError> {
    let qso = TargetFlags::desi(masks.desi_mask.mask("QSO")?);
    let lrg = TargetFlags::desi(masks.desi_mask.mask("LRG")?);
    let elg = TargetFlags::desi(masks.desi_mask.mask("ELG")?);

    Ok(vec![
        (
            MockSource::Qso,
            PopulationSpec::new("QSO Lya", TrueType::Qso, config.qsolya_dens)
                .with_redshift(2.1, 1000.)
                .with_flags(qso),
        ),
        (
            MockSource::Qso,
            PopulationSpec::new("QSO tracer", TrueType::Qso, config.qsotracer_dens)
                .with_redshift(-1., 2.1)
                .with_flags(qso),
        ),
        (
            MockSource::Random,
            PopulationSpec::new("QSO fake", TrueType::Star, config.qso_fake_dens)
                .with_redshift(-1., 1000.)
                .with_flags(qso),
        ),
        (
            MockSource::Lrg,
            PopulationSpec::new("LRG", TrueType::Galaxy, config.lrg_dens)
                .with_redshift(-1., 1000.)
                .with_flags(lrg),
        ),
        (
            MockSource::Random,
            PopulationSpec::new("LRG fake", TrueType::Unknown, config.lrg_fake_dens)
                .with_redshift(-1., 1000.)
                .with_flags(lrg),
        ),
        (
            MockSource::Elg,
            PopulationSpec::new("ELG", TrueType::Galaxy, config.elg_dens)
                .with_redshift(-1., 1000.)
                .with_flags(elg),
        ),
        (
            MockSource::Random,
            PopulationSpec::new("ELG fake", TrueType::Unknown, config.elg_fake_dens)
                .with_redshift(-1., 1000.)
                .with_flags(elg),
        ),
    ])
}

/// The standard star and sky populations with their output file names.
pub fn stdstar_sky_populations(
    config: &StdStarSkyConfig,
    masks: &TargetMasks,
) -> Result<Vec<(PopulationSpec, &'static str)>, BitMaskError> {
    Ok(vec![
        (
            PopulationSpec::new("STD_FSTAR", TrueType::Star, config.std_star_dens)
                .with_redshift(-1., 100.)
                .with_flags(TargetFlags::desi(masks.desi_mask.mask("STD_FSTAR")?)),
            STDSTAR_FILENAME,
        ),
        (
            PopulationSpec::new("SKY", TrueType::Sky, config.sky_calib_dens)
                .with_redshift(-1., 100.)
                .with_flags(TargetFlags::desi(masks.desi_mask.mask("SKY")?)),
            SKY_FILENAME,
        ),
    ])
}

/// The four mocks of the dark-time workflow.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DarkTimeMocks {
    /// Quasar mock, with redshifts.
    pub qso: MockPopulation,
    /// Emission line galaxy mock, with redshifts.
    pub elg: MockPopulation,
    /// Luminous red galaxy mock, with redshifts.
    pub lrg: MockPopulation,
    /// Random points, without redshifts.
    pub random: MockPopulation,
}

impl DarkTimeMocks {
    /// Read the mocks named in the configuration.
    pub fn read(config: &DarkTimeConfig) -> Result<Self, FitsError> {
        Ok(Self {
            qso: read_mock_dark_time(&config.qso_file, true)?,
            elg: read_mock_dark_time(&config.elg_file, true)?,
            lrg: read_mock_dark_time(&config.lrg_file, true)?,
            random: read_mock_dark_time(&config.random_file, false)?,
        })
    }

    /// The mock of a source.
    pub fn get(&self, source: MockSource) -> &MockPopulation {
        match source {
            MockSource::Qso => &self.qso,
            MockSource::Elg => &self.elg,
            MockSource::Lrg => &self.lrg,
            MockSource::Random => &self.random,
        }
    }
}

/// Select the dark-time populations from in-memory mocks and assemble the catalog.
pub fn build_dark_time_catalog<R: Rng + ?Sized>(
    mocks: &DarkTimeMocks,
    config: &DarkTimeConfig,
    masks: &TargetMasks,
    bricks: &Bricks,
    rng: &mut R,
) -> Result<(Catalog, Vec<SelectionSummary>), BitMaskError> {
    let populations = dark_time_populations(config, masks)?
        .into_iter()
        .map(|(source, spec)| (mocks.get(source), spec))
        .collect::<Vec<_>>();
    let selections = select_all(&populations, &config.density_patch(), rng);
    let summaries = selections.iter().map(SelectionSummary::from).collect();
    Ok((assemble(&selections, bricks, rng), summaries))
}

/// Outcome of [`build_mock_targets`].
#[derive(Clone, Debug, PartialEq)]
pub struct MockTargetsReport {
    /// One summary per population, in output order.
    pub selections: Vec<SelectionSummary>,
    /// Number of rows written to each table.
    pub n_targets: usize,
    /// Path of the target table.
    pub targets_path: PathBuf,
    /// Path of the truth table.
    pub truth_path: PathBuf,
}

/// Build the dark-time target and truth tables from the mocks on disk.
///
/// Writes `targets.fits` and `truth.fits` into the output directory, replacing
/// existing files.
pub fn build_mock_targets(
    config: &DarkTimeConfig,
    masks: &TargetMasks,
) -> Result<MockTargetsReport, Error> {
    config.validate()?;
    let mut rng = rng_from_seed(config.seed);
    let mocks = DarkTimeMocks::read(config)?;

    let (catalog, selections) =
        build_dark_time_catalog(&mocks, config, masks, &Bricks::default(), &mut rng)?;

    let targets_path = config.output_dir.join(TARGETS_FILENAME);
    let truth_path = config.output_dir.join(TRUTH_FILENAME);
    write_targets(&catalog.targets, &targets_path)?;
    write_truth(&catalog.truth, &truth_path)?;
    info!(
        "Wrote {} targets to {} and {}.",
        catalog.len(),
        targets_path.display(),
        truth_path.display()
    );

    Ok(MockTargetsReport {
        selections,
        n_targets: catalog.len(),
        targets_path,
        truth_path,
    })
}

/// Outcome of one table of [`build_mock_stdstar_sky`].
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationReport {
    /// What the selection produced.
    pub selection: SelectionSummary,
    /// Path of the table.
    pub path: PathBuf,
}

/// Select standard stars and sky fibers from in-memory random points.
///
/// Returns one target table per population, paired with its file name. Both tables
/// are assembled together, so their target identifiers are distinct.
pub fn build_stdstar_sky_catalogs<R: Rng + ?Sized>(
    random: &MockPopulation,
    config: &StdStarSkyConfig,
    masks: &TargetMasks,
    bricks: &Bricks,
    rng: &mut R,
) -> Result<Vec<(TargetTable, SelectionSummary, &'static str)>, BitMaskError> {
    let patch = config.density_patch();
    let (specs, filenames): (Vec<_>, Vec<_>) =
        stdstar_sky_populations(config, masks)?.into_iter().unzip();
    let populations = specs.into_iter().map(|spec| (random, spec)).collect::<Vec<_>>();
    let selections = select_all(&populations, &patch, rng);
    let catalog = assemble(&selections, bricks, rng);

    let mut start = 0;
    Ok(selections
        .iter()
        .zip(filenames)
        .map(|(selection, filename)| {
            let end = start + selection.len();
            let targets = catalog.targets.rows(start..end);
            start = end;
            (targets, SelectionSummary::from(selection), filename)
        })
        .collect())
}

/// Build the standard star and sky fiber tables from the random points on disk.
///
/// Writes `stdstar.fits` and `sky.fits` into the output directory, replacing existing
/// files. No truth tables are written.
pub fn build_mock_stdstar_sky(
    config: &StdStarSkyConfig,
    masks: &TargetMasks,
) -> Result<Vec<CalibrationReport>, Error> {
    config.validate()?;
    let mut rng = rng_from_seed(config.seed);
    let random = read_mock_dark_time(&config.random_file, false)?;

    let tables =
        build_stdstar_sky_catalogs(&random, config, masks, &Bricks::default(), &mut rng)?;

    let mut reports = Vec::with_capacity(tables.len());
    for (targets, selection, filename) in tables {
        let path = config.output_dir.join(filename);
        write_targets(&targets, &path)?;
        if targets.is_empty() {
            warn!("{}: no targets selected, wrote an empty table.", selection.label);
        }
        info!("Wrote {} targets to {}.", targets.len(), path.display());
        reports.push(CalibrationReport { selection, path });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::estimate_density;

    fn uniform(n: usize, z: impl Fn(usize) -> f64, rng: &mut StdRng) -> MockPopulation {
        let ra: Array1<f64> = (0..n).map(|_| rng.random_range(170.0..190.0)).collect();
        let dec: Array1<f64> = (0..n).map(|_| rng.random_range(0.0..45.0)).collect();
        let z: Array1<f64> = (0..n).map(z).collect();
        MockPopulation::new(ra, dec, z).unwrap()
    }

    fn config() -> DarkTimeConfig {
        DarkTimeConfig {
            qsolya_dens: 0.1,
            qsotracer_dens: 0.1,
            qso_fake_dens: 0.2,
            lrg_dens: 0.5,
            lrg_fake_dens: 0.1,
            elg_dens: 1e6,
            elg_fake_dens: 0.,
            qso_file: "qso.fits".into(),
            elg_file: "elg.fits".into(),
            lrg_file: "lrg.fits".into(),
            random_file: "random.fits".into(),
            output_dir: "out".into(),
            seed: Some(1),
            legacy_density_patch: false,
        }
    }

    fn mocks(rng: &mut StdRng) -> DarkTimeMocks {
        DarkTimeMocks {
            qso: uniform(800, |i| if i % 2 == 0 { 2.5 } else { 1.0 }, rng),
            elg: uniform(600, |_| 1.2, rng),
            lrg: uniform(700, |_| 0.7, rng),
            random: MockPopulation::without_redshift(
                uniform(900, |_| 0., rng).ra,
                uniform(900, |_| 0., rng).dec,
            )
            .unwrap(),
        }
    }

    #[test]
    fn target_ids_are_unique_and_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = draw_target_ids(10_000, &mut rng);
        assert_eq!(ids.len(), 10_000);
        assert!(ids.iter().all(|id| (0..TARGETID_LIMIT).contains(id)));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn subpriorities_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(0);
        let sub = draw_subpriorities(1000, &mut rng);
        assert!(sub.iter().all(|s| (0.0..1.0).contains(s)));
    }

    #[test]
    fn seeded_runs_repeat() {
        let mut a = rng_from_seed(Some(9));
        let mut b = rng_from_seed(Some(9));
        assert_eq!(draw_target_ids(5, &mut a), draw_target_ids(5, &mut b));
    }

    #[test]
    fn dark_time_catalog() {
        let mut rng = StdRng::seed_from_u64(31);
        let mocks = mocks(&mut rng);
        let masks = TargetMasks::builtin().unwrap();
        let config = config();

        let (catalog, summaries) =
            build_dark_time_catalog(&mocks, &config, &masks, &Bricks::default(), &mut rng)
                .unwrap();

        assert_eq!(summaries.len(), 7);
        let total: usize = summaries.iter().map(|s| s.n_selected).sum();
        assert_eq!(catalog.len(), total);
        assert_eq!(catalog.truth.len(), total);

        // The Lya and tracer windows split the quasar mock in half.
        assert_eq!(summaries[0].n_candidates, 400);
        assert_eq!(summaries[1].n_candidates, 400);
        // ELG goal far above the mock density keeps everything.
        assert!(summaries[5].shortfall);
        assert_eq!(summaries[5].n_selected, 600);
        // A zero goal keeps nothing.
        assert_eq!(summaries[6].n_selected, 0);

        let targets = &catalog.targets;
        let truth = &catalog.truth;
        assert_eq!(targets.targetid, truth.targetid);
        assert_eq!(targets.brickname, truth.brickname);
        assert_eq!(targets.ra, truth.ra);
        assert_eq!(targets.dec, truth.dec);
        assert_eq!(
            targets.targetid.iter().collect::<HashSet<_>>().len(),
            targets.len()
        );
        assert!(targets.bgs_target.iter().all(|f| *f == 0));
        assert!(targets.mws_target.iter().all(|f| *f == 0));

        let qso = masks.desi_mask.mask("QSO").unwrap();
        let elg = masks.desi_mask.mask("ELG").unwrap();
        let n_qso = summaries[..3].iter().map(|s| s.n_selected).sum::<usize>();
        assert!(targets.desi_target[..n_qso].iter().all(|f| *f == qso));
        assert!(targets.desi_target[n_qso..].iter().all(|f| *f != qso));
        assert_eq!(
            targets.desi_target.iter().filter(|f| **f == elg).count(),
            600
        );
        assert_eq!(
            truth.truetype.iter().filter(|t| **t == TrueType::Galaxy).count(),
            summaries[3].n_selected + 600
        );
    }

    #[test]
    fn assembled_order_and_bricks() {
        let mut rng = StdRng::seed_from_u64(5);
        let bricks = Bricks::default();
        let first = uniform(50, |_| 1., &mut rng);
        let second = uniform(30, |_| 2., &mut rng);
        let specs = [
            (&first, PopulationSpec::new("first", TrueType::Galaxy, 1e6)),
            (&second, PopulationSpec::new("second", TrueType::Qso, 1e6)),
        ];

        let selections = select_all(&specs, &SkyPatch::reference(), &mut rng);
        let catalog = assemble(&selections, &bricks, &mut rng);

        assert_eq!(catalog.len(), 80);
        assert_eq!(&catalog.truth.truez[..50], &[1.; 50][..]);
        assert_eq!(&catalog.truth.truez[50..], &[2.; 30][..]);
        assert_eq!(catalog.truth.truetype[49], TrueType::Galaxy);
        assert_eq!(catalog.truth.truetype[50], TrueType::Qso);
        for i in 0..catalog.len() {
            let t = &catalog.targets;
            assert_eq!(t.brickname[i], bricks.brickname(t.ra[i], t.dec[i]));
        }
    }

    #[test]
    fn empty_selections_assemble() {
        let mut rng = StdRng::seed_from_u64(5);
        let empty = MockPopulation::default();
        let specs = [(&empty, PopulationSpec::new("empty", TrueType::Galaxy, 10.))];

        let selections = select_all(&specs, &SkyPatch::reference(), &mut rng);
        let catalog = assemble(&selections, &Bricks::default(), &mut rng);
        assert!(catalog.is_empty());
        assert!(catalog.truth.is_empty());

        let catalog = assemble(&[], &Bricks::default(), &mut rng);
        assert!(catalog.is_empty());
    }

    #[test]
    fn stdstar_and_sky() {
        let mut rng = StdRng::seed_from_u64(77);
        let random = uniform(2000, |_| 0., &mut rng);
        let density =
            estimate_density(random.ra.view(), random.dec.view(), &SkyPatch::reference());
        let masks = TargetMasks::builtin().unwrap();
        let config = StdStarSkyConfig {
            std_star_dens: density / 4.,
            sky_calib_dens: density,
            random_file: "random.fits".into(),
            output_dir: "out".into(),
            seed: None,
            legacy_density_patch: false,
        };

        let tables =
            build_stdstar_sky_catalogs(&random, &config, &masks, &Bricks::default(), &mut rng)
                .unwrap();

        assert_eq!(tables.len(), 2);
        let (stars, star_summary, star_file) = &tables[0];
        let (sky, sky_summary, sky_file) = &tables[1];
        assert_eq!(*star_file, STDSTAR_FILENAME);
        assert_eq!(*sky_file, SKY_FILENAME);
        assert_eq!(star_summary.n_candidates, 2000);
        assert_eq!(sky.len(), 2000);
        assert!(!sky_summary.shortfall);
        assert!(stars.len() < 700);
        let std_fstar = masks.desi_mask.mask("STD_FSTAR").unwrap();
        assert!(stars.desi_target.iter().all(|f| *f == std_fstar));
        let sky_bit = masks.desi_mask.mask("SKY").unwrap();
        assert!(sky.desi_target.iter().all(|f| *f == sky_bit));
    }

    #[test]
    fn calibration_ids_distinct() {
        let mut rng = StdRng::seed_from_u64(78);
        let random = uniform(3000, |_| 0., &mut rng);
        let density =
            estimate_density(random.ra.view(), random.dec.view(), &SkyPatch::reference());
        let masks = TargetMasks::builtin().unwrap();
        let config = StdStarSkyConfig {
            std_star_dens: density,
            sky_calib_dens: density,
            random_file: "random.fits".into(),
            output_dir: "out".into(),
            seed: None,
            legacy_density_patch: false,
        };

        let tables =
            build_stdstar_sky_catalogs(&random, &config, &masks, &Bricks::default(), &mut rng)
                .unwrap();

        let ids = tables
            .iter()
            .flat_map(|(targets, _, _)| targets.targetid.iter().copied())
            .collect::<Vec<_>>();
        assert_eq!(ids.len(), 6000);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn workflows_write_matching_tables() {
        use crate::io::{read_targets, read_truth, write_mock};

        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(79);
        let mocks = mocks(&mut rng);
        for (name, mock, with_z) in [
            ("qso.fits", &mocks.qso, true),
            ("elg.fits", &mocks.elg, true),
            ("lrg.fits", &mocks.lrg, true),
            ("random.fits", &mocks.random, false),
        ] {
            let z = mock.z.to_vec();
            write_mock(
                &dir.path().join(name),
                &mock.ra.to_vec(),
                &mock.dec.to_vec(),
                with_z.then_some(z.as_slice()),
            );
        }
        let masks = TargetMasks::builtin().unwrap();

        let dark = DarkTimeConfig {
            qso_file: dir.path().join("qso.fits"),
            elg_file: dir.path().join("elg.fits"),
            lrg_file: dir.path().join("lrg.fits"),
            random_file: dir.path().join("random.fits"),
            output_dir: dir.path().to_path_buf(),
            ..config()
        };
        let report = build_mock_targets(&dark, &masks).unwrap();
        assert_eq!(report.targets_path, dir.path().join(TARGETS_FILENAME));
        assert_eq!(report.truth_path, dir.path().join(TRUTH_FILENAME));

        let targets = read_targets(&report.targets_path).unwrap();
        let truth = read_truth(&report.truth_path).unwrap();
        assert_eq!(targets.len(), report.n_targets);
        assert!(!targets.is_empty());
        assert_eq!(targets.targetid, truth.targetid);
        assert_eq!(targets.ra, truth.ra);
        assert_eq!(targets.dec, truth.dec);
        assert_eq!(targets.brickname, truth.brickname);
        assert!(targets.targetid.iter().all(|id| (0..TARGETID_LIMIT).contains(id)));
        assert_eq!(
            targets.targetid.iter().collect::<HashSet<_>>().len(),
            targets.len()
        );
        let dark_bits = ["QSO", "LRG", "ELG"].map(|name| masks.desi_mask.mask(name).unwrap());
        assert!(targets.desi_target.iter().all(|f| dark_bits.contains(f)));

        let calib = StdStarSkyConfig {
            std_star_dens: 1.,
            sky_calib_dens: 1e6,
            random_file: dir.path().join("random.fits"),
            output_dir: dir.path().to_path_buf(),
            seed: Some(3),
            legacy_density_patch: false,
        };
        let reports = build_mock_stdstar_sky(&calib, &masks).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].path, dir.path().join(STDSTAR_FILENAME));
        assert_eq!(reports[1].path, dir.path().join(SKY_FILENAME));

        let stars = read_targets(&reports[0].path).unwrap();
        let sky = read_targets(&reports[1].path).unwrap();
        assert_eq!(stars.len(), reports[0].selection.n_selected);
        assert_eq!(sky.len(), mocks.random.len());
        let std_fstar = masks.desi_mask.mask("STD_FSTAR").unwrap();
        let sky_bit = masks.desi_mask.mask("SKY").unwrap();
        assert!(sky_bit > u32::MAX as i64);
        assert!(stars.desi_target.iter().all(|f| *f == std_fstar));
        assert!(sky.desi_target.iter().all(|f| *f == sky_bit));
        assert!(stars.targetid.iter().chain(&sky.targetid).all(|id| *id >= 0));
        let star_ids = stars.targetid.iter().collect::<HashSet<_>>();
        assert!(sky.targetid.iter().all(|id| !star_ids.contains(id)));

        // Existing outputs are replaced.
        build_mock_stdstar_sky(&calib, &masks).unwrap();
        build_mock_targets(&dark, &masks).unwrap();
    }
}
