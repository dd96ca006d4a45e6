//! FITS input and output.
//!
//! Mocks and brick summaries are read from the first extension of a FITS file.
//! Target and truth tables are written as a single binary table extension named
//! `TARGETS` or `TRUTH`, replacing any existing file.

use std::path::Path;

use fitsio::hdu::FitsHdu;
use fitsio::tables::{ColumnDataType, ColumnDescription, ConcreteColumnDescription, ReadsCol};
use fitsio::FitsFile;
use log::debug;
use ndarray::Array1;
use thiserror::Error;

use crate::catalog::{TargetTable, TruthTable};
use crate::selection::{MockPopulation, SelectionError};

/// Width of the `BRICKNAME` column.
pub const BRICKNAME_WIDTH: usize = 8;
/// Width of the `TRUETYPE` column.
pub const TRUETYPE_WIDTH: usize = 10;
/// Extension name of target tables.
pub const TARGETS_EXTNAME: &str = "TARGETS";
/// Extension name of truth tables.
pub const TRUTH_EXTNAME: &str = "TRUTH";

/// Errors reading or writing FITS tables.
#[derive(Error, Debug)]
pub enum FitsError {
    /// Error reported by cfitsio.
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    /// Values that do not fit the table schema.
    #[error("Invalid data in table: {0}")]
    InvalidData(String),
    /// Columns that do not form a population.
    #[error("Invalid population: {0}")]
    Population(#[from] SelectionError),
}

/// Read a column by its upper-case name, falling back to lower case.
fn read_col<T: ReadsCol>(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    name: &str,
) -> Result<Vec<T>, FitsError> {
    Ok(hdu
        .read_col(fptr, name.to_uppercase().as_str())
        .or_else(|_| hdu.read_col(fptr, name.to_lowercase().as_str()))?)
}

/// Read a mock catalog from HDU 1.
///
/// # Arguments
/// - `path`: FITS file with columns `RA`, `DEC` and, when `read_z` is set, `Z`.
/// - `read_z`: Read redshifts. Otherwise every object gets `z = 0`.
///
/// RA is wrapped into `[0, 360)`.
pub fn read_mock_dark_time<P: AsRef<Path>>(
    path: P,
    read_z: bool,
) -> Result<MockPopulation, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.hdu(1)?;

    let ra: Vec<f64> = read_col(&hdu, &mut fptr, "RA")?;
    let dec: Vec<f64> = read_col(&hdu, &mut fptr, "DEC")?;
    let ra = Array1::from(ra).mapv(|ra| ra.rem_euclid(360.));
    let dec = Array1::from(dec);

    let population = if read_z {
        let z: Vec<f64> = read_col(&hdu, &mut fptr, "Z")?;
        MockPopulation::new(ra, dec, Array1::from(z))?
    } else {
        MockPopulation::without_redshift(ra, dec)?
    };
    debug!(
        "Read {} objects from {}.",
        population.len(),
        path.as_ref().display()
    );
    Ok(population)
}

/// 64-bit integer column, TFORM `K`.
fn long_long(name: &str) -> Result<ConcreteColumnDescription, FitsError> {
    Ok(ColumnDescription::new(name)
        .with_type(ColumnDataType::LongLong)
        .create()?)
}

fn double(name: &str) -> Result<ConcreteColumnDescription, FitsError> {
    Ok(ColumnDescription::new(name)
        .with_type(ColumnDataType::Double)
        .create()?)
}

fn string(name: &str, width: usize) -> Result<ConcreteColumnDescription, FitsError> {
    Ok(ColumnDescription::new(name)
        .with_type(ColumnDataType::String)
        .that_repeats(width)
        .create()?)
}

fn check_width(column: &str, values: &[String], width: usize) -> Result<(), FitsError> {
    match values.iter().find(|v| v.len() > width) {
        Some(v) => Err(FitsError::InvalidData(format!(
            "{column} value '{v}' is longer than {width} characters"
        ))),
        None => Ok(()),
    }
}

/// Write a target table, replacing `path`.
///
/// An empty table is written with its columns and no rows.
pub fn write_targets<P: AsRef<Path>>(table: &TargetTable, path: P) -> Result<(), FitsError> {
    check_width("BRICKNAME", &table.brickname, BRICKNAME_WIDTH)?;
    let columns = [
        long_long("TARGETID")?,
        string("BRICKNAME", BRICKNAME_WIDTH)?,
        double("RA")?,
        double("DEC")?,
        long_long("DESI_TARGET")?,
        long_long("BGS_TARGET")?,
        long_long("MWS_TARGET")?,
        double("SUBPRIORITY")?,
    ];

    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;
    let hdu = fptr.create_table(TARGETS_EXTNAME.to_string(), &columns)?;
    if !table.is_empty() {
        hdu.write_col(&mut fptr, "TARGETID", &table.targetid)?;
        hdu.write_col(&mut fptr, "BRICKNAME", &table.brickname)?;
        hdu.write_col(&mut fptr, "RA", &table.ra)?;
        hdu.write_col(&mut fptr, "DEC", &table.dec)?;
        hdu.write_col(&mut fptr, "DESI_TARGET", &table.desi_target)?;
        hdu.write_col(&mut fptr, "BGS_TARGET", &table.bgs_target)?;
        hdu.write_col(&mut fptr, "MWS_TARGET", &table.mws_target)?;
        hdu.write_col(&mut fptr, "SUBPRIORITY", &table.subpriority)?;
    }
    debug!("Wrote {} rows to {}.", table.len(), path.as_ref().display());
    Ok(())
}

/// Write a truth table, replacing `path`.
///
/// An empty table is written with its columns and no rows.
pub fn write_truth<P: AsRef<Path>>(table: &TruthTable, path: P) -> Result<(), FitsError> {
    check_width("BRICKNAME", &table.brickname, BRICKNAME_WIDTH)?;
    let columns = [
        long_long("TARGETID")?,
        string("BRICKNAME", BRICKNAME_WIDTH)?,
        double("RA")?,
        double("DEC")?,
        double("TRUEZ")?,
        string("TRUETYPE", TRUETYPE_WIDTH)?,
    ];
    let truetype: Vec<String> = table.truetype.iter().map(|t| t.to_string()).collect();

    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;
    let hdu = fptr.create_table(TRUTH_EXTNAME.to_string(), &columns)?;
    if !table.is_empty() {
        hdu.write_col(&mut fptr, "TARGETID", &table.targetid)?;
        hdu.write_col(&mut fptr, "BRICKNAME", &table.brickname)?;
        hdu.write_col(&mut fptr, "RA", &table.ra)?;
        hdu.write_col(&mut fptr, "DEC", &table.dec)?;
        hdu.write_col(&mut fptr, "TRUEZ", &table.truez)?;
        hdu.write_col(&mut fptr, "TRUETYPE", &truetype)?;
    }
    debug!("Wrote {} rows to {}.", table.len(), path.as_ref().display());
    Ok(())
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.trim_end().to_string()).collect()
}

/// Read a target table written by [`write_targets`].
pub fn read_targets<P: AsRef<Path>>(path: P) -> Result<TargetTable, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.hdu(TARGETS_EXTNAME)?;
    Ok(TargetTable {
        targetid: hdu.read_col(&mut fptr, "TARGETID")?,
        brickname: trimmed(hdu.read_col(&mut fptr, "BRICKNAME")?),
        ra: hdu.read_col(&mut fptr, "RA")?,
        dec: hdu.read_col(&mut fptr, "DEC")?,
        desi_target: hdu.read_col(&mut fptr, "DESI_TARGET")?,
        bgs_target: hdu.read_col(&mut fptr, "BGS_TARGET")?,
        mws_target: hdu.read_col(&mut fptr, "MWS_TARGET")?,
        subpriority: hdu.read_col(&mut fptr, "SUBPRIORITY")?,
    })
}

/// Read a truth table written by [`write_truth`].
pub fn read_truth<P: AsRef<Path>>(path: P) -> Result<TruthTable, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.hdu(TRUTH_EXTNAME)?;
    let truetype: Vec<String> = hdu.read_col(&mut fptr, "TRUETYPE")?;
    Ok(TruthTable {
        targetid: hdu.read_col(&mut fptr, "TARGETID")?,
        brickname: trimmed(hdu.read_col(&mut fptr, "BRICKNAME")?),
        ra: hdu.read_col(&mut fptr, "RA")?,
        dec: hdu.read_col(&mut fptr, "DEC")?,
        truez: hdu.read_col(&mut fptr, "TRUEZ")?,
        truetype: truetype
            .iter()
            .map(|t| t.parse())
            .collect::<Result<_, _>>()?,
    })
}

/// One row of a brick summary table.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "database",
    derive(diesel::Queryable, diesel::Selectable, diesel::Insertable)
)]
#[cfg_attr(feature = "database", diesel(table_name = crate::db::schema::bricks))]
#[allow(missing_docs)]
pub struct BrickRow {
    pub brickname: String,
    pub brickid: i32,
    pub brickrow: i32,
    pub brickcol: i32,
    pub brickq: i16,
    pub ra: f64,
    pub dec: f64,
    pub ra1: f64,
    pub dec1: f64,
    pub ra2: f64,
    pub dec2: f64,
    pub nobs_med_g: i16,
    pub nobs_med_r: i16,
    pub nobs_med_z: i16,
    pub nobs_max_g: i16,
    pub nobs_max_r: i16,
    pub nobs_max_z: i16,
}

fn read_short(hdu: &FitsHdu, fptr: &mut FitsFile, name: &str) -> Result<Vec<i16>, FitsError> {
    let values: Vec<i32> = read_col(hdu, fptr, name)?;
    values
        .into_iter()
        .map(|v| {
            i16::try_from(v)
                .map_err(|_| FitsError::InvalidData(format!("{name} value {v} overflows i16")))
        })
        .collect()
}

/// Read the brick summary table in HDU 1.
pub fn read_brick_rows<P: AsRef<Path>>(path: P) -> Result<Vec<BrickRow>, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.hdu(1)?;

    let brickname: Vec<String> = trimmed(read_col(&hdu, &mut fptr, "brickname")?);
    let brickid: Vec<i32> = read_col(&hdu, &mut fptr, "brickid")?;
    let brickrow: Vec<i32> = read_col(&hdu, &mut fptr, "brickrow")?;
    let brickcol: Vec<i32> = read_col(&hdu, &mut fptr, "brickcol")?;
    let brickq = read_short(&hdu, &mut fptr, "brickq")?;
    let ra: Vec<f64> = read_col(&hdu, &mut fptr, "ra")?;
    let dec: Vec<f64> = read_col(&hdu, &mut fptr, "dec")?;
    let ra1: Vec<f64> = read_col(&hdu, &mut fptr, "ra1")?;
    let dec1: Vec<f64> = read_col(&hdu, &mut fptr, "dec1")?;
    let ra2: Vec<f64> = read_col(&hdu, &mut fptr, "ra2")?;
    let dec2: Vec<f64> = read_col(&hdu, &mut fptr, "dec2")?;
    let nobs_med_g = read_short(&hdu, &mut fptr, "nobs_med_g")?;
    let nobs_med_r = read_short(&hdu, &mut fptr, "nobs_med_r")?;
    let nobs_med_z = read_short(&hdu, &mut fptr, "nobs_med_z")?;
    let nobs_max_g = read_short(&hdu, &mut fptr, "nobs_max_g")?;
    let nobs_max_r = read_short(&hdu, &mut fptr, "nobs_max_r")?;
    let nobs_max_z = read_short(&hdu, &mut fptr, "nobs_max_z")?;

    let n = brickname.len();
    let lengths = [
        brickid.len(),
        brickrow.len(),
        brickcol.len(),
        brickq.len(),
        ra.len(),
        dec.len(),
        ra1.len(),
        dec1.len(),
        ra2.len(),
        dec2.len(),
        nobs_med_g.len(),
        nobs_med_r.len(),
        nobs_med_z.len(),
        nobs_max_g.len(),
        nobs_max_r.len(),
        nobs_max_z.len(),
    ];
    if lengths.iter().any(|&len| len != n) {
        return Err(FitsError::InvalidData(format!(
            "brick columns have different lengths: {n} names, {lengths:?}"
        )));
    }

    let rows = (0..n)
        .map(|i| BrickRow {
            brickname: brickname[i].clone(),
            brickid: brickid[i],
            brickrow: brickrow[i],
            brickcol: brickcol[i],
            brickq: brickq[i],
            ra: ra[i],
            dec: dec[i],
            ra1: ra1[i],
            dec1: dec1[i],
            ra2: ra2[i],
            dec2: dec2[i],
            nobs_med_g: nobs_med_g[i],
            nobs_med_r: nobs_med_r[i],
            nobs_med_z: nobs_med_z[i],
            nobs_max_g: nobs_max_g[i],
            nobs_max_r: nobs_max_r[i],
            nobs_max_z: nobs_max_z[i],
        })
        .collect::<Vec<_>>();
    debug!("Read {} bricks from {}.", rows.len(), path.as_ref().display());
    Ok(rows)
}

/// Write a mock table with `RA`, `DEC` and optionally `Z` into HDU 1.
#[cfg(test)]
pub(crate) fn write_mock(path: &Path, ra: &[f64], dec: &[f64], z: Option<&[f64]>) {
    let mut columns = vec![double("RA").unwrap(), double("DEC").unwrap()];
    if z.is_some() {
        columns.push(double("Z").unwrap());
    }
    let mut fptr = FitsFile::create(path).overwrite().open().unwrap();
    let hdu = fptr.create_table("MOCK".to_string(), &columns).unwrap();
    hdu.write_col(&mut fptr, "RA", ra).unwrap();
    hdu.write_col(&mut fptr, "DEC", dec).unwrap();
    if let Some(z) = z {
        hdu.write_col(&mut fptr, "Z", z).unwrap();
    }
}
