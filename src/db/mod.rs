//! Loading brick summaries into the `bricks` table of a PostgreSQL database.

pub mod schema;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{debug, info, warn};
use thiserror::Error;

use crate::io::BrickRow;
use schema::bricks;

/// Most bind parameters PostgreSQL accepts in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;
/// Number of columns of the `bricks` table.
pub const BRICK_COLUMNS: usize = 17;
/// Rows inserted per statement.
pub const CHUNK_ROWS: usize = MAX_BIND_PARAMS / BRICK_COLUMNS;

/// Errors talking to the database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The connection could not be established.
    #[error("connecting to database: {0}")]
    Connection(#[from] ConnectionError),
    /// A statement failed.
    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Open a connection to the database at `url`.
pub fn connect(url: &str) -> Result<PgConnection, DbError> {
    Ok(PgConnection::establish(url)?)
}

/// Insert all rows into `bricks`.
///
/// Rows are sent in chunks of [`CHUNK_ROWS`], all within one transaction. Nothing is
/// committed unless every chunk succeeds.
pub fn load_bricks(conn: &mut PgConnection, rows: &[BrickRow]) -> Result<usize, DbError> {
    let inserted = conn.transaction::<_, DbError, _>(|conn| {
        let mut inserted = 0;
        for (i, chunk) in rows.chunks(CHUNK_ROWS).enumerate() {
            inserted += diesel::insert_into(bricks::table)
                .values(chunk)
                .execute(conn)?;
            debug!("Inserted chunk {} ({} rows).", i, chunk.len());
        }
        Ok(inserted)
    })?;
    info!("Loaded {inserted} bricks.");
    Ok(inserted)
}

/// A sampled row that does not match the database.
#[derive(Clone, Debug, PartialEq)]
pub enum Mismatch {
    /// No row with this brickname exists.
    Missing(String),
    /// The row exists but differs in these columns.
    Differs {
        /// Brick of the row.
        brickname: String,
        /// Columns whose values differ.
        fields: Vec<&'static str>,
    },
}

/// Columns in which two rows differ.
pub fn differing_fields(a: &BrickRow, b: &BrickRow) -> Vec<&'static str> {
    let checks: [(&'static str, bool); BRICK_COLUMNS] = [
        ("brickname", a.brickname == b.brickname),
        ("brickid", a.brickid == b.brickid),
        ("brickrow", a.brickrow == b.brickrow),
        ("brickcol", a.brickcol == b.brickcol),
        ("brickq", a.brickq == b.brickq),
        ("ra", a.ra == b.ra),
        ("dec", a.dec == b.dec),
        ("ra1", a.ra1 == b.ra1),
        ("dec1", a.dec1 == b.dec1),
        ("ra2", a.ra2 == b.ra2),
        ("dec2", a.dec2 == b.dec2),
        ("nobs_med_g", a.nobs_med_g == b.nobs_med_g),
        ("nobs_med_r", a.nobs_med_r == b.nobs_med_r),
        ("nobs_med_z", a.nobs_med_z == b.nobs_med_z),
        ("nobs_max_g", a.nobs_max_g == b.nobs_max_g),
        ("nobs_max_r", a.nobs_max_r == b.nobs_max_r),
        ("nobs_max_z", a.nobs_max_z == b.nobs_max_z),
    ];
    checks
        .into_iter()
        .filter_map(|(name, equal)| (!equal).then_some(name))
        .collect()
}

/// Indices of `sample` rows spread evenly over `n` rows. All rows when `sample >= n`.
pub fn sample_indices(n: usize, sample: usize) -> Vec<usize> {
    if sample >= n {
        return (0..n).collect();
    }
    (0..sample).map(|i| i * n / sample).collect()
}

/// Re-read `sample` of the rows by brickname and compare them column by column.
///
/// Returns the rows that are missing or differ. An empty result is a successful load.
pub fn verify_bricks(
    conn: &mut PgConnection,
    rows: &[BrickRow],
    sample: usize,
) -> Result<Vec<Mismatch>, DbError> {
    let mut mismatches = Vec::new();
    for i in sample_indices(rows.len(), sample) {
        let expected = &rows[i];
        let stored = bricks::table
            .find(&expected.brickname)
            .select(BrickRow::as_select())
            .first(conn)
            .optional()?;
        match stored {
            None => mismatches.push(Mismatch::Missing(expected.brickname.clone())),
            Some(stored) => {
                let fields = differing_fields(expected, &stored);
                if !fields.is_empty() {
                    mismatches.push(Mismatch::Differs {
                        brickname: expected.brickname.clone(),
                        fields,
                    });
                }
            }
        }
    }
    if mismatches.is_empty() {
        info!("Verified {} bricks.", sample.min(rows.len()));
    } else {
        warn!("{} of the sampled bricks do not match.", mismatches.len());
    }
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(brickname: &str) -> BrickRow {
        BrickRow {
            brickname: brickname.to_string(),
            brickid: 1,
            brickrow: 400,
            brickcol: 720,
            brickq: 0,
            ra: 180.125,
            dec: 10.,
            ra1: 180.,
            dec1: 9.875,
            ra2: 180.25,
            dec2: 10.125,
            nobs_med_g: 1,
            nobs_med_r: 1,
            nobs_med_z: 1,
            nobs_max_g: 2,
            nobs_max_r: 2,
            nobs_max_z: 2,
        }
    }

    #[test]
    fn chunks_respect_bind_limit() {
        assert!(CHUNK_ROWS * BRICK_COLUMNS <= MAX_BIND_PARAMS);
        assert!((CHUNK_ROWS + 1) * BRICK_COLUMNS > MAX_BIND_PARAMS);

        let rows = vec![row("1801p100"); 2 * CHUNK_ROWS + 1];
        let sizes: Vec<usize> = rows.chunks(CHUNK_ROWS).map(<[BrickRow]>::len).collect();
        assert_eq!(sizes, vec![CHUNK_ROWS, CHUNK_ROWS, 1]);
    }

    #[test]
    fn field_differences() {
        let a = row("1801p100");
        assert!(differing_fields(&a, &a.clone()).is_empty());

        let mut b = a.clone();
        b.dec2 = 10.;
        b.nobs_max_r = 5;
        assert_eq!(differing_fields(&a, &b), vec!["dec2", "nobs_max_r"]);
    }

    #[test]
    fn sampling() {
        assert_eq!(sample_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(sample_indices(3, 10), vec![0, 1, 2]);
        assert!(sample_indices(10, 0).is_empty());
        assert!(sample_indices(0, 4).is_empty());
    }
}
