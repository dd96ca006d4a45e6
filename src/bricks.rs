//! Brick geometry: the partition of the sky into rows of constant declination,
//! each cut into equal RA columns so that bricks keep roughly the same area.

use log::debug;

/// Default brick size in degrees.
pub const BRICKSIZE: f64 = 0.25;

/// Partition of the sky into bricks.
#[derive(Clone, Debug, PartialEq)]
pub struct Bricks {
    bricksize: f64,
    /// Declination of the row centers, from -90 to +90.
    center_dec: Vec<f64>,
    /// Number of RA columns in every row.
    ncol_per_row: Vec<usize>,
}

impl Bricks {
    /// Build the partition for a brick size in degrees.
    ///
    /// # Panics
    /// If `bricksize` is not in `(0, 180]`, NaN included.
    pub fn new(bricksize: f64) -> Self {
        assert!(
            bricksize > 0. && bricksize <= 180.,
            "brick size must be in (0, 180] degrees, got {bricksize}"
        );
        let nrow = (180. / bricksize).round() as usize + 1;
        let center_dec: Vec<f64> = (0..nrow).map(|i| -90. + i as f64 * bricksize).collect();
        let ncol_per_row = center_dec
            .iter()
            .map(|dec| {
                let declo = (dec.abs() - bricksize / 2.).to_radians();
                let n = 360. / bricksize * declo.cos();
                ((n / 2.).ceil() * 2.).max(1.) as usize
            })
            .collect();
        debug!("Built {nrow} brick rows of size {bricksize} deg.");

        Self {
            bricksize,
            center_dec,
            ncol_per_row,
        }
    }

    /// Brick size in degrees.
    pub fn bricksize(&self) -> f64 {
        self.bricksize
    }

    /// Number of brick rows.
    pub fn nrow(&self) -> usize {
        self.center_dec.len()
    }

    /// Number of bricks in row `row`.
    pub fn ncol(&self, row: usize) -> usize {
        self.ncol_per_row[row]
    }

    /// Row and column of the brick containing `(ra, dec)`.
    ///
    /// RA is wrapped into `[0, 360)`, Dec is clamped to the poles.
    pub fn brick_index(&self, ra: f64, dec: f64) -> (usize, usize) {
        let row = ((dec + 90. + self.bricksize / 2.) / self.bricksize).floor();
        let row = (row.max(0.) as usize).min(self.nrow() - 1);
        let ncol = self.ncol_per_row[row];
        let col = (ra.rem_euclid(360.) / 360. * ncol as f64).floor() as usize;
        (row, col.min(ncol - 1))
    }

    /// Center `(ra, dec)` of the brick at `row`, `col`.
    pub fn brick_center(&self, row: usize, col: usize) -> (f64, f64) {
        let width = 360. / self.ncol_per_row[row] as f64;
        ((col as f64 + 0.5) * width, self.center_dec[row])
    }

    /// Name of the brick containing `(ra, dec)`, e.g. `1801p100`.
    pub fn brickname(&self, ra: f64, dec: f64) -> String {
        let (row, col) = self.brick_index(ra, dec);
        let (ra_c, dec_c) = self.brick_center(row, col);
        let pm = if dec_c >= 0. { 'p' } else { 'm' };
        format!(
            "{:04}{}{:03}",
            (ra_c * 10.) as i64,
            pm,
            (dec_c.abs() * 10.) as i64
        )
    }

    /// Brick names for parallel columns of coordinates.
    pub fn bricknames(&self, ra: &[f64], dec: &[f64]) -> Vec<String> {
        assert_eq!(ra.len(), dec.len(), "ra and dec must have equal length");
        ra.iter()
            .zip(dec)
            .map(|(ra, dec)| self.brickname(*ra, *dec))
            .collect()
    }
}

impl Default for Bricks {
    fn default() -> Self {
        Self::new(BRICKSIZE)
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use rayon::prelude::*;

    use super::Bricks;

    impl Bricks {
        /// Brick names for parallel columns of coordinates, computed in parallel.
        ///
        /// Also see [`bricknames`](Bricks::bricknames()).
        pub fn bricknames_par(&self, ra: &[f64], dec: &[f64]) -> Vec<String> {
            assert_eq!(ra.len(), dec.len(), "ra and dec must have equal length");
            ra.par_iter()
                .zip(dec.par_iter())
                .map(|(ra, dec)| self.brickname(*ra, *dec))
                .collect()
        }
    }
}
