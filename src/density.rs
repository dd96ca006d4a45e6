//! Number density of a point set over a fixed reference patch of sky.

use ndarray::ArrayView1;

use crate::ndarray_utils::count_zip;

/// Area of the reference patch in square degrees.
///
/// A 20° by 45° rectangle in (RA, Dec) starting at the equator, scaled by the mean of
/// `cos(dec)` over the declination range.
pub fn reference_area() -> f64 {
    let dec_max = 45f64.to_radians();
    20. * 45. * dec_max.sin() / dec_max
}

/// Rectangular patch of sky used to estimate the intrinsic density of a mock.
///
/// All bounds are exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyPatch {
    /// Lower RA bound in degrees.
    pub ra_min: f64,
    /// Upper RA bound in degrees. `None` leaves RA unbounded above.
    pub ra_max: Option<f64>,
    /// Lower Dec bound in degrees.
    pub dec_min: f64,
    /// Upper Dec bound in degrees.
    pub dec_max: f64,
    /// Area the counts are divided by, in square degrees.
    pub area: f64,
}

impl SkyPatch {
    /// The reference patch `170 < ra < 190`, `0 < dec < 45`.
    pub fn reference() -> Self {
        Self {
            ra_min: 170.,
            ra_max: Some(190.),
            dec_min: 0.,
            dec_max: 45.,
            area: reference_area(),
        }
    }

    /// The patch as historically applied: no upper RA bound, but the same area.
    ///
    /// Mocks covering more than the 20° RA strip come out denser than they are,
    /// which matches catalogs produced by earlier pipeline versions.
    pub fn legacy() -> Self {
        Self {
            ra_max: None,
            ..Self::reference()
        }
    }

    /// Whether a point lies inside the patch.
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        ra > self.ra_min
            && self.ra_max.is_none_or(|ra_max| ra < ra_max)
            && dec > self.dec_min
            && dec < self.dec_max
    }

    /// Number of points inside the patch.
    pub fn count(&self, ra: ArrayView1<f64>, dec: ArrayView1<f64>) -> usize {
        count_zip(ra, dec, |ra, dec| self.contains(ra, dec))
    }
}

impl Default for SkyPatch {
    fn default() -> Self {
        Self::reference()
    }
}

/// Estimate the number density (objects per square degree) from the points inside `patch`.
///
/// # Arguments
/// - `ra`: Right ascensions in degrees.
/// - `dec`: Declinations in degrees, same length as `ra`.
///
/// Empty input yields `0`.
///
/// # Example
/// ```
/// use desitarget::density::{estimate_density, reference_area, SkyPatch};
/// use ndarray::array;
///
/// // The last point lies outside the patch.
/// let ra = array![175., 185., 200.];
/// let dec = array![10., 30., 10.];
/// let density = estimate_density(ra.view(), dec.view(), &SkyPatch::reference());
/// assert_eq!(density, 2. / reference_area());
/// ```
pub fn estimate_density(ra: ArrayView1<f64>, dec: ArrayView1<f64>, patch: &SkyPatch) -> f64 {
    patch.count(ra, dec) as f64 / patch.area
}
