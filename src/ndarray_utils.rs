//! A collection of various utilities needed in this library.
//! Mostly boolean-mask selection and concatenation of one-dimensional columns,
//! the two operations every catalog step is built from.

use itertools::Itertools;
use ndarray::{Array1, ArrayView1, Axis, Zip};

/// Indices of the `true` entries of `mask`.
pub(crate) fn mask_indices(mask: ArrayView1<bool>) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect_vec()
}

/// Keep the elements of `arr` where `mask` is `true`, preserving order.
pub(crate) fn select_mask<T: Clone>(arr: ArrayView1<T>, mask: ArrayView1<bool>) -> Array1<T> {
    assert_eq!(arr.len(), mask.len(), "mask length differs from array length");
    arr.select(Axis(0), &mask_indices(mask))
}

/// Mask of the elements lying in the closed interval `[lo, hi]`.
/// `NaN` never lies inside.
pub(crate) fn within_closed(arr: ArrayView1<f64>, lo: f64, hi: f64) -> Array1<bool> {
    arr.mapv(|x| x >= lo && x <= hi)
}

/// Count the pairs `(a, b)` satisfying `pred`.
pub(crate) fn count_zip<F>(a: ArrayView1<f64>, b: ArrayView1<f64>, pred: F) -> usize
where
    F: Fn(f64, f64) -> bool,
{
    assert_eq!(a.len(), b.len(), "columns must have equal length");
    Zip::from(&a)
        .and(&b)
        .fold(0, |acc, &x, &y| if pred(x, y) { acc + 1 } else { acc })
}

/// Concatenate columns end to end. An empty list yields an empty column.
pub(crate) fn concat<T: Clone>(parts: &[ArrayView1<T>]) -> Array1<T> {
    parts.iter().flat_map(|p| p.iter().cloned()).collect()
}
