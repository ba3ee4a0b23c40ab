// raster/ - Scalar field operations on 2D grids
//
// Fields are `Array2<f32>` indexed [row, col]. Every function here leaves its
// output finite; callers that resample re-scrub anyway since interpolation
// is where NaN creeps in. Image-processing primitives delegate to imageproc
// through the buffer conversions in `convert`.

mod convert;
mod filter;
mod label;
mod morph;
mod resample;

pub use filter::*;
pub use label::*;
pub use morph::*;
pub use resample::*;

use ndarray::{Array2, ArrayViewMut1, Axis};

/// Replace NaN/inf with `replacement`. Returns how many values were replaced.
pub fn scrub_non_finite(field: &mut Array2<f32>, replacement: f32) -> usize {
    let mut replaced = 0;
    field.iter_mut().filter(|v| !v.is_finite()).for_each(|v| {
        *v = replacement;
        replaced += 1;
    });
    replaced
}

/// Median of the finite values, `None` if there are none.
pub fn finite_median(field: &Array2<f32>) -> Option<f32> {
    let mut vals: Vec<f32> = field.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.is_empty() {
        return None;
    }
    let mid = vals.len() / 2;
    let (_, m, _) = vals.select_nth_unstable_by(mid, f32::total_cmp);
    Some(*m)
}

/// Min and max over finite values.
pub fn finite_min_max(field: &Array2<f32>) -> Option<(f32, f32)> {
    field
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((mn, mx)) => Some((mn.min(v), mx.max(v))),
        })
}

/// Scrub non-finite values with the median, then stretch to [0, 1].
/// A constant field becomes all zeros.
pub fn normalize(field: &mut Array2<f32>) {
    let median = finite_median(field).unwrap_or(0.0);
    scrub_non_finite(field, median);

    let Some((mn, mx)) = finite_min_max(field) else { return };
    let range = mx - mn;
    if range > 1e-8 {
        field.mapv_inplace(|v| ((v - mn) / range).clamp(0.0, 1.0));
    } else {
        field.fill(0.0);
    }
}

/// Mean and population standard deviation of an iterator of samples.
pub fn mean_std<I: IntoIterator<Item = f32>>(values: I) -> (f32, f32) {
    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
    for v in values {
        n += 1;
        sum += v as f64;
        sum_sq += (v as f64) * (v as f64);
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean as f32, var.sqrt() as f32)
}

/// Fill a field row by row. Rows never read each other, so the parallel
/// build matches the serial one exactly.
pub(crate) fn fill_rows<F>(field: &mut Array2<f32>, row: F)
where
    F: Fn(usize, ArrayViewMut1<f32>) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use ndarray::parallel::prelude::*;
        field
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(y, r)| row(y, r));
    }
    #[cfg(not(feature = "parallel"))]
    {
        field.axis_iter_mut(Axis(0)).enumerate().for_each(|(y, r)| row(y, r));
    }
}
