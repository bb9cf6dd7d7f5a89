//! # Utilities
//!
//! Shared numeric helpers for faer matrices and scalar traces.

use faer::Mat;
use num_traits::ToPrimitive;

/// Lossy `usize -> f64` conversion saturating at `u32::MAX`.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

/// Row sums of a matrix as a vector of length `nrows`.
#[must_use]
pub fn row_sums(matrix: &Mat<f64>) -> Vec<f64> {
    (0..matrix.nrows())
        .map(|row| (0..matrix.ncols()).map(|col| matrix[(row, col)]).sum())
        .collect()
}

/// Column sums of a matrix as a vector of length `ncols`.
#[must_use]
pub fn column_sums(matrix: &Mat<f64>) -> Vec<f64> {
    (0..matrix.ncols())
        .map(|col| (0..matrix.nrows()).map(|row| matrix[(row, col)]).sum())
        .collect()
}

/// Linear-interpolated quantile of an already sorted slice.
#[must_use]
pub fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let clamped = probability.clamp(0.0, 1.0);
    let last = sorted_values.len() - 1;
    let position = clamped * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// Unbiased sample variance around a precomputed mean; `0` for fewer than two values.
#[must_use]
pub fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values
        .iter()
        .map(|value| {
            let centered = *value - mean;
            centered * centered
        })
        .sum::<f64>()
        / usize_to_f64(values.len() - 1)
}
