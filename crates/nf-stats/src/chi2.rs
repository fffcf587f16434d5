//! Chi-square family per-bin scores.

use crate::math::{CHI2_CANCELLATION, SMALL_POS};

/// Pearson chi-square over bins; both inputs floored at [`SMALL_POS`].
///
/// Returns all zeros when every difference is below [`CHI2_CANCELLATION`].
pub fn chi2(observed: &[f64], expected: &[f64]) -> Vec<f64> {
    let delta: Vec<f64> = observed
        .iter()
        .zip(expected)
        .map(|(&k, &l)| k.max(SMALL_POS) - l.max(SMALL_POS))
        .collect();
    if delta.iter().all(|d| d.abs() < CHI2_CANCELLATION) {
        return vec![0.0; delta.len()];
    }
    delta.iter().zip(expected).map(|(d, &l)| d * d / l.max(SMALL_POS)).collect()
}

/// Chi-square with the expectation's own uncertainty added to the variance.
#[inline]
pub fn mod_chi2(k: f64, lambda: f64, sigma: f64) -> f64 {
    let lambda = lambda.max(SMALL_POS);
    (k - lambda).powi(2) / (sigma * sigma + lambda)
}
