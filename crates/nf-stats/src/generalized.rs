//! Generalized Poisson likelihood built from per-bin weight samples.
//!
//! Each simulated event of weight `w` is a draw from a gamma-distributed rate;
//! events sharing a weight combine into one gamma of shape `m` (multiplicity)
//! and scale `w`. Mixed with a Poisson, each group gives a negative binomial
//! over the observed count. The bin likelihood is the convolution of the
//! groups, evaluated in log space up to the observed count.

use crate::math::logaddexp;
use nf_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// Log negative-binomial pmf for counts `0..=k` of a gamma(m, w)-Poisson mixture.
fn log_neg_binomial(m: f64, w: f64, k: usize) -> Vec<f64> {
    let log_p = -(w.ln_1p()); // ln(1 / (1 + w))
    let log_q = w.ln() - w.ln_1p(); // ln(w / (1 + w))
    let base = m * log_p - ln_gamma(m);
    (0..=k)
        .map(|n| {
            let n = n as f64;
            base + ln_gamma(n + m) - ln_gamma(n + 1.0) + n * log_q
        })
        .collect()
}

/// Log-space discrete convolution truncated at `a.len()`.
fn log_convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    (0..a.len())
        .map(|n| {
            (0..=n).fold(f64::NEG_INFINITY, |acc, j| logaddexp(acc, a[j] + b[n - j]))
        })
        .collect()
}

/// Group weights by exact value: `(weight, multiplicity)`, ascending.
fn weight_groups(weights: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted: Vec<f64> = weights.iter().copied().filter(|w| *w > 0.0).collect();
    sorted.sort_by(f64::total_cmp);
    let mut groups: Vec<(f64, f64)> = Vec::new();
    for w in sorted {
        match groups.last_mut() {
            Some((g, m)) if *g == w => *m += 1.0,
            _ => groups.push((w, 1.0)),
        }
    }
    groups
}

/// Largest positive weight over all bins, used to fill empty bins.
pub fn max_weight(samples: &[Vec<f64>]) -> f64 {
    samples.iter().flatten().copied().filter(|w| w.is_finite()).fold(0.0, f64::max)
}

/// Validate weight samples: finite and non-negative.
pub fn check_weights(samples: &[Vec<f64>]) -> Result<()> {
    if let Some(w) = samples.iter().flatten().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(Error::Validation(format!(
            "weight samples must be finite and >= 0, found {w}"
        )));
    }
    Ok(())
}

/// Generalized Poisson llh of observing `k` given one bin's weights.
///
/// A bin without positive weights is scored with one pseudo-event of weight
/// `empty_fill`; with no usable fill weight it becomes a zero-rate bin.
pub fn generalized_poisson_llh(k: f64, weights: &[f64], empty_fill: f64) -> f64 {
    let k = k.round().max(0.0) as usize;
    let mut groups = weight_groups(weights);
    if groups.is_empty() {
        if empty_fill > 0.0 {
            groups.push((empty_fill, 1.0));
        } else {
            return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
        }
    }

    let mut acc: Option<Vec<f64>> = None;
    for (w, m) in groups {
        let nb = log_neg_binomial(m, w, k);
        acc = Some(match acc {
            None => nb,
            Some(prev) => log_convolve(&prev, &nb),
        });
    }
    acc.and_then(|v| v.last().copied()).unwrap_or(f64::NEG_INFINITY)
}
