//! Poisson-family per-bin log-likelihoods.
//!
//! Every function scores one bin: `k` observed counts against expectation
//! `lambda` with Monte-Carlo uncertainty `sigma`. Inputs are assumed validated
//! (finite, non-negative) by the caller.

use crate::math::{log_gauss, log_poisson, xlogx, xlogy, SMALL_POS};
use statrs::function::gamma::ln_gamma;

/// Half-width of the smearing grid in units of sigma.
const CONV_NSIGMA: f64 = 3.0;
/// Grid points on each side of the centre.
const CONV_STEPS: usize = 50;

/// Poisson llh normalised to the saturated model; 0 when `lambda == k`.
#[inline]
pub fn llh(k: f64, lambda: f64) -> f64 {
    let lambda = lambda.max(SMALL_POS);
    (xlogy(k, lambda) - lambda) - (xlogx(k) - k)
}

/// Poisson pmf at `k` with its mean smeared by a Gaussian of width `sigma`.
fn conv_poisson(k: f64, lambda: f64, sigma: f64) -> f64 {
    let lambda = lambda.max(SMALL_POS);
    let n = 2 * CONV_STEPS + 1;
    let step = 2.0 * CONV_NSIGMA * sigma / n as f64;

    let mut num = 0.0;
    let mut norm = 0.0;
    for i in 0..n {
        let x = (i as f64 - CONV_STEPS as f64) * step;
        let w = log_gauss(x, sigma).exp();
        norm += w;
        let mean = x + lambda;
        if mean > 0.0 {
            num += (log_gauss(x, sigma) + log_poisson(k, mean)).exp();
        }
    }
    if norm > 0.0 { num / norm } else { 0.0 }
}

/// Convolved pmf rescaled so the Asimov value `P(lambda; lambda)` is unchanged.
fn norm_conv_poisson(k: f64, lambda: f64, sigma: f64) -> f64 {
    let asimov = log_poisson(lambda, lambda.max(SMALL_POS)).exp();
    let asimov_conv = conv_poisson(lambda, lambda, sigma);
    if asimov_conv <= 0.0 {
        return 0.0;
    }
    conv_poisson(k, lambda, sigma) * asimov / asimov_conv
}

/// Gaussian-convolved Poisson llh, normalised against `lambda == k`.
pub fn conv_llh(k: f64, lambda: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return llh(k, lambda);
    }
    norm_conv_poisson(k, lambda, sigma).max(SMALL_POS).ln()
        - norm_conv_poisson(k, k, sigma).max(SMALL_POS).ln()
}

/// Barlow-Beeston llh for one MC source, profiled over the true MC mean.
///
/// With effective MC count `a = (lambda/sigma)^2` and weight `w = sigma^2/lambda`,
/// the profiled source strength is `(k + a) / (1 + w)`. Both Poisson terms are
/// normalised to their saturated values.
pub fn barlow_llh(k: f64, lambda: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 || lambda <= 0.0 {
        return llh(k, lambda);
    }
    let a = (lambda / sigma).powi(2);
    let w = sigma * sigma / lambda;
    let a_hat = ((k + a) / (1.0 + w)).max(SMALL_POS);
    let mu = w * a_hat;
    let data = xlogy(k, mu) - mu - (xlogx(k) - k);
    let mc = xlogy(a, a_hat) - a_hat - (xlogx(a) - a);
    data + mc
}

/// Poisson-gamma llh; `a = 0` is the mean variant, `a = 1` the effective one.
pub fn poisson_gamma(k: f64, lambda: f64, sigma: f64, a: f64) -> f64 {
    if sigma <= 0.0 || lambda <= 0.0 {
        return log_poisson(k, lambda.max(SMALL_POS));
    }
    let var = sigma * sigma;
    let alpha = lambda * lambda / var + a;
    let beta = lambda / var;
    alpha * beta.ln() + ln_gamma(k + alpha)
        - ln_gamma(k + 1.0)
        - (k + alpha) * beta.ln_1p()
        - ln_gamma(alpha)
}

/// Poisson-gamma "L_Mean".
pub fn mcllh_mean(k: f64, lambda: f64, sigma: f64) -> f64 {
    poisson_gamma(k, lambda, sigma, 0.0)
}

/// Poisson-gamma "L_Eff".
pub fn mcllh_eff(k: f64, lambda: f64, sigma: f64) -> f64 {
    poisson_gamma(k, lambda, sigma, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_llh_saturated_is_zero() {
        assert_abs_diff_eq!(llh(12.0, 12.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(llh(0.0, 0.0), 0.0, epsilon = 1e-9);
        assert!(llh(12.0, 10.0) < 0.0);
    }

    #[test]
    fn test_conv_llh_zero_at_asimov_and_falls_back() {
        assert_abs_diff_eq!(conv_llh(20.0, 20.0, 3.0), 0.0, epsilon = 1e-12);
        assert!(conv_llh(20.0, 12.0, 3.0) < 0.0);
        assert_abs_diff_eq!(conv_llh(5.0, 7.0, 0.0), llh(5.0, 7.0), epsilon = 1e-15);
    }

    #[test]
    fn test_conv_llh_is_wider_than_poisson() {
        // smearing the mean makes a given excursion less unlikely
        assert!(conv_llh(20.0, 12.0, 4.0) > llh(20.0, 12.0));
    }

    #[test]
    fn test_barlow_zero_at_truth_and_below_elsewhere() {
        assert_abs_diff_eq!(barlow_llh(9.0, 9.0, 1.5), 0.0, epsilon = 1e-9);
        assert!(barlow_llh(9.0, 5.0, 1.5) < 0.0);
        assert!(barlow_llh(9.0, 5.0, 1.5) > llh(9.0, 5.0));
        assert_abs_diff_eq!(barlow_llh(4.0, 6.0, 0.0), llh(4.0, 6.0), epsilon = 1e-15);
    }

    #[test]
    fn test_poisson_gamma_approaches_poisson_for_small_sigma() {
        let pg = mcllh_mean(7.0, 5.0, 1e-2);
        assert_abs_diff_eq!(pg, log_poisson(7.0, 5.0), epsilon = 1e-3);
        assert!(mcllh_eff(7.0, 5.0, 1.0).is_finite());
    }
}
