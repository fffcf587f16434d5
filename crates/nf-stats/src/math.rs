//! Small numerically-stable helpers shared by the metrics.

use statrs::function::gamma::ln_gamma;

/// Floor applied to expectations before logs and divisions.
pub const SMALL_POS: f64 = 1e-10;

/// Below this absolute difference in every bin, chi-square returns zeros.
pub const CHI2_CANCELLATION: f64 = 5.0 * f64::EPSILON;

/// Natural log of `sqrt(2π)`.
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// `x * ln(x)` with the `0 * ln(0) = 0` convention.
#[inline]
pub fn xlogx(x: f64) -> f64 {
    if x > 0.0 { x * x.ln() } else { 0.0 }
}

/// `k * ln(lambda)` with the `0 * ln(anything) = 0` convention.
#[inline]
pub fn xlogy(k: f64, lambda: f64) -> f64 {
    if k == 0.0 { 0.0 } else { k * lambda.ln() }
}

/// Log of the Poisson pmf, continued to real `k` through `ln Γ(k + 1)`.
#[inline]
pub fn log_poisson(k: f64, lambda: f64) -> f64 {
    xlogy(k, lambda) - lambda - ln_gamma(k + 1.0)
}

/// Log-PDF of a centred normal of width `sigma` at `x`.
#[inline]
pub fn log_gauss(x: f64, sigma: f64) -> f64 {
    let z = x / sigma;
    -0.5 * z * z - sigma.ln() - LN_SQRT_2PI
}

/// `ln(exp(a) + exp(b))`.
#[inline]
pub fn logaddexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}
