//! Metric identities.
//!
//! The scoring functions themselves live in `nf-stats`; this closed enum is what
//! configuration, parameter priors and fit records refer to.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether larger or smaller metric values describe a better fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricSense {
    /// Log-likelihood family.
    Maximize,
    /// Chi-square family.
    Minimize,
}

/// Goodness-of-fit metric between an observed and an expected distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Poisson log-likelihood, normalised to the saturated model.
    Llh,
    /// Poisson likelihood convolved with a Gaussian of the expectation's uncertainty.
    ConvLlh,
    /// Barlow-Beeston likelihood accounting for finite MC statistics.
    BarlowLlh,
    /// Poisson-gamma likelihood, "L_Mean" variant.
    McllhMean,
    /// Poisson-gamma likelihood, "L_Eff" variant.
    McllhEff,
    /// Generalized Poisson likelihood built from the per-bin weight samples.
    GeneralizedPoissonLlh,
    /// Pearson chi-square.
    Chi2,
    /// Chi-square including the expectation's uncertainty.
    ModChi2,
}

impl Metric {
    /// Every metric, log-likelihoods first.
    pub const ALL: [Metric; 8] = [
        Metric::Llh,
        Metric::ConvLlh,
        Metric::BarlowLlh,
        Metric::McllhMean,
        Metric::McllhEff,
        Metric::GeneralizedPoissonLlh,
        Metric::Chi2,
        Metric::ModChi2,
    ];

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Llh => "llh",
            Metric::ConvLlh => "conv_llh",
            Metric::BarlowLlh => "barlow_llh",
            Metric::McllhMean => "mcllh_mean",
            Metric::McllhEff => "mcllh_eff",
            Metric::GeneralizedPoissonLlh => "generalized_poisson_llh",
            Metric::Chi2 => "chi2",
            Metric::ModChi2 => "mod_chi2",
        }
    }

    /// Optimisation direction.
    pub fn sense(self) -> MetricSense {
        match self {
            Metric::Chi2 | Metric::ModChi2 => MetricSense::Minimize,
            _ => MetricSense::Maximize,
        }
    }

    /// `true` for the log-likelihood family.
    pub fn is_maximized(self) -> bool {
        self.sense() == MetricSense::Maximize
    }

    /// Sign that turns the metric into a quantity to minimize.
    pub fn sign(self) -> f64 {
        if self.is_maximized() { -1.0 } else { 1.0 }
    }

    /// Whether `candidate` is a strictly better value than `reference`.
    pub fn is_better(self, candidate: f64, reference: f64) -> bool {
        match self.sense() {
            MetricSense::Maximize => candidate > reference,
            MetricSense::Minimize => candidate < reference,
        }
    }

    /// Whether the metric needs the per-bin weight samples carried on the expectation.
    pub fn needs_weight_samples(self) -> bool {
        self == Metric::GeneralizedPoissonLlh
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Metric::ALL.iter().copied().find(|m| m.name() == key).ok_or_else(|| {
            let valid: Vec<&str> = Metric::ALL.iter().map(|m| m.name()).collect();
            Error::Configuration(format!(
                "unknown metric '{s}'; valid metrics are: {}",
                valid.join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for m in Metric::ALL {
            assert_eq!(m.name().parse::<Metric>().unwrap(), m);
        }
        assert!(matches!("chi3".parse::<Metric>(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_sense_and_comparison() {
        assert_eq!(Metric::Llh.sign(), -1.0);
        assert_eq!(Metric::ModChi2.sign(), 1.0);
        assert!(Metric::Llh.is_better(-0.5, -1.0));
        assert!(Metric::Chi2.is_better(0.5, 1.0));
        assert!(!Metric::Chi2.is_better(1.0, 1.0));
    }
}
