//! Pseudo-data generation: reproducible random states and map fluctuation.
//!
//! A random state is a pure function of `(role, data trial, fiducial trial)`,
//! so any single trial can be regenerated without replaying the ones before it.

use nf_core::{Error, Map, MapSet, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

/// Which stage of a hypothesis test a random state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialRole {
    /// Outer loop: the data distribution.
    Data = 0,
    /// Inner loop: the fiducial distributions.
    Fiducial = 1,
}

/// How an Asimov distribution is turned into pseudo-data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluctuationMethod {
    /// Independent Poisson draw per bin.
    Poisson,
    /// Gaussian draw per bin with the map's uncertainty (√λ without one).
    Gauss,
    /// Gaussian smearing of the mean, then a Poisson draw.
    GaussPoisson,
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed derived from the trial indices.
pub fn trial_seed(role: TrialRole, data_ind: u64, fid_ind: u64) -> u64 {
    let mut h = splitmix64(role as u64);
    h = splitmix64(h ^ data_ind);
    splitmix64(h ^ fid_ind)
}

/// Random state for one trial.
pub fn random_state(role: TrialRole, data_ind: u64, fid_ind: u64) -> StdRng {
    StdRng::seed_from_u64(trial_seed(role, data_ind, fid_ind))
}

fn sample_poisson(lambda: f64, rng: &mut StdRng) -> Result<f64> {
    if !lambda.is_finite() || lambda <= 0.0 {
        return Ok(0.0);
    }
    let pois = Poisson::new(lambda)
        .map_err(|e| Error::Validation(format!("Poisson({lambda}): {e}")))?;
    Ok(pois.sample(rng))
}

fn sample_gauss(mean: f64, sigma: f64, rng: &mut StdRng) -> Result<f64> {
    if !mean.is_finite() || mean <= 0.0 {
        return Ok(0.0);
    }
    if !(sigma > 0.0) {
        return Ok(mean);
    }
    let normal = Normal::new(mean, sigma)
        .map_err(|e| Error::Validation(format!("Normal({mean}, {sigma}): {e}")))?;
    Ok(normal.sample(rng).max(0.0))
}

/// Fluctuate one map; the result carries `√counts` errors and no weight samples.
pub fn fluctuate_map(map: &Map, method: FluctuationMethod, rng: &mut StdRng) -> Result<Map> {
    let mut hist = Vec::with_capacity(map.num_bins());
    for (i, &lambda) in map.hist.iter().enumerate() {
        let sigma = map.errors.as_ref().map_or_else(|| lambda.max(0.0).sqrt(), |_| map.error(i));
        let v = match method {
            FluctuationMethod::Poisson => sample_poisson(lambda, rng)?,
            FluctuationMethod::Gauss => sample_gauss(lambda, sigma, rng)?,
            FluctuationMethod::GaussPoisson => {
                let smeared = sample_gauss(lambda, sigma, rng)?;
                sample_poisson(smeared, rng)?
            }
        };
        hist.push(v);
    }
    let errors = hist.iter().map(|v: &f64| v.sqrt()).collect();
    Map::new(map.name.clone(), map.binning.clone(), hist)?.with_errors(errors)
}

/// Fluctuate every map of a set, drawing from one stream in map order.
pub fn fluctuate(maps: &MapSet, method: FluctuationMethod, rng: &mut StdRng) -> Result<MapSet> {
    maps.try_map(|m| fluctuate_map(m, method, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_core::Binning;

    fn asimov() -> MapSet {
        let b = Binning::one_dim("reco_energy", vec![1.0, 2.0, 4.0, 8.0, 16.0]).unwrap();
        MapSet::single(Map::new("total", b, vec![120.0, 80.0, 0.0, 15.5]).unwrap())
    }

    #[test]
    fn test_same_indices_bit_identical() {
        let a = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut random_state(TrialRole::Fiducial, 3, 7))
            .unwrap();
        let b = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut random_state(TrialRole::Fiducial, 3, 7))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_fid_index_differs() {
        let a = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut random_state(TrialRole::Fiducial, 3, 7))
            .unwrap();
        let b = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut random_state(TrialRole::Fiducial, 3, 8))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_roles_do_not_collide() {
        assert_ne!(trial_seed(TrialRole::Data, 0, 0), trial_seed(TrialRole::Fiducial, 0, 0));
        assert_ne!(trial_seed(TrialRole::Data, 1, 0), trial_seed(TrialRole::Data, 0, 1));
    }

    #[test]
    fn test_advancing_stream_decorrelates() {
        let mut rng = random_state(TrialRole::Fiducial, 0, 0);
        let first = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut rng).unwrap();
        let second = fluctuate(&asimov(), FluctuationMethod::Poisson, &mut rng).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_empty_bins_stay_empty_and_errors_are_sqrt() {
        for method in [FluctuationMethod::Poisson, FluctuationMethod::Gauss, FluctuationMethod::GaussPoisson] {
            let out = fluctuate(&asimov(), method, &mut random_state(TrialRole::Data, 0, 0)).unwrap();
            let m = out.get("total").unwrap();
            assert_eq!(m.hist[2], 0.0);
            assert!(m.hist.iter().all(|v| *v >= 0.0));
            assert_eq!(m.error(0), m.hist[0].sqrt());
        }
    }
}
