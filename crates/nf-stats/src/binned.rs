//! Metric evaluation on [`Map`]s and [`MapSet`]s.
//!
//! Maps are paired by name. A `NaN` expected bin means "no prediction" and
//! scores exactly 0; negative values in either map are always an error.

use crate::generalized::{check_weights, generalized_poisson_llh, max_weight};
use crate::{chi2, poisson};
use nf_core::{Error, Map, MapSet, Metric, Result};
use std::collections::BTreeMap;

/// Per-bin mask: `true` where the expected bin carries a prediction.
fn validate(observed: &Map, expected: &Map) -> Result<Vec<bool>> {
    if observed.num_bins() != expected.num_bins() {
        return Err(Error::Validation(format!(
            "observed map '{}' has {} bins, expected map '{}' has {}",
            observed.name,
            observed.num_bins(),
            expected.name,
            expected.num_bins()
        )));
    }
    let mut mask = Vec::with_capacity(observed.num_bins());
    for (i, (&k, &l)) in observed.hist.iter().zip(&expected.hist).enumerate() {
        if k < 0.0 {
            return Err(Error::Validation(format!(
                "observed map '{}' bin {i} must be >= 0, got {k}",
                observed.name
            )));
        }
        if l < 0.0 {
            return Err(Error::Validation(format!(
                "expected map '{}' bin {i} must be >= 0, got {l}",
                expected.name
            )));
        }
        let active = !l.is_nan();
        if active && !k.is_finite() {
            return Err(Error::Validation(format!(
                "observed map '{}' bin {i} must be finite, got {k}",
                observed.name
            )));
        }
        if active && !l.is_finite() {
            return Err(Error::Validation(format!(
                "expected map '{}' bin {i} must be finite or NaN, got {l}",
                expected.name
            )));
        }
        mask.push(active);
    }
    Ok(mask)
}

/// Weight samples of `expected`, one list per bin.
fn weight_samples<'a>(metric: Metric, expected: &'a Map) -> Result<&'a [Vec<f64>]> {
    let samples = expected.weight_samples.as_deref().ok_or_else(|| {
        Error::Validation(format!(
            "metric '{metric}' needs weight samples on expected map '{}'",
            expected.name
        ))
    })?;
    if samples.len() != expected.num_bins() {
        return Err(Error::Validation(format!(
            "expected map '{}' carries weight samples for {} bins, map has {}",
            expected.name,
            samples.len(),
            expected.num_bins()
        )));
    }
    check_weights(samples)?;
    Ok(samples)
}

/// Per-bin scores of `metric` for one pair of maps.
pub fn binned(metric: Metric, observed: &Map, expected: &Map) -> Result<Vec<f64>> {
    let mask = validate(observed, expected)?;
    let samples: &[Vec<f64>] = if metric.needs_weight_samples() {
        weight_samples(metric, expected)?
    } else {
        &[]
    };
    let k = &observed.hist;
    let l = &expected.hist;
    let sigma = |i: usize| expected.error(i);

    let per_bin = |f: &dyn Fn(usize) -> f64| -> Vec<f64> {
        (0..mask.len()).map(|i| if mask[i] { f(i) } else { 0.0 }).collect()
    };

    let scores = match metric {
        Metric::Llh => per_bin(&|i| poisson::llh(k[i], l[i])),
        Metric::ConvLlh => per_bin(&|i| poisson::conv_llh(k[i], l[i], sigma(i))),
        Metric::BarlowLlh => per_bin(&|i| poisson::barlow_llh(k[i], l[i], sigma(i))),
        Metric::McllhMean => per_bin(&|i| poisson::mcllh_mean(k[i], l[i], sigma(i))),
        Metric::McllhEff => per_bin(&|i| poisson::mcllh_eff(k[i], l[i], sigma(i))),
        Metric::ModChi2 => per_bin(&|i| chi2::mod_chi2(k[i], l[i], sigma(i))),
        Metric::Chi2 => {
            let idx: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
            let ko: Vec<f64> = idx.iter().map(|&i| k[i]).collect();
            let le: Vec<f64> = idx.iter().map(|&i| l[i]).collect();
            let mut out = vec![0.0; mask.len()];
            for (&i, v) in idx.iter().zip(chi2::chi2(&ko, &le)) {
                out[i] = v;
            }
            out
        }
        Metric::GeneralizedPoissonLlh => {
            let fill = max_weight(samples);
            per_bin(&|i| generalized_poisson_llh(k[i], &samples[i], fill))
        }
    };
    Ok(scores)
}

fn paired<'a>(observed: &'a MapSet, expected: &'a MapSet) -> Result<Vec<(&'a Map, &'a Map)>> {
    observed
        .iter()
        .map(|o| {
            let e = expected.get(&o.name).ok_or_else(|| {
                Error::Validation(format!(
                    "no expected map named '{}' (expected maps: [{}])",
                    o.name,
                    expected.names().join(", ")
                ))
            })?;
            Ok((o, e))
        })
        .collect()
}

/// Per-bin scores for every named map, as a set of maps sharing the observed binning.
pub fn metric_binned_maps(observed: &MapSet, expected: &MapSet, metric: Metric) -> Result<MapSet> {
    let maps = paired(observed, expected)?
        .into_iter()
        .map(|(o, e)| Map::new(o.name.clone(), o.binning.clone(), binned(metric, o, e)?))
        .collect::<Result<Vec<_>>>()?;
    MapSet::new(maps)
}

/// Summed score per named map.
pub fn metric_per_map(
    observed: &MapSet,
    expected: &MapSet,
    metric: Metric,
) -> Result<BTreeMap<String, f64>> {
    paired(observed, expected)?
        .into_iter()
        .map(|(o, e)| Ok((o.name.clone(), binned(metric, o, e)?.iter().sum())))
        .collect()
}

/// Total score over all maps.
pub fn metric_total(observed: &MapSet, expected: &MapSet, metric: Metric) -> Result<f64> {
    Ok(metric_per_map(observed, expected, metric)?.values().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nf_core::Binning;

    fn map(name: &str, hist: Vec<f64>) -> Map {
        let n = hist.len();
        let edges = (0..=n).map(|i| i as f64).collect();
        Map::new(name, Binning::one_dim("x", edges).unwrap(), hist).unwrap()
    }

    fn with_mc(m: Map) -> Map {
        let errors = m.hist.iter().map(|v| 0.1 * v.abs().max(1.0)).collect();
        let samples = m.hist.iter().map(|v| vec![0.05; (v.max(0.0) / 0.05).round() as usize]).collect();
        m.with_errors(errors).unwrap().with_weight_samples(samples).unwrap()
    }

    #[test]
    fn test_sign_convention_all_metrics() {
        let obs = map("total", vec![12.0, 30.0, 4.0]);
        let same = with_mc(map("total", vec![12.0, 30.0, 4.0]));
        let other = with_mc(map("total", vec![9.0, 36.0, 6.0]));
        for metric in [
            Metric::Llh,
            Metric::ConvLlh,
            Metric::BarlowLlh,
            Metric::Chi2,
            Metric::ModChi2,
        ] {
            let at_obs: f64 = binned(metric, &obs, &same).unwrap().iter().sum();
            let off: f64 = binned(metric, &obs, &other).unwrap().iter().sum();
            assert_abs_diff_eq!(at_obs, 0.0, epsilon = 1e-9);
            assert!(metric.is_better(at_obs, off), "{metric}: {at_obs} vs {off}");
        }
        // Not normalised to the saturated model; only the ordering is fixed.
        for metric in [Metric::McllhMean, Metric::McllhEff, Metric::GeneralizedPoissonLlh] {
            let at_obs: f64 = binned(metric, &obs, &same).unwrap().iter().sum();
            let off: f64 = binned(metric, &obs, &other).unwrap().iter().sum();
            assert!(at_obs.is_finite() && off.is_finite(), "{metric}");
            assert!(metric.is_maximized());
            assert!(metric.is_better(at_obs, off), "{metric}: {at_obs} vs {off}");
        }
    }

    #[test]
    fn test_nan_expected_bin_contributes_zero() {
        let obs = map("total", vec![5.0, 7.0, 3.0]);
        let exp = with_mc(map("total", vec![4.0, f64::NAN, 2.0]));
        for metric in Metric::ALL {
            let v = binned(metric, &obs, &exp).unwrap();
            assert_eq!(v[1], 0.0, "{metric}");
            assert!(v[0].is_finite() && v[2].is_finite(), "{metric}");
        }
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let obs = map("total", vec![5.0, -1.0]);
        let exp = map("total", vec![4.0, 2.0]);
        assert!(matches!(binned(Metric::Llh, &obs, &exp), Err(Error::Validation(_))));
        let obs = map("total", vec![5.0, 1.0]);
        let exp = map("total", vec![4.0, -2.0]);
        assert!(matches!(binned(Metric::Chi2, &obs, &exp), Err(Error::Validation(_))));
        let obs = map("total", vec![f64::INFINITY, 1.0]);
        let exp = map("total", vec![4.0, 2.0]);
        assert!(binned(Metric::Llh, &obs, &exp).is_err());
    }

    #[test]
    fn test_generalized_needs_weight_samples() {
        let obs = map("total", vec![5.0]);
        let exp = map("total", vec![4.0]);
        assert!(matches!(
            binned(Metric::GeneralizedPoissonLlh, &obs, &exp),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_weight_samples_must_cover_every_bin() {
        let obs = map("total", vec![5.0, 3.0]);
        let mut exp = map("total", vec![4.0, 2.0]);
        exp.weight_samples = Some(vec![vec![1.0]]);
        let err = binned(Metric::GeneralizedPoissonLlh, &obs, &exp).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
        assert!(err.to_string().contains("2"), "{err}");

        exp.weight_samples = Some(vec![vec![1.0], vec![0.5, 0.5]]);
        assert!(binned(Metric::GeneralizedPoissonLlh, &obs, &exp).is_ok());
        // other metrics ignore the samples
        exp.weight_samples = Some(vec![vec![1.0]]);
        assert!(binned(Metric::Llh, &obs, &exp).is_ok());
    }

    #[test]
    fn test_totals_match_by_name() {
        let obs = MapSet::new(vec![map("nue", vec![3.0]), map("numu", vec![10.0])]).unwrap();
        let exp = MapSet::new(vec![map("numu", vec![8.0]), map("nue", vec![3.0])]).unwrap();
        let per_map = metric_per_map(&obs, &exp, Metric::Chi2).unwrap();
        assert_abs_diff_eq!(per_map["nue"], 0.0);
        assert_abs_diff_eq!(per_map["numu"], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(metric_total(&obs, &exp, Metric::Chi2).unwrap(), 0.5, epsilon = 1e-12);

        let missing = MapSet::single(map("nue", vec![3.0]));
        assert!(metric_total(&obs, &missing, Metric::Llh).is_err());

        let binned_maps = metric_binned_maps(&obs, &exp, Metric::Chi2).unwrap();
        assert_eq!(binned_maps.names(), vec!["nue", "numu"]);
    }
}
