//! Physical parameters, priors and the ordered parameter set.
//!
//! The minimizer never sees physical values: free parameters are mapped
//! linearly from their range onto `[0, 1]` via [`ParamSet::rescaled_values`]
//! and written back with [`ParamSet::set_from_rescaled`]. Both walk the free
//! parameters in insertion order, which is what ties element `i` of the
//! minimizer vector to one physical parameter for the duration of a fit.

use crate::error::BoundSide;
use crate::metric::Metric;
use crate::units::Unit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Relative slack used when checking a value against its range.
const RANGE_REL_TOL: f64 = 1e-12;

/// Prior knowledge on a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prior {
    /// Flat prior; contributes nothing.
    Uniform,
    /// Gaussian prior in the parameter's own unit.
    Gaussian {
        /// Centre.
        mean: f64,
        /// Width, > 0.
        stddev: f64,
    },
    /// Tabulated log-likelihood, interpolated with a natural cubic spline.
    Spline {
        /// Knot positions, strictly increasing.
        knots_x: Vec<f64>,
        /// Log-likelihood at each knot.
        knots_llh: Vec<f64>,
    },
}

impl Prior {
    /// Gaussian prior; `stddev` must be finite and positive.
    pub fn gaussian(mean: f64, stddev: f64) -> Result<Self> {
        if !stddev.is_finite() || stddev <= 0.0 || !mean.is_finite() {
            return Err(Error::Configuration(format!(
                "gaussian prior needs finite mean and stddev > 0, got mean={mean}, stddev={stddev}"
            )));
        }
        Ok(Prior::Gaussian { mean, stddev })
    }

    /// Spline prior through `(x, llh)` knots.
    pub fn spline(knots_x: Vec<f64>, knots_llh: Vec<f64>) -> Result<Self> {
        let p = Prior::Spline { knots_x, knots_llh };
        p.validate()?;
        Ok(p)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Prior::Uniform => Ok(()),
            Prior::Gaussian { mean, stddev } => Prior::gaussian(*mean, *stddev).map(|_| ()),
            Prior::Spline { knots_x, knots_llh } => {
                if knots_x.len() < 2 || knots_x.len() != knots_llh.len() {
                    return Err(Error::Configuration(format!(
                        "spline prior needs >= 2 knots with matching llh values, got {} and {}",
                        knots_x.len(),
                        knots_llh.len()
                    )));
                }
                if knots_x.windows(2).any(|w| !(w[1] > w[0])) {
                    return Err(Error::Configuration(
                        "spline prior knots must be strictly increasing".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Log-likelihood contribution at `x`.
    pub fn llh(&self, x: f64) -> Result<f64> {
        match self {
            Prior::Uniform => Ok(0.0),
            Prior::Gaussian { mean, stddev } => {
                let z = (x - mean) / stddev;
                Ok(-0.5 * z * z)
            }
            Prior::Spline { knots_x, knots_llh } => {
                self.validate()?;
                Ok(natural_cubic_spline(knots_x, knots_llh, x))
            }
        }
    }

    /// Chi-square contribution at `x` (`-2 * llh`).
    pub fn chi2(&self, x: f64) -> Result<f64> {
        Ok(-2.0 * self.llh(x)?)
    }

    /// Penalty in the units of `metric`.
    pub fn penalty(&self, x: f64, metric: Metric) -> Result<f64> {
        if metric.is_maximized() { self.llh(x) } else { self.chi2(x) }
    }
}

/// Natural cubic spline through `(xs, ys)`, clamped to the end knots outside the range.
fn natural_cubic_spline(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    let x = x.clamp(xs[0], xs[n - 1]);

    // Second derivatives via the tridiagonal system (Thomas algorithm), M_0 = M_{n-1} = 0.
    let mut m = vec![0.0; n];
    if n > 2 {
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];
        for i in 1..n - 1 {
            let h0 = xs[i] - xs[i - 1];
            let h1 = xs[i + 1] - xs[i];
            let a = h0;
            let b = 2.0 * (h0 + h1);
            let c = h1;
            let d = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
            let denom = b - a * c_prime[i - 1];
            c_prime[i] = c / denom;
            d_prime[i] = (d - a * d_prime[i - 1]) / denom;
        }
        for i in (1..n - 1).rev() {
            m[i] = d_prime[i] - c_prime[i] * m[i + 1];
        }
    }

    let k = xs.partition_point(|&v| v <= x).clamp(1, n - 1);
    let (x0, x1) = (xs[k - 1], xs[k]);
    let h = x1 - x0;
    let a = (x1 - x) / h;
    let b = (x - x0) / h;
    a * ys[k - 1] + b * ys[k] + ((a * a * a - a) * m[k - 1] + (b * b * b - b) * m[k]) * h * h / 6.0
}

/// A named physical parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Unique name within a set.
    pub name: String,
    value: f64,
    /// Unit of `value`, `range` and prior constants.
    #[serde(default)]
    pub units: Unit,
    /// Configuration-time value restored by `reset`.
    pub nominal_value: f64,
    /// Fixed parameters are not varied by the minimizer.
    #[serde(default)]
    pub is_fixed: bool,
    /// Allowed `[low, high]` interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    /// Optional prior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<Prior>,
    /// Identifier shared by identical parameters living in different models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Takes only discrete values; such a parameter can never be free.
    #[serde(default)]
    pub is_discrete: bool,
}

impl Param {
    /// Free, unbounded parameter with no prior; `value` is also the nominal value.
    pub fn new(name: impl Into<String>, value: f64, units: Unit) -> Self {
        Self {
            name: name.into(),
            value,
            units,
            nominal_value: value,
            is_fixed: false,
            range: None,
            prior: None,
            unique_id: None,
            is_discrete: false,
        }
    }

    /// Set the allowed range.
    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.range = Some((low, high));
        self
    }

    /// Set the prior.
    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Mark the parameter fixed.
    pub fn fixed(mut self) -> Self {
        self.is_fixed = true;
        self
    }

    /// Mark the parameter discrete (and therefore fixed).
    pub fn discrete(mut self) -> Self {
        self.is_discrete = true;
        self.is_fixed = true;
        self
    }

    /// Attach a unique id used to synchronise copies across models.
    pub fn with_unique_id(mut self, id: impl Into<String>) -> Self {
        self.unique_id = Some(id.into());
        self
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Current value converted into `unit`.
    pub fn value_in(&self, unit: &Unit) -> Result<f64> {
        self.units.convert(self.value, unit)
    }

    fn range_tol(low: f64, high: f64) -> f64 {
        RANGE_REL_TOL * (high - low).abs().max(1.0)
    }

    /// Check `value` against the range (with a tiny relative slack).
    pub fn check_in_range(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::Validation(format!(
                "parameter '{}' value must be finite, got {value}",
                self.name
            )));
        }
        if let Some((lo, hi)) = self.range {
            let tol = Self::range_tol(lo, hi);
            if value < lo - tol {
                return Err(Error::OutOfBounds {
                    param: self.name.clone(),
                    side: BoundSide::Below,
                    value,
                    bound: lo,
                });
            }
            if value > hi + tol {
                return Err(Error::OutOfBounds {
                    param: self.name.clone(),
                    side: BoundSide::Above,
                    value,
                    bound: hi,
                });
            }
        }
        Ok(())
    }

    /// Set the value, enforcing the range.
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        self.check_in_range(value)?;
        self.value = match self.range {
            Some((lo, hi)) => value.clamp(lo, hi),
            None => value,
        };
        Ok(())
    }

    /// Set the value given in `unit`, converting into the parameter's unit.
    pub fn set_value_in(&mut self, value: f64, unit: &Unit) -> Result<()> {
        let v = unit.convert(value, &self.units)?;
        self.set_value(v)
    }

    /// Restore the nominal value.
    pub fn reset(&mut self) {
        self.value = self.nominal_value;
    }

    fn bounds_for_rescale(&self) -> Result<(f64, f64)> {
        match self.range {
            Some((lo, hi)) if hi > lo => Ok((lo, hi)),
            Some((lo, hi)) => Err(Error::Configuration(format!(
                "parameter '{}' has a degenerate range [{lo}, {hi}]",
                self.name
            ))),
            None => Err(Error::Configuration(format!(
                "free parameter '{}' has no range; cannot rescale for the minimizer",
                self.name
            ))),
        }
    }

    /// Value mapped linearly from the range onto `[0, 1]`.
    pub fn rescaled_value(&self) -> Result<f64> {
        let (lo, hi) = self.bounds_for_rescale()?;
        Ok((self.value - lo) / (hi - lo))
    }

    /// Inverse of [`Param::rescaled_value`].
    pub fn set_rescaled_value(&mut self, x: f64) -> Result<()> {
        let (lo, hi) = self.bounds_for_rescale()?;
        self.set_value(lo + x * (hi - lo))
    }

    /// Prior penalty in the units of `metric`; zero without a prior.
    pub fn prior_penalty(&self, metric: Metric) -> Result<f64> {
        match &self.prior {
            Some(p) => p.penalty(self.value, metric),
            None => Ok(0.0),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some((lo, hi)) = self.range {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(Error::Configuration(format!(
                    "parameter '{}' has invalid range [{lo}, {hi}]",
                    self.name
                )));
            }
        }
        if let Some(p) = &self.prior {
            p.validate()?;
        }
        if self.is_discrete && !self.is_fixed {
            return Err(Error::Configuration(format!(
                "discrete parameter '{}' cannot be free",
                self.name
            )));
        }
        self.check_in_range(self.value)?;
        self.check_in_range(self.nominal_value)
    }
}

/// Ordered collection of uniquely-named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet {
    params: Vec<Param>,
}

impl ParamSet {
    /// Build a set, validating names, ranges, priors and values.
    pub fn new(params: Vec<Param>) -> Result<Self> {
        for (i, p) in params.iter().enumerate() {
            if params[..i].iter().any(|q| q.name == p.name) {
                return Err(Error::Configuration(format!(
                    "duplicate parameter name '{}'",
                    p.name
                )));
            }
            p.validate()?;
        }
        Ok(Self { params })
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// `true` for an empty set (e.g. a blinded record).
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Look up by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// `true` if a parameter called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut Param> {
        self.get_mut(name)
            .ok_or_else(|| Error::Configuration(format!("no parameter named '{name}'")))
    }

    /// Append a parameter.
    pub fn push(&mut self, param: Param) -> Result<()> {
        if self.contains(&param.name) {
            return Err(Error::Configuration(format!(
                "duplicate parameter name '{}'",
                param.name
            )));
        }
        param.validate()?;
        self.params.push(param);
        Ok(())
    }

    /// Free parameters in insertion order.
    pub fn free(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| !p.is_fixed)
    }

    /// Names of the free parameters in insertion order.
    pub fn free_names(&self) -> Vec<String> {
        self.free().map(|p| p.name.clone()).collect()
    }

    /// Number of free parameters.
    pub fn n_free(&self) -> usize {
        self.free().count()
    }

    /// Whether `name` is currently a free parameter.
    pub fn is_free(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| !p.is_fixed)
    }

    /// Fix the named parameters.
    pub fn fix<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for n in names {
            self.require_mut(n.as_ref())?.is_fixed = true;
        }
        Ok(())
    }

    /// Free the named parameters; discrete parameters are refused.
    pub fn unfix<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for n in names {
            if self.get(n.as_ref()).is_some_and(|p| p.is_discrete) {
                return Err(Error::Configuration(format!(
                    "discrete parameter '{}' cannot be free",
                    n.as_ref()
                )));
            }
        }
        for n in names {
            self.require_mut(n.as_ref())?.is_fixed = false;
        }
        Ok(())
    }

    /// Drop the parameter called `name`, if present.
    pub fn remove(&mut self, name: &str) {
        self.params.retain(|p| p.name != name);
    }

    /// Set one parameter's value by name.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        self.require_mut(name)?.set_value(value)
    }

    /// Reset free parameters to their nominal values.
    pub fn reset_free(&mut self) {
        for p in self.params.iter_mut().filter(|p| !p.is_fixed) {
            p.reset();
        }
    }

    /// Move one parameter and its nominal value to `value`, enforcing the range.
    pub fn set_nominal(&mut self, name: &str, value: f64) -> Result<()> {
        let p = self.require_mut(name)?;
        p.set_value(value)?;
        p.nominal_value = p.value;
        Ok(())
    }

    /// Write `param`'s value into the parameter of the same name, and into every
    /// parameter sharing its `unique_id`. The fixed flag is copied as well.
    pub fn update(&mut self, param: &Param) -> Result<()> {
        let target = self.require_mut(&param.name)?;
        if target.is_discrete && !param.is_fixed {
            return Err(Error::Configuration(format!(
                "discrete parameter '{}' cannot be free",
                param.name
            )));
        }
        target.set_value_in(param.value, &param.units)?;
        target.is_fixed = param.is_fixed;
        if let Some(uid) = &param.unique_id {
            for p in self.params.iter_mut() {
                if p.name != param.name && p.unique_id.as_deref() == Some(uid.as_str()) {
                    p.set_value_in(param.value, &param.units)?;
                }
            }
        }
        Ok(())
    }

    /// Snapshot of `(name, value)` for the free parameters.
    pub fn free_values(&self) -> Vec<(String, f64)> {
        self.free().map(|p| (p.name.clone(), p.value)).collect()
    }

    /// Restore a snapshot taken with [`ParamSet::free_values`].
    pub fn restore_free_values(&mut self, snapshot: &[(String, f64)]) -> Result<()> {
        for (name, value) in snapshot {
            self.require_mut(name)?.set_value(*value)?;
        }
        Ok(())
    }

    /// Free-parameter values mapped onto `[0, 1]`, in free order.
    pub fn rescaled_values(&self) -> Result<Vec<f64>> {
        self.free().map(Param::rescaled_value).collect()
    }

    /// Write `[0, 1]` values back into the free parameters, in free order.
    pub fn set_from_rescaled(&mut self, values: &[f64]) -> Result<()> {
        let n_free = self.n_free();
        if values.len() != n_free {
            return Err(Error::Validation(format!(
                "got {} rescaled values for {n_free} free parameters",
                values.len()
            )));
        }
        for (p, &x) in self.params.iter_mut().filter(|p| !p.is_fixed).zip(values) {
            p.set_rescaled_value(x)?;
        }
        Ok(())
    }

    /// Per-parameter prior penalties (parameters without a prior are skipped).
    pub fn priors_penalties(&self, metric: Metric) -> Result<Vec<(String, f64)>> {
        self.params
            .iter()
            .filter(|p| p.prior.is_some())
            .map(|p| Ok((p.name.clone(), p.prior_penalty(metric)?)))
            .collect()
    }

    /// Sum of the prior penalties, in the units of `metric`.
    pub fn priors_penalty(&self, metric: Metric) -> Result<f64> {
        self.params.iter().map(|p| p.prior_penalty(metric)).sum()
    }
}

impl<'a> IntoIterator for &'a ParamSet {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_set() -> ParamSet {
        ParamSet::new(vec![
            Param::new("theta23", 42.0, Unit::Degree).with_range(31.0, 59.0),
            Param::new("livetime", 3.0, Unit::Year).fixed(),
            Param::new("deltam31", 2.5e-3, Unit::ElectronVoltSquared)
                .with_range(1e-3, 5e-3)
                .with_prior(Prior::gaussian(2.5e-3, 1e-4).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_rescale_roundtrip() {
        let mut ps = sample_set();
        let x = ps.rescaled_values().unwrap();
        assert_eq!(x.len(), 2);
        assert_relative_eq!(x[0], 11.0 / 28.0, epsilon = 1e-15);

        for _ in 0..10 {
            let x = ps.rescaled_values().unwrap();
            ps.set_from_rescaled(&x).unwrap();
        }
        assert_relative_eq!(ps.get("theta23").unwrap().value(), 42.0, epsilon = 1e-12);
        assert_relative_eq!(ps.get("deltam31").unwrap().value(), 2.5e-3, epsilon = 1e-15);
    }

    #[test]
    fn test_rescale_order_follows_free_order() {
        let mut ps = sample_set();
        ps.set_from_rescaled(&[0.0, 1.0]).unwrap();
        assert_relative_eq!(ps.get("theta23").unwrap().value(), 31.0);
        assert_relative_eq!(ps.get("deltam31").unwrap().value(), 5e-3);
        assert_eq!(ps.get("livetime").unwrap().value(), 3.0);
    }

    #[test]
    fn test_set_from_rescaled_rejects_wrong_length() {
        let mut ps = sample_set();
        let before = ps.clone();
        assert!(matches!(ps.set_from_rescaled(&[0.5]), Err(Error::Validation(_))));
        assert!(matches!(ps.set_from_rescaled(&[0.5, 0.5, 0.5]), Err(Error::Validation(_))));
        assert_eq!(ps, before);
    }

    #[test]
    fn test_discrete_param_never_free() {
        let mut ps = ParamSet::new(vec![
            Param::new("theta23", 42.0, Unit::Degree).with_range(31.0, 59.0),
            Param::new("ordering", 1.0, Unit::Dimensionless).discrete(),
        ])
        .unwrap();
        assert_eq!(ps.free_names(), vec!["theta23"]);
        assert!(matches!(ps.unfix(&["ordering"]), Err(Error::Configuration(_))));
        assert!(!ps.is_free("ordering"));

        let mut loose = Param::new("ordering", 1.0, Unit::Dimensionless).discrete();
        loose.is_fixed = false;
        assert!(matches!(ps.update(&loose), Err(Error::Configuration(_))));
        assert!(matches!(ParamSet::new(vec![loose]), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_set_nominal_moves_reset_target() {
        let mut ps = sample_set();
        ps.set_nominal("theta23", 50.0).unwrap();
        ps.set_value("theta23", 45.0).unwrap();
        ps.reset_free();
        assert_eq!(ps.get("theta23").unwrap().value(), 50.0);
        assert_eq!(ps.get("theta23").unwrap().nominal_value, 50.0);

        let before = ps.get("theta23").unwrap().clone();
        assert!(matches!(ps.set_nominal("theta23", 500.0), Err(Error::OutOfBounds { .. })));
        assert_eq!(ps.get("theta23").unwrap(), &before);
        assert!(matches!(ps.set_nominal("missing", 1.0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rescale_without_range_is_configuration_error() {
        let ps = ParamSet::new(vec![Param::new("norm", 1.0, Unit::Dimensionless)]).unwrap();
        assert!(matches!(ps.rescaled_values(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_out_of_range_reports_side() {
        let mut ps = sample_set();
        match ps.set_value("theta23", 60.0) {
            Err(Error::OutOfBounds { side: BoundSide::Above, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        match ps.set_value("theta23", 30.0) {
            Err(Error::OutOfBounds { side: BoundSide::Below, .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_gaussian_prior_penalty_sign() {
        let mut ps = sample_set();
        ps.set_value("deltam31", 2.7e-3).unwrap();
        let chi2 = ps.priors_penalty(Metric::Chi2).unwrap();
        let llh = ps.priors_penalty(Metric::Llh).unwrap();
        assert_relative_eq!(chi2, 4.0, epsilon = 1e-9);
        assert_relative_eq!(llh, -2.0, epsilon = 1e-9);
        assert_eq!(ps.priors_penalties(Metric::Chi2).unwrap().len(), 1);
    }

    #[test]
    fn test_spline_prior_interpolates_knots() {
        let p = Prior::spline(vec![0.0, 1.0, 2.0, 3.0], vec![-4.0, -1.0, 0.0, -1.0]).unwrap();
        assert_relative_eq!(p.llh(1.0).unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(p.llh(2.0).unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.llh(-5.0).unwrap(), -4.0, epsilon = 1e-12);
        let mid = p.llh(1.5).unwrap();
        assert!(mid > -1.0 && mid < 0.5, "mid = {mid}");
        assert!(Prior::spline(vec![0.0, 0.0], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_update_syncs_unique_id() {
        let mut ps = ParamSet::new(vec![
            Param::new("aeff_scale_a", 1.0, Unit::Dimensionless)
                .with_range(0.5, 1.5)
                .with_unique_id("aeff_scale"),
            Param::new("aeff_scale_b", 1.0, Unit::Dimensionless)
                .with_range(0.5, 1.5)
                .with_unique_id("aeff_scale"),
        ])
        .unwrap();
        let mut p = ps.get("aeff_scale_a").unwrap().clone();
        p.set_value(1.2).unwrap();
        ps.update(&p).unwrap();
        assert_eq!(ps.get("aeff_scale_b").unwrap().value(), 1.2);
    }

    #[test]
    fn test_free_snapshot_restore() {
        let mut ps = sample_set();
        let snap = ps.free_values();
        ps.set_value("theta23", 50.0).unwrap();
        ps.restore_free_values(&snap).unwrap();
        assert_eq!(ps.get("theta23").unwrap().value(), 42.0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let r = ParamSet::new(vec![
            Param::new("a", 1.0, Unit::Dimensionless),
            Param::new("a", 2.0, Unit::Dimensionless),
        ]);
        assert!(matches!(r, Err(Error::Configuration(_))));
    }
}
