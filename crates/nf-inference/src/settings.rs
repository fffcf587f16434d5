//! Minimizer and fit configuration.

use nf_core::{Error, Metric, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance options subject to the machine-epsilon floor.
const TOLERANCE_OPTIONS: [&str; 4] = ["ftol", "gtol", "eps", "fatol"];
/// Below `HARD_EPS_FACTOR * ε` a tolerance is rejected.
const HARD_EPS_FACTOR: f64 = 2.0;
/// Below `WARN_EPS_FACTOR * ε` a tolerance is accepted with a warning.
const WARN_EPS_FACTOR: f64 = 10.0;

/// Bounded minimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MinimizerMethod {
    /// L-BFGS with a central-difference gradient, bounds by projection.
    #[default]
    #[serde(rename = "l-bfgs-b")]
    Lbfgsb,
    /// Derivative-free Nelder-Mead simplex.
    #[serde(rename = "nelder-mead")]
    NelderMead,
}

impl MinimizerMethod {
    /// Method name as it appears in settings and fit records.
    pub fn name(self) -> &'static str {
        match self {
            MinimizerMethod::Lbfgsb => "l-bfgs-b",
            MinimizerMethod::NelderMead => "nelder-mead",
        }
    }

    /// Options every settings block for this method must carry.
    pub fn required_options(self) -> &'static [&'static str] {
        match self {
            MinimizerMethod::Lbfgsb => &["ftol", "gtol", "eps", "maxiter", "maxcor"],
            MinimizerMethod::NelderMead => &["fatol", "initial_step", "maxiter"],
        }
    }

    /// Epsilon-scaled tolerance defaults merged under user options.
    pub fn tolerance_defaults(self) -> BTreeMap<String, f64> {
        let eps = f64::EPSILON;
        let pairs: &[(&str, f64)] = match self {
            MinimizerMethod::Lbfgsb => &[("ftol", 1e7 * eps), ("gtol", 1e10 * eps), ("eps", eps.sqrt())],
            MinimizerMethod::NelderMead => &[("fatol", 1e7 * eps)],
        };
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// Whether the gradient is a symmetric finite difference, so the rescaled
    /// box must be shrunk by the step on both ends.
    pub fn uses_symmetric_gradient(self) -> bool {
        matches!(self, MinimizerMethod::Lbfgsb)
    }
}

/// Minimizer configuration as read from settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerSettings {
    /// Algorithm.
    pub method: MinimizerMethod,
    /// Numeric options; tolerances fall back to epsilon-scaled defaults.
    pub options: BTreeMap<String, f64>,
    /// Compute the Hessian and its inverse at the optimum.
    pub compute_hessian: bool,
}

impl MinimizerSettings {
    /// Settings with every option of `method` populated.
    pub fn for_method(method: MinimizerMethod) -> Self {
        let mut options = method.tolerance_defaults();
        match method {
            MinimizerMethod::Lbfgsb => {
                options.insert("maxiter".into(), 1000.0);
                options.insert("maxcor".into(), 10.0);
            }
            MinimizerMethod::NelderMead => {
                options.insert("maxiter".into(), 2000.0);
                options.insert("initial_step".into(), 0.05);
            }
        }
        Self { method, options, compute_hessian: false }
    }

    /// Set one option.
    pub fn with_option(mut self, name: &str, value: f64) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }

    /// Merge defaults and validate; the result is what the minimizer runs with.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let method = self.method;
        let mut merged = method.tolerance_defaults();
        merged.extend(self.options.iter().map(|(k, v)| (k.clone(), *v)));

        let required = method.required_options();
        let missing: Vec<&str> =
            required.iter().copied().filter(|k| !merged.contains_key(*k)).collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "minimizer '{}' is missing required option(s): {}",
                method.name(),
                missing.join(", ")
            )));
        }
        let excess: Vec<&str> = merged
            .keys()
            .map(String::as_str)
            .filter(|k| !required.contains(k))
            .collect();
        if !excess.is_empty() {
            return Err(Error::Configuration(format!(
                "minimizer '{}' got unknown option(s): {}; allowed: {}",
                method.name(),
                excess.join(", "),
                required.join(", ")
            )));
        }

        for (name, &value) in &merged {
            if !value.is_finite() {
                return Err(Error::Configuration(format!(
                    "minimizer option '{name}' must be finite, got {value}"
                )));
            }
            if TOLERANCE_OPTIONS.contains(&name.as_str()) {
                let eps = f64::EPSILON;
                if value < HARD_EPS_FACTOR * eps {
                    return Err(Error::Configuration(format!(
                        "minimizer option '{name}' = {value:e} is below {HARD_EPS_FACTOR}*EPSILON ({:e})",
                        HARD_EPS_FACTOR * eps
                    )));
                }
                if value < WARN_EPS_FACTOR * eps {
                    log::warn!(
                        "minimizer option '{name}' = {value:e} is within {WARN_EPS_FACTOR}*EPSILON; \
                         convergence may be unreachable"
                    );
                }
            }
        }

        let resolved = ResolvedOptions { method, options: merged };
        if resolved.maxiter() < 1 {
            return Err(Error::Configuration("minimizer option 'maxiter' must be >= 1".into()));
        }
        match method {
            MinimizerMethod::Lbfgsb if resolved.get("maxcor") < 1.0 => {
                return Err(Error::Configuration("minimizer option 'maxcor' must be >= 1".into()));
            }
            MinimizerMethod::NelderMead => {
                let step = resolved.get("initial_step");
                if !(step > 0.0 && step <= 1.0) {
                    return Err(Error::Configuration(format!(
                        "minimizer option 'initial_step' must be in (0, 1], got {step}"
                    )));
                }
            }
            _ => {}
        }
        if method.uses_symmetric_gradient() && resolved.get("eps") >= 0.5 {
            return Err(Error::Configuration(format!(
                "minimizer option 'eps' = {} leaves no interior in the rescaled box",
                resolved.get("eps")
            )));
        }
        Ok(resolved)
    }
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self::for_method(MinimizerMethod::default())
    }
}

/// Validated minimizer options.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    method: MinimizerMethod,
    options: BTreeMap<String, f64>,
}

impl ResolvedOptions {
    /// Algorithm.
    pub fn method(&self) -> MinimizerMethod {
        self.method
    }

    /// Option value; zero for options the method does not carry.
    pub fn get(&self, name: &str) -> f64 {
        self.options.get(name).copied().unwrap_or(0.0)
    }

    /// Iteration cap.
    pub fn maxiter(&self) -> u64 {
        self.get("maxiter").max(0.0) as u64
    }

    /// Finite-difference step in rescaled space (zero for derivative-free methods).
    pub fn step(&self) -> f64 {
        if self.method.uses_symmetric_gradient() { self.get("eps") } else { 0.0 }
    }

    /// Rescaled box `[0, 1]`, shrunk by the gradient step when needed.
    pub fn rescaled_bounds(&self, n: usize) -> Vec<(f64, f64)> {
        let h = self.step();
        vec![(h, 1.0 - h); n]
    }
}

/// Coarse minimization run before the local one; its best end point is the
/// local start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalMinimizerSettings {
    /// Minimizer of the coarse stage.
    pub minimizer: MinimizerSettings,
    /// Number of starts: the regular start followed by points spread over the box.
    pub num_starts: usize,
}

impl Default for GlobalMinimizerSettings {
    fn default() -> Self {
        Self {
            minimizer: MinimizerSettings::for_method(MinimizerMethod::NelderMead)
                .with_option("initial_step", 0.2),
            num_starts: 4,
        }
    }
}

/// Which mixing angle to mirror into its other octant, and about which value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctantSettings {
    /// Name of the mixing-angle parameter.
    pub param: String,
    /// Reflection point, degrees.
    pub inflection_deg: f64,
    /// Distance from the inflection point for a same-octant retry, degrees.
    pub retry_offset_deg: f64,
}

impl Default for OctantSettings {
    fn default() -> Self {
        Self { param: "theta23".into(), inflection_deg: 45.0, retry_offset_deg: 10.0 }
    }
}

/// Analysis-level fit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Metric being optimised.
    pub metric: Metric,
    /// Extra metrics recorded at the optimum.
    pub other_metrics: Vec<Metric>,
    /// Minimizer.
    pub minimizer: MinimizerSettings,
    /// Optional coarse stage ahead of `minimizer`.
    pub global_minimizer: Option<GlobalMinimizerSettings>,
    /// Reset free params to nominal before every inner fit.
    pub reset_free: bool,
    /// Also start from the reflected mixing angle.
    pub check_octant: bool,
    /// Other-octant fit configuration.
    pub octant: OctantSettings,
    /// Fit once per mass ordering.
    pub check_ordering: bool,
    /// Selection labels of the orderings.
    pub ordering_selectors: Vec<String>,
    /// Hide parameter values from logs and records.
    pub blind: bool,
    /// Live single-line progress on stderr.
    pub pprint: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            metric: Metric::Llh,
            other_metrics: Vec::new(),
            minimizer: MinimizerSettings::default(),
            global_minimizer: None,
            reset_free: true,
            check_octant: true,
            octant: OctantSettings::default(),
            check_ordering: false,
            ordering_selectors: vec!["nh".into(), "ih".into()],
            blind: false,
            pprint: false,
        }
    }
}

impl FitSettings {
    /// Settings for `metric` with everything else at its default.
    pub fn with_metric(metric: Metric) -> Self {
        Self { metric, ..Self::default() }
    }

    /// Check the whole block; minimizer options are resolved once here.
    pub fn validate(&self) -> Result<ResolvedOptions> {
        if self.check_ordering && self.ordering_selectors.len() < 2 {
            return Err(Error::Configuration(
                "check_ordering needs at least two ordering selectors".into(),
            ));
        }
        let o = &self.octant;
        if self.check_octant
            && !(o.inflection_deg.is_finite() && o.retry_offset_deg.is_finite() && o.retry_offset_deg > 0.0)
        {
            return Err(Error::Configuration(format!(
                "octant settings need a finite inflection and a positive retry offset, got {} and {}",
                o.inflection_deg, o.retry_offset_deg
            )));
        }
        self.minimizer.resolve()
    }

    /// Resolved options of the coarse stage, if one is configured.
    pub fn validate_global(&self) -> Result<Option<(ResolvedOptions, usize)>> {
        match &self.global_minimizer {
            None => Ok(None),
            Some(g) if g.num_starts == 0 => Err(Error::Configuration(
                "global minimizer needs at least one start".into(),
            )),
            Some(g) => Ok(Some((g.minimizer.resolve()?, g.num_starts))),
        }
    }

    /// The fit metric followed by the extra metrics, without duplicates.
    pub fn all_metrics(&self) -> Vec<Metric> {
        let mut all = vec![self.metric];
        for m in &self.other_metrics {
            if !all.contains(m) {
                all.push(*m);
            }
        }
        all
    }
}
