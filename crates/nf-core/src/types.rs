//! Common data types for NuFit

use crate::map::MapSet;
use crate::metric::Metric;
use crate::params::ParamSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-metric breakdown of a fit's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedMetricInfo {
    /// Metric value per named map.
    pub maps: BTreeMap<String, f64>,
    /// Per-bin metric values, one map per named map.
    pub maps_binned: MapSet,
    /// Prior penalty per parameter carrying a prior.
    pub priors: Vec<(String, f64)>,
}

/// Diagnostics reported by the minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizerMetadata {
    /// Method name, e.g. `l-bfgs-b`.
    pub method: String,
    /// Whether the minimizer reported convergence.
    pub success: bool,
    /// Termination message.
    pub message: String,
    /// Iterations.
    pub nit: u64,
    /// Objective evaluations.
    pub nfev: u64,
    /// Final gradient in rescaled space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jac: Option<Vec<f64>>,
    /// Hessian in rescaled space, row-major.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hess: Option<Vec<Vec<f64>>>,
    /// Inverse Hessian in rescaled space, row-major.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hess_inv: Option<Vec<Vec<f64>>>,
}

impl MinimizerMetadata {
    /// Drop the gradient and curvature information.
    pub fn strip_derivatives(&mut self) {
        self.jac = None;
        self.hess = None;
        self.hess_inv = None;
    }
}

/// Step-by-step trace of a fit: metric value followed by the free values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitHistory {
    /// `[metric name, free param names...]`
    pub header: Vec<String>,
    /// One row per objective evaluation.
    pub rows: Vec<Vec<f64>>,
}

impl FitHistory {
    /// Empty history with the given header.
    pub fn new(metric: Metric, free_names: &[String]) -> Self {
        let mut header = vec![metric.name().to_string()];
        header.extend(free_names.iter().cloned());
        Self { header, rows: Vec::new() }
    }

    /// Number of recorded rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` without rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Record of one fit (or no-fit evaluation) of a hypothesis to data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Metric the fit optimised.
    pub metric: Metric,
    /// Metric value including prior penalties, in the metric's own sense.
    pub metric_val: f64,
    /// Parameter snapshot at the optimum; empty when blinded.
    pub params: ParamSet,
    /// Breakdown for the fit metric and any extra metrics.
    pub detailed_metric_info: BTreeMap<String, DetailedMetricInfo>,
    /// Wall time spent in the minimizer, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimizer_time: Option<f64>,
    /// Number of `get_outputs` calls.
    #[serde(default)]
    pub num_distributions_generated: u64,
    /// Minimizer diagnostics; absent for a no-fit evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimizer_metadata: Option<MinimizerMetadata>,
    /// Per-evaluation trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_history: Option<FitHistory>,
    /// Expected distribution at the optimum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypo_asimov_dist: Option<MapSet>,
}

impl FitResult {
    /// Minimal record for a metric value and parameter snapshot.
    pub fn new(metric: Metric, metric_val: f64, params: ParamSet) -> Self {
        Self {
            metric,
            metric_val,
            params,
            detailed_metric_info: BTreeMap::new(),
            minimizer_time: None,
            num_distributions_generated: 0,
            minimizer_metadata: None,
            fit_history: None,
            hypo_asimov_dist: None,
        }
    }

    /// Blind stripping: no parameter values, no derivatives, no history.
    pub fn redact(&mut self) {
        self.params = ParamSet::default();
        self.fit_history = None;
        if let Some(meta) = self.minimizer_metadata.as_mut() {
            meta.strip_derivatives();
        }
    }

    /// Detailed info of the fit metric itself.
    pub fn main_metric_info(&self) -> Option<&DetailedMetricInfo> {
        self.detailed_metric_info.get(self.metric.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Param;
    use crate::units::Unit;

    fn result() -> FitResult {
        let params =
            ParamSet::new(vec![Param::new("theta23", 45.0, Unit::Degree).with_range(30.0, 60.0)])
                .unwrap();
        let mut r = FitResult::new(Metric::Chi2, 1.5, params);
        r.minimizer_metadata = Some(MinimizerMetadata {
            method: "l-bfgs-b".into(),
            success: true,
            message: "converged".into(),
            nit: 4,
            nfev: 17,
            jac: Some(vec![1e-6]),
            hess: Some(vec![vec![2.0]]),
            hess_inv: Some(vec![vec![0.5]]),
        });
        r.fit_history = Some(FitHistory::new(Metric::Chi2, &["theta23".to_string()]));
        r
    }

    #[test]
    fn test_redact_strips_sensitive_fields() {
        let mut r = result();
        r.redact();
        assert!(r.params.is_empty());
        assert!(r.fit_history.is_none());
        let json = serde_json::to_value(&r).unwrap();
        let meta = json.get("minimizer_metadata").unwrap();
        assert!(meta.get("jac").is_none());
        assert!(meta.get("hess").is_none());
        assert!(meta.get("hess_inv").is_none());
        assert_eq!(json["metric_val"], 1.5);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!(json["metric"], "chi2");
        assert_eq!(json["fit_history"]["header"][0], "chi2");
        assert!(json.get("hypo_asimov_dist").is_none());
        let back: FitResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.params.names(), vec!["theta23"]);
    }
}
