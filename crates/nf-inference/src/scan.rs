//! Parameter scans: fix one or more parameters on a grid and fit (or just
//! score) the rest at every point.

use crate::analysis::{Analysis, Counter};
use crate::sink::write_json_atomic;
use nf_core::{DistributionMaker, Error, FitResult, MapSet, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// Grid values of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanValues {
    /// Evenly spaced points over each parameter's range, endpoints included.
    /// A single count applies to every parameter.
    Steps(Vec<usize>),
    /// One value for every scanned parameter.
    Scalar(f64),
    /// Values of the only scanned parameter.
    Flat(Vec<f64>),
    /// One list of values per scanned parameter.
    Nested(Vec<Vec<f64>>),
}

/// How much of each point's record is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDetail {
    /// Metric values and parameters only.
    Minimal,
    /// Everything except the fit history.
    #[default]
    Normal,
    /// Everything.
    Full,
}

/// Scan configuration. Values are in each parameter's own units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Parameters to scan, in grid order.
    pub param_names: Vec<String>,
    /// Grid values.
    pub values: ScanValues,
    /// Outer product of the per-parameter lists; otherwise they are zipped.
    #[serde(default = "default_true")]
    pub outer: bool,
    /// Grid point indices to run; all points when absent.
    #[serde(default)]
    pub only_points: Option<Vec<usize>>,
    /// Fit the remaining free parameters at every point.
    #[serde(default = "default_true")]
    pub profile: bool,
    /// Selection labels applied before scanning.
    #[serde(default)]
    pub param_selections: Vec<String>,
    /// Retained detail per point.
    #[serde(default)]
    pub detail: ScanDetail,
    /// File rewritten after every point.
    #[serde(default)]
    pub outfile: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl ScanSettings {
    /// Profiled outer-product scan of `param_names` over `values`.
    pub fn new(param_names: Vec<String>, values: ScanValues) -> Self {
        Self {
            param_names,
            values,
            outer: true,
            only_points: None,
            profile: true,
            param_selections: Vec::new(),
            detail: ScanDetail::default(),
            outfile: None,
        }
    }
}

/// Scan output: the value of every scanned parameter and the record at each point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    /// Parameter name to its value at each point, aligned with `results`.
    pub steps: BTreeMap<String, Vec<f64>>,
    /// One record per point.
    pub results: Vec<FitResult>,
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => (0..n)
            .map(|i| if i + 1 == n { hi } else { lo + (hi - lo) * i as f64 / (n - 1) as f64 })
            .collect(),
    }
}

/// Per-parameter value lists.
fn axis_values(settings: &ScanSettings, ranges: &[Option<(f64, f64)>]) -> Result<Vec<Vec<f64>>> {
    let n = settings.param_names.len();
    let lists = match &settings.values {
        ScanValues::Steps(steps) => {
            let steps: Vec<usize> = match steps.len() {
                1 => vec![steps[0]; n],
                len if len == n => steps.clone(),
                len => {
                    return Err(Error::Configuration(format!(
                        "{len} step counts for {n} scanned parameters"
                    )));
                }
            };
            settings
                .param_names
                .iter()
                .zip(ranges)
                .zip(steps)
                .map(|((name, range), s)| {
                    let (lo, hi) = range.ok_or_else(|| {
                        Error::Configuration(format!("cannot derive scan steps for '{name}' without a range"))
                    })?;
                    if s == 0 {
                        return Err(Error::Configuration(format!("zero scan steps for '{name}'")));
                    }
                    Ok(linspace(lo, hi, s))
                })
                .collect::<Result<Vec<_>>>()?
        }
        ScanValues::Scalar(v) => vec![vec![*v]; n],
        ScanValues::Flat(values) => {
            if n != 1 {
                return Err(Error::Configuration(format!(
                    "a flat value list scans one parameter, got {n}"
                )));
            }
            vec![values.clone()]
        }
        ScanValues::Nested(lists) => {
            if lists.len() != n {
                return Err(Error::Configuration(format!(
                    "{} value lists for {n} scanned parameters",
                    lists.len()
                )));
            }
            lists.clone()
        }
    };
    if lists.iter().any(Vec::is_empty) {
        return Err(Error::Configuration("empty scan value list".into()));
    }
    Ok(lists)
}

/// Grid points, each holding one value per scanned parameter.
fn grid_points(lists: &[Vec<f64>], outer: bool) -> Result<Vec<Vec<f64>>> {
    if outer {
        let mut points: Vec<Vec<f64>> = vec![Vec::new()];
        for list in lists {
            points = points
                .iter()
                .flat_map(|p| {
                    list.iter().map(move |&v| {
                        let mut q = p.clone();
                        q.push(v);
                        q
                    })
                })
                .collect();
        }
        Ok(points)
    } else {
        let len = lists.first().map_or(0, Vec::len);
        if lists.iter().any(|l| l.len() != len) {
            return Err(Error::Configuration(
                "zipped scan needs value lists of equal length".into(),
            ));
        }
        Ok((0..len).map(|i| lists.iter().map(|l| l[i]).collect()).collect())
    }
}

fn trim(fit: &mut FitResult, detail: ScanDetail) {
    match detail {
        ScanDetail::Full => {}
        ScanDetail::Normal => fit.fit_history = None,
        ScanDetail::Minimal => {
            fit.fit_history = None;
            fit.hypo_asimov_dist = None;
            if let Some(meta) = fit.minimizer_metadata.as_mut() {
                meta.strip_derivatives();
            }
            for info in fit.detailed_metric_info.values_mut() {
                info.maps_binned = MapSet::default();
            }
        }
    }
}

impl Analysis {
    /// Scan `settings.param_names` over their grid against `data`.
    ///
    /// Scanned parameters are fixed for the duration of the scan and freed
    /// again afterwards if they were free before. The first failing point
    /// aborts the scan; points already written to the outfile are kept.
    pub fn scan<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        settings: &ScanSettings,
        counter: &mut Counter,
    ) -> Result<ScanResults> {
        if settings.param_names.is_empty() {
            return Err(Error::Configuration("no parameters to scan".into()));
        }
        maker.select_params(&settings.param_selections)?;

        let mut ranges = Vec::with_capacity(settings.param_names.len());
        for name in &settings.param_names {
            let p = maker
                .params()
                .get(name)
                .ok_or_else(|| Error::Configuration(format!("no parameter '{name}' to scan")))?;
            ranges.push(p.range);
        }
        let lists = axis_values(settings, &ranges)?;
        let points = grid_points(&lists, settings.outer)?;
        let selected: Vec<usize> = match &settings.only_points {
            None => (0..points.len()).collect(),
            Some(ind) => {
                if let Some(bad) = ind.iter().find(|&&i| i >= points.len()) {
                    return Err(Error::Configuration(format!(
                        "scan point {bad} out of range for {} points",
                        points.len()
                    )));
                }
                ind.clone()
            }
        };

        let was_free: Vec<String> =
            settings.param_names.iter().filter(|n| maker.params().is_free(n)).cloned().collect();
        maker.params_mut().fix(&settings.param_names)?;

        let outcome = self.scan_points(data, maker, settings, &points, &selected, counter);

        maker.params_mut().unfix(&was_free)?;
        outcome
    }

    fn scan_points<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        settings: &ScanSettings,
        points: &[Vec<f64>],
        selected: &[usize],
        counter: &mut Counter,
    ) -> Result<ScanResults> {
        let mut results = ScanResults::default();
        for name in &settings.param_names {
            results.steps.insert(name.clone(), Vec::with_capacity(selected.len()));
        }

        let start = Instant::now();
        for (done, &i) in selected.iter().enumerate() {
            let point = &points[i];
            for (name, &v) in settings.param_names.iter().zip(point) {
                maker.params_mut().set_value(name, v)?;
            }

            let mut fit = if settings.profile && maker.params().n_free() > 0 {
                self.fit_hypo(data, maker, &settings.param_selections, counter)?.best_fit_info
            } else {
                log::info!("Not optimizing at scan point {i}: profiling disabled or no free parameters");
                maker.reset_free();
                let asimov = maker
                    .get_outputs(true)
                    .map_err(|e| Error::model_evaluation("get_outputs", e))?;
                counter.increment();
                self.nofit_hypo(data, maker.params(), &asimov)?
            };
            trim(&mut fit, settings.detail);

            for (name, &v) in settings.param_names.iter().zip(point) {
                if let Some(steps) = results.steps.get_mut(name) {
                    steps.push(v);
                }
            }
            results.results.push(fit);

            if let Some(path) = &settings.outfile {
                write_json_atomic(path, &results)?;
            }
            log::info!(
                "scan point {}/{} done; elapsed {:.1} s",
                done + 1,
                selected.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Ok(results)
    }
}
