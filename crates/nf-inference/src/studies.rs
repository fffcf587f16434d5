//! Asimov sensitivity studies on top of the hypothesis-test loop.
//!
//! Each study changes the data model or the hypotheses in a controlled way,
//! runs one unfluctuated data trial and puts the makers back. Records of a
//! study live below their own key prefix, e.g.
//! `inj_theta23_42.0000/data_0/h0_fit_to_data`.
//!
//! - injected-parameter scan: the data is generated at each of a list of values
//! - N-1 test: one systematic is fixed at baseline in both hypotheses
//! - systematically wrong injection: the data carries a shifted systematic
//! - hypothesis scan: the h0 model is scanned against each data trial

use crate::hypo_testing::{DataTrial, HypoTesting};
use crate::scan::{ScanResults, ScanSettings};
use crate::sink::FitSink;
use nf_core::{DistributionMaker, Error, Param, Prior, Result};
use serde::{Deserialize, Serialize};

/// Llh drop that marks one standard deviation on a tabulated prior.
const ONE_SIGMA_DLLH: f64 = 0.5;

/// One point of an injected-parameter scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedPoint {
    /// Value injected into every model.
    pub value: f64,
    /// Hypothesis test at that value.
    pub trial: DataTrial,
}

/// Side of a systematically wrong injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    /// Above the baseline value.
    Up,
    /// Below the baseline value.
    Down,
}

impl ShiftDirection {
    fn label(self) -> &'static str {
        match self {
            ShiftDirection::Up => "up",
            ShiftDirection::Down => "down",
        }
    }
}

/// Which systematic tests to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystTestSettings {
    /// Inject shifted values instead of running N-1 tests.
    pub inject_wrong: bool,
    /// Let the hypotheses fit the shifted systematic; otherwise it is fixed at baseline.
    pub fit_wrong: bool,
    /// Restrict the tests to these data-model parameters.
    pub only_syst: Option<Vec<String>>,
    /// Run the unmodified test first.
    pub do_baseline: bool,
}

impl Default for SystTestSettings {
    fn default() -> Self {
        Self { inject_wrong: false, fit_wrong: false, only_syst: None, do_baseline: true }
    }
}

/// Outcome of one systematic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystTest {
    /// Tested parameter.
    pub param: String,
    /// Shift of a wrong injection; `None` for an N-1 test.
    pub direction: Option<ShiftDirection>,
    /// Value of the parameter in the data model.
    pub injected_value: f64,
    /// Whether the hypotheses held the parameter fixed.
    pub fixed_in_fit: bool,
    /// Hypothesis test under the modification.
    pub trial: DataTrial,
}

/// Baseline plus one entry per test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystTestResults {
    /// Unmodified hypothesis test, if requested.
    pub baseline: Option<DataTrial>,
    /// Tests in data-model parameter order; up before down.
    pub tests: Vec<SystTest>,
}

/// Scan of the h0 model against one data trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypoScanTrial {
    /// Data trial index.
    pub data_ind: u64,
    /// Scan against that trial's data.
    pub scan: ScanResults,
}

/// Value a systematically wrong injection moves `param` to.
///
/// One standard deviation of a Gaussian prior, the one-sigma interval of a
/// tabulated prior, otherwise ten percent of the value (one unit at zero).
/// The result is clamped to the range.
pub fn shifted_value(param: &Param, direction: ShiftDirection) -> f64 {
    let v = param.value();
    let up = direction == ShiftDirection::Up;
    let relative = || match (v == 0.0, up) {
        (true, true) => 1.0,
        (true, false) => -1.0,
        (false, true) => 1.1 * v,
        (false, false) => 0.9 * v,
    };
    let target = match &param.prior {
        Some(Prior::Gaussian { stddev, .. }) => {
            if up {
                v + stddev
            } else {
                v - stddev
            }
        }
        Some(Prior::Spline { knots_x, knots_llh }) => {
            let peak = knots_llh.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let inside: Vec<f64> = knots_x
                .iter()
                .zip(knots_llh)
                .filter(|(_, &llh)| llh >= peak - ONE_SIGMA_DLLH)
                .map(|(&x, _)| x)
                .collect();
            match (inside.first(), inside.last()) {
                (Some(&lo), Some(&hi)) if inside.len() > 1 => {
                    if up {
                        hi
                    } else {
                        lo
                    }
                }
                _ => relative(),
            }
        }
        _ => relative(),
    };
    match param.range {
        Some((lo, hi)) if !(lo..=hi).contains(&target) => {
            let clamped = target.clamp(lo, hi);
            log::warn!(
                "Shifting '{}' to {target} leaves its range [{lo}, {hi}]; using {clamped}",
                param.name
            );
            clamped
        }
        _ => target,
    }
}

impl<M: DistributionMaker, S: FitSink> HypoTesting<M, S> {
    /// Repeat the test with `param` set to each of `values` in every model.
    ///
    /// The value becomes the parameter's nominal value for the duration of
    /// the point, so free copies start their fits there and fixed copies stay
    /// there. Values outside the parameter's range are an error.
    pub fn asimov_inj_param_scan(&mut self, param: &str, values: &[f64]) -> Result<Vec<InjectedPoint>> {
        self.require_asimov("injected-parameter scan")?;
        self.data_param(param)?;

        let mut points = Vec::with_capacity(values.len());
        for &value in values {
            let snapshots = self.inject(param, value)?;
            self.clear_data();
            let outcome = self.run_labelled(format!("inj_{param}_{value:.4}"));
            self.restore(snapshots);
            self.reset_makers();
            self.clear_data();
            points.push(InjectedPoint { value, trial: outcome? });
        }
        Ok(points)
    }

    /// Baseline test followed by one N-1 test, or one up and one down wrong
    /// injection, per free parameter of the data model.
    pub fn asimov_syst_tests(&mut self, syst: &SystTestSettings) -> Result<SystTestResults> {
        self.require_asimov("systematic tests")?;
        let baseline = if syst.do_baseline {
            self.clear_data();
            let outcome = self.run_labelled("full_syst_baseline".into());
            self.reset_makers();
            self.clear_data();
            Some(outcome?)
        } else {
            log::info!("Skipping the baseline systematic test");
            None
        };

        let data_ind = self.data_maker_index()?;
        let selections = self.settings.data_selections().to_vec();
        self.makers[data_ind].select_params(&selections)?;
        let mut names = self.makers[data_ind].params().free_names();
        if let Some(only) = &syst.only_syst {
            for missing in only.iter().filter(|n| !names.contains(n)) {
                log::warn!("'{missing}' is not a free parameter of the data model; no test for it");
            }
            names.retain(|n| only.contains(n));
        }

        let mut tests = Vec::new();
        for name in &names {
            if syst.inject_wrong {
                for direction in [ShiftDirection::Up, ShiftDirection::Down] {
                    log::info!("Injecting {} shifted {}", name, direction.label());
                    tests.push(self.sys_wrong_asimov_test(name, direction, syst.fit_wrong)?);
                }
            } else {
                tests.push(self.asimov_nminusone_test(name)?);
            }
        }
        Ok(SystTestResults { baseline, tests })
    }

    /// Test with `param` fixed at its baseline value in both hypotheses.
    pub fn asimov_nminusone_test(&mut self, param: &str) -> Result<SystTest> {
        self.require_asimov("N-1 test")?;
        let baseline = self.data_param(param)?.value();
        let fixed = self.fix_in_hypos(param)?;
        self.clear_data();
        let outcome = self.run_labelled(format!("fixed_{param}_baseline"));
        let unfixed = self.unfix_in(&fixed, param);
        self.reset_makers();
        self.clear_data();
        unfixed?;
        Ok(SystTest {
            param: param.to_string(),
            direction: None,
            injected_value: baseline,
            fixed_in_fit: true,
            trial: outcome?,
        })
    }

    /// Test against data generated with `param` shifted off its baseline.
    ///
    /// Unless `fit_wrong`, the hypotheses hold the parameter fixed at its
    /// baseline value.
    pub fn sys_wrong_asimov_test(
        &mut self,
        param: &str,
        direction: ShiftDirection,
        fit_wrong: bool,
    ) -> Result<SystTest> {
        self.require_asimov("systematically wrong injection")?;
        let data_ind = self.data_maker_index()?;
        let nominal = self.data_param(param)?;
        let target = shifted_value(&nominal, direction);

        let shifted = {
            let maker = &mut self.makers[data_ind];
            maker.params_mut().set_value(param, target)?;
            let outputs =
                maker.get_outputs(true).map_err(|e| Error::model_evaluation("get_outputs", e));
            maker.params_mut().set_value(param, nominal.value())?;
            outputs?
        };
        self.counter.increment();

        let fixed = if fit_wrong { Vec::new() } else { self.fix_in_hypos(param)? };
        self.data_asimov = Some(shifted);
        self.data_shifted = true;
        let mut prefix = format!("inj_{param}_{}_wrong", direction.label());
        if !fit_wrong {
            prefix.push_str("_fixed");
        }
        let outcome = self.run_labelled(prefix);
        let unfixed = self.unfix_in(&fixed, param);
        self.reset_makers();
        self.clear_data();
        unfixed?;
        Ok(SystTest {
            param: param.to_string(),
            direction: Some(direction),
            injected_value: target,
            fixed_in_fit: !fit_wrong,
            trial: outcome?,
        })
    }

    /// Scan the h0 model against every data trial.
    ///
    /// The scan uses h0's selections unless it names its own. With several
    /// data trials each scan writes its own outfile, `data_<i>_<name>`.
    pub fn hypo_scan(&mut self, scan: &ScanSettings) -> Result<Vec<HypoScanTrial>> {
        if self.analysis.settings().blind {
            return Err(Error::Configuration(
                "a hypothesis scan reports parameter values; unavailable in blind mode".into(),
            ));
        }
        let mut scan = scan.clone();
        if scan.param_selections.is_empty() {
            scan.param_selections = self.settings.h0_param_selections.clone();
        }
        let outfile = scan.outfile.clone();
        let several = self.settings.num_data_trials > 1;

        let mut trials = Vec::with_capacity(self.settings.num_data_trials as usize);
        for data_ind in self.settings.data_indices() {
            let data = self.generate_data(data_ind)?;
            if several {
                scan.outfile = outfile.as_ref().map(|path| {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    path.with_file_name(format!("data_{data_ind}_{name}"))
                });
            }
            log::info!("Scanning h0 against data trial {data_ind}");
            let h0 = self.h0;
            let results = self.analysis.scan(&data, &mut self.makers[h0], &scan, &mut self.counter)?;
            trials.push(HypoScanTrial { data_ind, scan: results });
        }
        Ok(trials)
    }

    fn require_asimov(&self, study: &str) -> Result<()> {
        if self.measured.is_some() || self.settings.fluctuate_data.is_some() {
            return Err(Error::Configuration(format!(
                "the {study} needs unfluctuated data generated by a model"
            )));
        }
        Ok(())
    }

    fn data_maker_index(&self) -> Result<usize> {
        self.data_maker.ok_or_else(|| Error::Configuration("no data model configured".into()))
    }

    /// `param` of the data model at its baseline value.
    fn data_param(&mut self, param: &str) -> Result<Param> {
        let ind = self.data_maker_index()?;
        let selections = self.settings.data_selections().to_vec();
        let maker = &mut self.makers[ind];
        maker.select_params(&selections)?;
        maker.reset_free();
        maker.params().get(param).cloned().ok_or_else(|| {
            Error::Configuration(format!("data model has no parameter '{param}'"))
        })
    }

    /// Distinct makers behind data, h0 and h1.
    fn role_indices(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.data_maker.into_iter().chain([self.h0, self.h1]).collect();
        v.sort_unstable();
        v.dedup();
        v
    }

    fn hypo_indices(&self) -> Vec<usize> {
        if self.h1 == self.h0 { vec![self.h0] } else { vec![self.h0, self.h1] }
    }

    fn reset_makers(&mut self) {
        for ind in self.role_indices() {
            self.makers[ind].reset_free();
        }
    }

    fn clear_data(&mut self) {
        self.data_asimov = None;
        self.data_shifted = false;
    }

    /// One Asimov data trial with every record stored below `prefix`.
    fn run_labelled(&mut self, prefix: String) -> Result<DataTrial> {
        log::info!("Asimov study '{prefix}'");
        self.key_prefix = Some(prefix);
        let outcome = self.run_data_trial(self.settings.data_start_ind);
        self.key_prefix = None;
        outcome
    }

    /// Move `param` and its nominal value to `value` in every model carrying it.
    fn inject(&mut self, param: &str, value: f64) -> Result<Vec<(usize, Param)>> {
        let mut snapshots = Vec::new();
        for ind in self.role_indices() {
            let Some(before) = self.makers[ind].params().get(param).cloned() else {
                continue;
            };
            if let Err(e) = self.makers[ind].params_mut().set_nominal(param, value) {
                self.restore(snapshots);
                return Err(e);
            }
            snapshots.push((ind, before));
        }
        Ok(snapshots)
    }

    fn restore(&mut self, snapshots: Vec<(usize, Param)>) {
        for (ind, before) in snapshots {
            if let Some(p) = self.makers[ind].params_mut().get_mut(&before.name) {
                *p = before;
            }
        }
    }

    /// Fix `param` in each hypothesis where it is free; returns those makers.
    fn fix_in_hypos(&mut self, param: &str) -> Result<Vec<usize>> {
        let mut fixed = Vec::new();
        for ind in self.hypo_indices() {
            let maker = &mut self.makers[ind];
            maker.reset_free();
            if maker.params().is_free(param) {
                maker.params_mut().fix(&[param])?;
                fixed.push(ind);
            }
        }
        Ok(fixed)
    }

    fn unfix_in(&mut self, makers: &[usize], param: &str) -> Result<()> {
        for &ind in makers {
            self.makers[ind].params_mut().unfix(&[param])?;
        }
        Ok(())
    }
}
