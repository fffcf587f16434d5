//! Hypothesis fitting: the inner minimizer loop and the outer loop resolving
//! discrete ambiguities (mixing-angle octant, mass ordering).
//!
//! For the duration of one fit call the engine exclusively drives the
//! [`DistributionMaker`]: the minimizer writes rescaled values into its live
//! parameters and regenerates the expectation on every evaluation. Records
//! returned to the caller hold parameter snapshots, never references.

use crate::optimizer::{
    clamp_params, invert_hessian, matrix_rows, GlobalSearch, Minimizer, ObjectiveFunction,
    OptimizationResult,
};
use crate::settings::{FitSettings, ResolvedOptions};
use nf_core::{
    BoundSide, DetailedMetricInfo, DistributionMaker, Error, FitHistory, FitResult, MapSet, Metric,
    MinimizerMetadata, ParamSet, Result, Unit,
};
use nf_stats::{metric_binned_maps, metric_per_map, metric_total};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Instant;

/// Slack when checking start values against the rescaled box.
const START_TOL: f64 = 1e-12;

/// Number of distributions generated; owned by the caller and threaded through fits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    count: u64,
}

impl Counter {
    /// Counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one.
    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// Current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Back to zero.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Whether the reflected start found the other octant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctantOutcome {
    /// The two fits ended on different sides of the inflection point.
    Distinct,
    /// Both fits ended in the same octant; another start is needed.
    SameOctant,
}

/// Outcome of [`Analysis::fit_hypo`].
#[derive(Debug, Clone)]
pub struct HypoFit {
    /// Best fit over all starts and orderings.
    pub best_fit_info: FitResult,
    /// Every other fit that was run.
    pub alternate_fits: Vec<FitResult>,
    /// Parameters at the best fit, kept even when the record is blinded.
    pub best_params: ParamSet,
}

/// The fitting engine.
#[derive(Debug, Clone)]
pub struct Analysis {
    settings: FitSettings,
    options: ResolvedOptions,
    global: Option<GlobalSearch>,
}

impl Analysis {
    /// Engine with validated settings.
    pub fn new(settings: FitSettings) -> Result<Self> {
        let options = settings.validate()?;
        let global = settings.validate_global()?.map(|(o, n)| GlobalSearch::new(o, n));
        Ok(Self { settings, options, global })
    }

    /// Settings in use.
    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    /// Metric value of `expected` against `data` including prior penalties.
    pub fn metric_value(&self, data: &MapSet, expected: &MapSet, params: &ParamSet) -> Result<f64> {
        let metric = self.settings.metric;
        Ok(metric_total(data, expected, metric)? + params.priors_penalty(metric)?)
    }

    fn detailed_metric_info(
        &self,
        data: &MapSet,
        expected: &MapSet,
        params: &ParamSet,
    ) -> Result<BTreeMap<String, DetailedMetricInfo>> {
        self.settings
            .all_metrics()
            .into_iter()
            .map(|m| {
                let info = DetailedMetricInfo {
                    maps: metric_per_map(data, expected, m)?,
                    maps_binned: metric_binned_maps(data, expected, m)?,
                    priors: params.priors_penalties(m)?,
                };
                Ok((m.name().to_string(), info))
            })
            .collect()
    }

    /// Score `data` directly against a known expectation, without minimizing.
    ///
    /// Parameters are recorded as given; nothing is reset.
    pub fn nofit_hypo(
        &self,
        data: &MapSet,
        params: &ParamSet,
        hypo_asimov_dist: &MapSet,
    ) -> Result<FitResult> {
        let metric_val = self.metric_value(data, hypo_asimov_dist, params)?;
        let mut info = FitResult::new(self.settings.metric, metric_val, params.clone());
        info.detailed_metric_info = self.detailed_metric_info(data, hypo_asimov_dist, params)?;
        info.minimizer_time = Some(0.0);
        info.hypo_asimov_dist = Some(hypo_asimov_dist.clone());
        if self.settings.blind {
            info.redact();
        }
        Ok(info)
    }

    /// Starting point in rescaled space, checked against `bounds`.
    fn initial_point(&self, params: &ParamSet, bounds: &[(f64, f64)]) -> Result<Vec<f64>> {
        let mut x0 = params.rescaled_values()?;
        for ((p, x), &(lo, hi)) in params.free().zip(x0.iter_mut()).zip(bounds) {
            let (plo, phi) = p.range.unwrap_or((0.0, 1.0));
            if *x < -START_TOL {
                return Err(Error::OutOfBounds {
                    param: p.name.clone(),
                    side: BoundSide::Below,
                    value: p.value(),
                    bound: plo,
                });
            }
            if *x > 1.0 + START_TOL {
                return Err(Error::OutOfBounds {
                    param: p.name.clone(),
                    side: BoundSide::Above,
                    value: p.value(),
                    bound: phi,
                });
            }
            if *x < lo + START_TOL || *x > hi - START_TOL {
                if self.settings.blind {
                    log::warn!("free parameter '{}' starts at its boundary", p.name);
                } else {
                    log::warn!(
                        "free parameter '{}' starts at its boundary ({} {}); moving inside [{lo}, {hi}] \
                         in rescaled space",
                        p.name,
                        p.value(),
                        p.units.symbol()
                    );
                }
                *x = x.clamp(lo, hi);
            }
        }
        Ok(x0)
    }

    /// One bounded minimization of the metric over the maker's free parameters.
    ///
    /// On success the maker is left at the optimum. With no free parameters the
    /// expectation is generated once and scored directly. In blind mode errors
    /// carry no parameter values.
    pub fn fit_hypo_inner<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        counter: &mut Counter,
    ) -> Result<FitResult> {
        self.minimize_metric(data, maker, counter).map_err(|e| self.redact_error(e))
    }

    fn minimize_metric<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        counter: &mut Counter,
    ) -> Result<FitResult> {
        let metric = self.settings.metric;
        let blind = self.settings.blind;
        let free_names = maker.params().free_names();

        if free_names.is_empty() {
            let asimov = maker
                .get_outputs(true)
                .map_err(|e| Error::model_evaluation("get_outputs", e))?;
            counter.increment();
            let mut info = self.nofit_hypo(data, maker.params(), &asimov)?;
            info.num_distributions_generated = 1;
            return Ok(info);
        }

        let minimizer = Minimizer::new(self.options.clone());
        let bounds = self.options.rescaled_bounds(free_names.len());
        let x0 = self.initial_point(maker.params(), &bounds)?;

        let start_count = counter.count();
        let pprint = self.settings.pprint;
        if pprint && !blind {
            display_header(metric, &free_names);
        }

        let start = Instant::now();
        let objective = FitObjective {
            maker: RefCell::new(&mut *maker),
            counter: RefCell::new(&mut *counter),
            data,
            metric,
            blind,
            pprint,
            recording: Cell::new(true),
            history: RefCell::new(FitHistory::new(metric, &free_names)),
        };
        let outcome = self.run_stages(&minimizer, &objective, &x0, &bounds);
        if pprint {
            eprintln!();
        }
        let (mut result, global_counts) = outcome?;
        if !result.converged {
            return Err(Error::Convergence(result.message.clone()));
        }

        let (hess, hess_inv) = if self.settings.minimizer.compute_hessian {
            // Derivative evaluations are neither history rows nor generated distributions.
            objective.recording.set(false);
            let h = minimizer.hessian(&objective, &result.parameters, &bounds)?;
            let inv = invert_hessian(&h);
            if inv.is_none() {
                log::warn!("Hessian at the optimum could not be inverted");
            }
            (Some(matrix_rows(&h)), inv.as_ref().map(matrix_rows))
        } else {
            (None, None)
        };
        let minimizer_time = start.elapsed().as_secs_f64();
        let history = objective.into_history();

        // Do not rely on the minimizer's last evaluation being the optimum.
        maker.params_mut().set_from_rescaled(&result.parameters)?;
        let asimov =
            maker.get_outputs(true).map_err(|e| Error::model_evaluation("get_outputs", e))?;
        counter.increment();
        let metric_val = self.metric_value(data, &asimov, maker.params())?;

        let generated = counter.count() - start_count;
        log::info!(
            "Total time to optimize: {:8.4} s; # of dists generated: {:6}; avg dist gen time: {:10.4} ms",
            minimizer_time,
            generated,
            minimizer_time * 1000.0 / generated.max(1) as f64
        );

        let mut info = FitResult::new(metric, metric_val, maker.params().clone());
        info.detailed_metric_info = self.detailed_metric_info(data, &asimov, maker.params())?;
        info.minimizer_time = Some(minimizer_time);
        info.num_distributions_generated = generated;
        let method = match &self.global {
            Some(g) => format!("{}+{}", g.options().method().name(), self.options.method().name()),
            None => self.options.method().name().to_string(),
        };
        info.minimizer_metadata = Some(MinimizerMetadata {
            method,
            success: result.converged,
            message: result.message.clone(),
            nit: result.n_iter + global_counts.0,
            nfev: (result.n_fev + global_counts.1) as u64,
            jac: result.jac.take(),
            hess,
            hess_inv,
        });
        info.fit_history = Some(history);
        info.hypo_asimov_dist = Some(asimov);
        if blind {
            info.redact();
        }
        Ok(info)
    }

    /// Local minimization, preceded by the global stage when one is configured.
    /// Returns the local result and the global stage's `(iterations, evaluations)`.
    fn run_stages(
        &self,
        minimizer: &Minimizer,
        objective: &dyn ObjectiveFunction,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<(OptimizationResult, (u64, usize))> {
        let Some(global) = &self.global else {
            return Ok((minimizer.minimize(objective, x0, bounds)?, (0, 0)));
        };
        let global_bounds = global.options().rescaled_bounds(x0.len());
        let coarse = global.search(objective, x0, &global_bounds)?;
        log::debug!("global stage done: {coarse}");
        let start = clamp_params(&coarse.parameters, bounds);
        let local = minimizer.minimize(objective, &start, bounds)?;
        Ok((local, (coarse.n_iter, coarse.n_fev)))
    }

    fn redact_error(&self, e: Error) -> Error {
        if self.settings.blind { e.blinded() } else { e }
    }

    /// Full fit of one hypothesis: the inner fit from the nominal start, the
    /// other-octant start when enabled, and once per mass ordering when enabled.
    pub fn fit_hypo<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        hypo_param_selections: &[String],
        counter: &mut Counter,
    ) -> Result<HypoFit> {
        let s = &self.settings;
        let orderings: Vec<Option<&String>> = if s.check_ordering {
            let fixed = hypo_param_selections
                .iter()
                .any(|l| s.ordering_selectors.iter().any(|o| o.eq_ignore_ascii_case(l)));
            if fixed {
                log::info!("Mass ordering already fixed by the hypothesis selections; fitting once.");
                vec![None]
            } else {
                log::info!("Performing fits in both orderings.");
                s.ordering_selectors.iter().map(Some).collect()
            }
        } else {
            vec![None]
        };

        let mut best: Option<(FitResult, ParamSet)> = None;
        let mut alternate_fits = Vec::new();
        for ordering in orderings {
            let mut selections = hypo_param_selections.to_vec();
            if let Some(o) = ordering {
                selections.push(o.clone());
            }
            maker.select_params(&selections)?;

            let (fit, params, alternates) = self.fit_octants(data, maker, counter)?;
            alternate_fits.extend(alternates);
            best = Some(match best {
                None => (fit, params),
                Some((prev, prev_params)) => {
                    if s.metric.is_better(fit.metric_val, prev.metric_val) {
                        alternate_fits.push(prev);
                        (fit, params)
                    } else {
                        alternate_fits.push(fit);
                        (prev, prev_params)
                    }
                }
            });
        }

        let (best_fit_info, best_params) =
            best.ok_or_else(|| Error::Configuration("no ordering to fit".into()))?;
        Ok(HypoFit { best_fit_info, alternate_fits, best_params })
    }

    fn restore_start<M: DistributionMaker>(
        &self,
        maker: &mut M,
        start: Option<&[(String, f64)]>,
    ) -> Result<()> {
        match start {
            Some(snapshot) => maker.params_mut().restore_free_values(snapshot),
            None => {
                maker.reset_free();
                Ok(())
            }
        }
    }

    /// Inner fit plus, if the mixing angle is free, a second fit from the mirrored angle.
    fn fit_octants<M: DistributionMaker>(
        &self,
        data: &MapSet,
        maker: &mut M,
        counter: &mut Counter,
    ) -> Result<(FitResult, ParamSet, Vec<FitResult>)> {
        let s = &self.settings;
        let start = if s.reset_free {
            maker.reset_free();
            None
        } else {
            Some(maker.params().free_values())
        };

        let first = self.fit_hypo_inner(data, maker, counter)?;
        let first_params = maker.params().clone();
        if !(s.check_octant && first_params.is_free(&s.octant.param)) {
            return Ok((first, first_params, Vec::new()));
        }

        log::debug!("checking other octant of {}", s.octant.param);
        self.restore_start(maker, start.as_deref())?;
        let current = self.angle_deg(maker.params())?;
        self.set_angle_deg(maker, 2.0 * s.octant.inflection_deg - current)?;
        let mut second = self.fit_hypo_inner(data, maker, counter)?;
        let mut second_params = maker.params().clone();

        let mut alternates = Vec::new();
        let old_octant = self.octant_index(&first_params)?;
        if self.octant_outcome(old_octant, &second_params)? == OctantOutcome::SameOctant {
            log::warn!(
                "Checking other octant was NOT successful since both fits have resulted in the same \
                 octant. Fit will be tried again starting at a point further into the opposite octant."
            );
            alternates.push(second);
            self.restore_start(maker, start.as_deref())?;
            let target = if old_octant == 0 {
                s.octant.inflection_deg + s.octant.retry_offset_deg
            } else {
                s.octant.inflection_deg - s.octant.retry_offset_deg
            };
            self.set_angle_deg(maker, target)?;
            second = self.fit_hypo_inner(data, maker, counter)?;
            second_params = maker.params().clone();
            self.octant_index(&second_params)?;
        }

        if s.metric.is_better(second.metric_val, first.metric_val) {
            if !s.blind {
                log::debug!("Accepting other-octant fit");
            }
            alternates.push(first);
            Ok((second, second_params, alternates))
        } else {
            if !s.blind {
                log::debug!("Accepting initial-octant fit");
            }
            alternates.push(second);
            Ok((first, first_params, alternates))
        }
    }

    fn angle_deg(&self, params: &ParamSet) -> Result<f64> {
        let name = &self.settings.octant.param;
        let p = params
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("no octant parameter '{name}'")))?;
        p.value_in(&Unit::Degree)
    }

    /// Octant of the mixing angle: 0 below the inflection point, 1 at or above.
    pub fn octant_index(&self, params: &ParamSet) -> Result<u8> {
        let deg = self.angle_deg(params)?;
        let inflection = self.settings.octant.inflection_deg;
        if !(0.0..=2.0 * inflection).contains(&deg) {
            return Err(Error::Validation(format!(
                "octant of '{}' is undefined outside [0, {}] deg",
                self.settings.octant.param,
                2.0 * inflection
            )));
        }
        Ok(if deg < inflection { 0 } else { 1 })
    }

    fn octant_outcome(&self, old_octant: u8, new_params: &ParamSet) -> Result<OctantOutcome> {
        Ok(if self.octant_index(new_params)? == old_octant {
            OctantOutcome::SameOctant
        } else {
            OctantOutcome::Distinct
        })
    }

    /// Move the mixing angle to `deg`, clamped into its range.
    fn set_angle_deg<M: DistributionMaker>(&self, maker: &mut M, deg: f64) -> Result<()> {
        let name = &self.settings.octant.param;
        let mut p = maker
            .params()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("no octant parameter '{name}'")))?;
        let mut target = deg;
        if let Some((lo, hi)) = p.range {
            let lo_deg = p.units.convert(lo, &Unit::Degree)?;
            let hi_deg = p.units.convert(hi, &Unit::Degree)?;
            if target < lo_deg || target > hi_deg {
                log::warn!("octant start for '{name}' falls outside its range; clamping");
                target = target.clamp(lo_deg, hi_deg);
            }
        }
        p.set_value_in(target, &Unit::Degree)?;
        maker.update_params(&[p])
    }
}

/// Minimizer callable: writes the proposed point into the model, regenerates
/// the expectation and scores it.
struct FitObjective<'a, M: DistributionMaker> {
    maker: RefCell<&'a mut M>,
    counter: RefCell<&'a mut Counter>,
    data: &'a MapSet,
    metric: Metric,
    blind: bool,
    pprint: bool,
    /// Off while differentiating at the optimum.
    recording: Cell<bool>,
    history: RefCell<FitHistory>,
}

impl<M: DistributionMaker> FitObjective<'_, M> {
    fn into_history(self) -> FitHistory {
        self.history.into_inner()
    }

    fn fail(&self, context: &str, params: &ParamSet, e: Error) -> Error {
        if self.blind {
            log::error!("Failed to evaluate the model during minimization ({context}).");
        } else {
            let values: Vec<String> = params
                .iter()
                .map(|p| format!("{}={} {}", p.name, p.value(), p.units.symbol()))
                .collect();
            log::error!(
                "Failed to evaluate the model during minimization ({context}) with params: {}",
                values.join(", ")
            );
        }
        Error::model_evaluation(context, e)
    }
}

impl<M: DistributionMaker> ObjectiveFunction for FitObjective<'_, M> {
    fn eval(&self, x: &[f64]) -> Result<f64> {
        let mut maker = self
            .maker
            .try_borrow_mut()
            .map_err(|_| Error::Validation("re-entrant objective evaluation".into()))?;

        if let Err(e) = maker.params_mut().set_from_rescaled(x) {
            return Err(self.fail("set_from_rescaled", maker.params(), e));
        }
        let expected = match maker.get_outputs(true) {
            Ok(m) => m,
            Err(e) => return Err(self.fail("get_outputs", maker.params(), e)),
        };
        let value = match metric_total(self.data, &expected, self.metric)
            .and_then(|v| Ok(v + maker.params().priors_penalty(self.metric)?))
        {
            Ok(v) => v,
            Err(e) => return Err(self.fail("metric", maker.params(), e)),
        };

        if !self.recording.get() {
            return Ok(self.metric.sign() * value);
        }
        let iteration = {
            let mut counter = self.counter.borrow_mut();
            counter.increment();
            counter.count()
        };

        if !self.blind {
            let mut row = vec![value];
            row.extend(maker.params().free().map(|p| p.value()));
            if self.pprint {
                display_row(iteration, &row);
            } else {
                log::trace!("iter {iteration}: {row:?}");
            }
            self.history.borrow_mut().rows.push(row);
        } else if self.pprint {
            eprint!("\rminimizer iteration: #{iteration:>6}");
            let _ = std::io::stderr().flush();
        }

        Ok(self.metric.sign() * value)
    }
}

fn display_header(metric: Metric, free_names: &[String]) {
    let mut line = format!("{:>8} {:>14}", "iter", metric.name());
    for n in free_names {
        line.push_str(&format!(" {:>14}", truncate(n, 14)));
    }
    eprintln!("{line}");
    eprintln!("{}", "-".repeat(line.len()));
}

fn display_row(iteration: u64, row: &[f64]) {
    let mut line = format!("\r{iteration:>8}");
    for v in row {
        line.push_str(&format!(" {v:>14.6e}"));
    }
    eprint!("{line}");
    let _ = std::io::stderr().flush();
}

fn truncate(s: &str, width: usize) -> &str {
    match s.char_indices().nth(width) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
