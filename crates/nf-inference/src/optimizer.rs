//! Optimization algorithms
//!
//! Wrappers around argmin solvers working on the rescaled `[0, 1]` box.
//! Objective errors are captured with their type intact and re-raised after
//! the solver stops, so a model failure never turns into a generic message.
//!
//! The objective is only ever evaluated inside the box. Outside it the solver
//! sees a first-order extension from the nearest box point plus a quadratic
//! penalty on the distance, so a step past a bound never lands on a plateau.
//! L-BFGS results are additionally checked for stationarity of the projected
//! gradient and restarted from the projected point when a stop was premature.

use crate::settings::{MinimizerMethod, ResolvedOptions};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DMatrix;
use nf_core::{Error, Result};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Forward step for the Hessian, in rescaled units.
const HESSIAN_STEP: f64 = 1e-4;
/// Weight of the squared distance outside the box.
const OUTSIDE_PENALTY: f64 = 1e4;
/// L-BFGS restarts from the projected point after a non-stationary stop.
const MAX_RESTARTS: usize = 3;
/// A stop whose projected gradient exceeds `STATIONARITY_SLACK * gtol` is not converged.
const STATIONARITY_SLACK: f64 = 1e3;
/// Slack when deciding that a coordinate sits on a bound.
const BOUND_EPS: f64 = 1e-12;

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit point in rescaled space
    pub parameters: Vec<f64>,
    /// Objective value at the best point
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
    /// Gradient at the best point, for gradient-based methods
    pub jac: Option<Vec<f64>>,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function trait for optimization
///
/// No `Sync` bound: the fit objective drives a model through interior mutability.
pub trait ObjectiveFunction {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;
}

/// Central-difference gradient with a fixed step `h`.
pub fn central_gradient(objective: &dyn ObjectiveFunction, params: &[f64], h: f64) -> Result<Vec<f64>> {
    let n = params.len();
    let mut grad = vec![0.0; n];
    let mut shifted = params.to_vec();
    for i in 0..n {
        shifted[i] = params[i] + h;
        let f_plus = objective.eval(&shifted)?;
        shifted[i] = params[i] - h;
        let f_minus = objective.eval(&shifted)?;
        shifted[i] = params[i];
        grad[i] = (f_plus - f_minus) / (2.0 * h);
    }
    Ok(grad)
}

pub(crate) fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Zero the gradient components that point out of the box at an active bound.
fn project_gradient(grad: &mut [f64], x: &[f64], bounds: &[(f64, f64)]) {
    for ((g, &v), &(lo, hi)) in grad.iter_mut().zip(x).zip(bounds) {
        if (v <= lo + BOUND_EPS && *g > 0.0) || (v >= hi - BOUND_EPS && *g < 0.0) {
            *g = 0.0;
        }
    }
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Wrapper to make ObjectiveFunction compatible with argmin
#[derive(Clone, Copy)]
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    step: f64,
    counts: &'a FuncCounts,
    first_error: &'a Mutex<Option<Error>>,
}

impl ArgminProblem<'_> {
    fn capture(&self, e: Error) -> argmin::core::Error {
        let msg = e.to_string();
        if let Ok(mut slot) = self.first_error.lock() {
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        argmin::core::Error::msg(msg)
    }

    /// Nearest box point and the offset of `params` from it.
    fn split(&self, params: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let inside = clamp_params(params, self.bounds);
        let offset = params.iter().zip(&inside).map(|(p, c)| p - c).collect();
        (inside, offset)
    }

    fn extended_cost(&self, params: &[f64]) -> Result<f64> {
        let (inside, offset) = self.split(params);
        let f = self.objective.eval(&inside)?;
        if offset.iter().all(|d| *d == 0.0) {
            return Ok(f);
        }
        let penalty: f64 = OUTSIDE_PENALTY * offset.iter().map(|d| d * d).sum::<f64>();
        if self.step > 0.0 {
            let g = central_gradient(self.objective, &inside, self.step)?;
            let linear: f64 = g.iter().zip(&offset).map(|(g, d)| g * d).sum();
            Ok(f + linear + penalty)
        } else {
            Ok(f + penalty)
        }
    }

    fn extended_gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let (inside, offset) = self.split(params);
        let mut g = central_gradient(self.objective, &inside, self.step)?;
        for (g, d) in g.iter_mut().zip(&offset) {
            *g += 2.0 * OUTSIDE_PENALTY * d;
        }
        Ok(g)
    }

    /// Gradient at `x` (inside the box) with outward components at active bounds removed.
    fn projected_gradient(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut g = central_gradient(self.objective, x, self.step)?;
        project_gradient(&mut g, x, self.bounds);
        Ok(g)
    }
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        self.extended_cost(params).map_err(|e| self.capture(e))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        self.extended_gradient(params).map_err(|e| self.capture(e))
    }
}

/// Bounded minimizer over the rescaled box.
#[derive(Debug, Clone)]
pub struct Minimizer {
    options: ResolvedOptions,
}

impl Minimizer {
    /// Minimizer running with validated options.
    pub fn new(options: ResolvedOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// Minimize `objective` from `init_params` inside `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let init_clamped = clamp_params(init_params, bounds);
        let counts = FuncCounts::default();
        let first_error = Mutex::new(None);
        let problem = ArgminProblem {
            objective,
            bounds,
            step: self.options.step(),
            counts: &counts,
            first_error: &first_error,
        };

        let outcome = match self.options.method() {
            MinimizerMethod::Lbfgsb => self.run_lbfgs(problem, init_clamped),
            MinimizerMethod::NelderMead => self.run_nelder_mead(problem, init_clamped, bounds),
        };

        // An objective failure wins over whatever the solver made of it.
        if let Some(e) = first_error.into_inner().ok().flatten() {
            return Err(e);
        }
        let mut result = outcome?;
        result.parameters = clamp_params(&result.parameters, bounds);
        result.n_fev = counts.cost.load(Ordering::Relaxed);
        result.n_gev = counts.grad.load(Ordering::Relaxed);
        Ok(result)
    }

    fn run_lbfgs(&self, problem: ArgminProblem<'_>, init: Vec<f64>) -> Result<OptimizationResult> {
        let gtol = self.options.get("gtol");
        let mut x = init;
        let mut n_iter = 0;
        let mut restarts = 0;
        loop {
            let (best, fval, iters, termination) = self.lbfgs_once(problem, x)?;
            n_iter += iters;
            x = clamp_params(&best, problem.bounds);
            let solver_converged = is_converged(&termination);
            let jac = problem.projected_gradient(&x)?;
            let norm = max_abs(&jac);

            if solver_converged && norm > gtol && restarts < MAX_RESTARTS {
                restarts += 1;
                log::debug!(
                    "L-BFGS stopped with projected gradient {norm:e} above gtol {gtol:e}; restart {restarts}"
                );
                continue;
            }

            let stationary = norm <= STATIONARITY_SLACK * gtol;
            let message = if solver_converged && !stationary {
                format!("projected gradient {norm:e} above tolerance after {restarts} restarts")
            } else {
                termination.to_string()
            };
            return Ok(OptimizationResult {
                parameters: x,
                fval,
                n_iter,
                n_fev: 0,
                n_gev: 0,
                converged: solver_converged && stationary,
                message,
                jac: Some(jac),
            });
        }
    }

    fn lbfgs_once(
        &self,
        problem: ArgminProblem<'_>,
        init: Vec<f64>,
    ) -> Result<(Vec<f64>, f64, u64, TerminationStatus)> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.options.get("maxcor") as usize)
            .with_tolerance_grad(self.options.get("gtol"))
            .map_err(|e| Error::Configuration(format!("Invalid minimizer option gtol: {e}")))?
            .with_tolerance_cost(self.options.get("ftol"))
            .map_err(|e| Error::Configuration(format!("Invalid minimizer option ftol: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(self.options.maxiter()))
            .run()
            .map_err(|e| Error::Convergence(e.to_string()))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Convergence("no best parameters found".into()))?
            .clone();
        Ok((best, state.get_best_cost(), state.get_iter(), state.get_termination_status().clone()))
    }

    fn run_nelder_mead(
        &self,
        problem: ArgminProblem<'_>,
        init: Vec<f64>,
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        let step = self.options.get("initial_step");
        let mut simplex = vec![init.clone()];
        for i in 0..init.len() {
            let mut vertex = init.clone();
            let (lo, hi) = bounds[i];
            // Step inwards when the start sits near the upper edge.
            vertex[i] = if init[i] + step <= hi { init[i] + step } else { (init[i] - step).max(lo) };
            simplex.push(vertex);
        }

        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(self.options.get("fatol"))
            .map_err(|e| Error::Configuration(format!("Invalid minimizer option fatol: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.options.maxiter()))
            .run()
            .map_err(|e| Error::Convergence(e.to_string()))?;

        let state = res.state();
        let parameters = state
            .get_best_param()
            .ok_or_else(|| Error::Convergence("no best parameters found".into()))?
            .clone();
        let termination = state.get_termination_status();
        Ok(OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: 0,
            n_gev: 0,
            converged: is_converged(termination),
            message: termination.to_string(),
            jac: None,
        })
    }

    /// Finite-difference Hessian of `objective` at `x` (forward differences of
    /// the central gradient), symmetrised.
    pub fn hessian(
        &self,
        objective: &dyn ObjectiveFunction,
        x: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<DMatrix<f64>> {
        let n = x.len();
        let h_grad = self.options.step().max(f64::EPSILON.sqrt());
        let grad_bounds: Vec<(f64, f64)> = bounds
            .iter()
            .map(|&(lo, hi)| ((lo).max(h_grad), (hi).min(1.0 - h_grad)))
            .collect();
        let center = clamp_params(x, &grad_bounds);
        let grad_center = central_gradient(objective, &center, h_grad)?;

        let mut hessian = DMatrix::zeros(n, n);
        for j in 0..n {
            let (lo, hi) = grad_bounds[j];
            let step = if center[j] + HESSIAN_STEP <= hi {
                HESSIAN_STEP
            } else if center[j] - HESSIAN_STEP >= lo {
                -HESSIAN_STEP
            } else {
                return Err(Error::Validation(
                    "rescaled box too narrow for a finite-difference Hessian".into(),
                ));
            };
            let mut shifted = center.clone();
            shifted[j] += step;
            let grad_plus = central_gradient(objective, &shifted, h_grad)?;
            for i in 0..n {
                hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / step;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }
}

/// Coarse first stage: the minimizer is run from several starts and the best
/// end point seeds the local fit.
#[derive(Debug, Clone)]
pub struct GlobalSearch {
    minimizer: Minimizer,
    num_starts: usize,
}

fn first_primes(n: usize) -> Vec<usize> {
    let mut primes = Vec::with_capacity(n);
    let mut candidate = 2;
    while primes.len() < n {
        if primes.iter().all(|p| candidate % p != 0) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// Element `index` of the van der Corput sequence in `base`.
fn radical_inverse(mut index: usize, base: usize) -> f64 {
    let mut f = 1.0;
    let mut r = 0.0;
    while index > 0 {
        f /= base as f64;
        r += f * (index % base) as f64;
        index /= base;
    }
    r
}

impl GlobalSearch {
    /// Stage running `options` from `num_starts` (at least one) points.
    pub fn new(options: ResolvedOptions, num_starts: usize) -> Self {
        Self { minimizer: Minimizer::new(options), num_starts: num_starts.max(1) }
    }

    /// Options of the stage.
    pub fn options(&self) -> &ResolvedOptions {
        self.minimizer.options()
    }

    /// `init` followed by Halton points spread over the box.
    pub fn starts(&self, init: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let primes = first_primes(bounds.len());
        let mut starts = vec![clamp_params(init, bounds)];
        for k in 1..self.num_starts {
            starts.push(
                bounds
                    .iter()
                    .zip(&primes)
                    .map(|(&(lo, hi), &base)| lo + (hi - lo) * radical_inverse(k, base))
                    .collect(),
            );
        }
        starts
    }

    /// Best result over all starts. Iteration and evaluation counts are summed.
    pub fn search(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        let mut best: Option<OptimizationResult> = None;
        let (mut n_iter, mut n_fev, mut n_gev) = (0, 0, 0);
        for (i, start) in self.starts(init, bounds).into_iter().enumerate() {
            let r = self.minimizer.minimize(objective, &start, bounds)?;
            log::debug!("global start {i}: {r}");
            n_iter += r.n_iter;
            n_fev += r.n_fev;
            n_gev += r.n_gev;
            if best.as_ref().map_or(true, |b| r.fval < b.fval) {
                best = Some(r);
            }
        }
        let mut best =
            best.ok_or_else(|| Error::Convergence("global search ran no starts".into()))?;
        best.n_iter = n_iter;
        best.n_fev = n_fev;
        best.n_gev = n_gev;
        Ok(best)
    }
}

fn is_converged(termination: &TerminationStatus) -> bool {
    matches!(
        termination,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    )
}

/// Invert a Hessian via damped Cholesky; `None` if no usable inverse exists.
pub fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = hessian.nrows();
    let identity = DMatrix::identity(n, n);
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    let max_attempts = 10;

    for attempt in 0..max_attempts {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            return Some(chol.solve(&identity));
        }
        if attempt + 1 == max_attempts {
            break;
        }
        let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        let add = next_damping - damping;
        for i in 0..n {
            h_damped[(i, i)] += add;
        }
        damping = next_damping;
    }

    let inv = h_damped.lu().try_inverse()?;
    if (0..n).any(|i| !(inv[(i, i)].is_finite() && inv[(i, i)] > 0.0)) {
        return None;
    }
    Some(inv)
}

/// Row-major nested vectors for serialisation.
pub fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows()).map(|i| m.row(i).iter().copied().collect()).collect()
}
