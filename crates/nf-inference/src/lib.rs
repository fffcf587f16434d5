//! # nf-inference
//!
//! Hypothesis fitting for NuFit.
//!
//! This crate provides:
//! - bounded minimization of a goodness-of-fit metric over rescaled parameters
//! - octant and mass-ordering multi-start fits
//! - profiled and raw parameter scans
//! - two-hypothesis tests over data and fiducial pseudo-experiments
//! - Asimov studies: injected-parameter scans and systematic tests
//!
//! The physics model is reached only through [`nf_core::DistributionMaker`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Inner and outer fit loops.
pub mod analysis;
/// Two-hypothesis trial orchestration.
pub mod hypo_testing;
/// Bounded minimizers (L-BFGS, Nelder-Mead) on argmin.
pub mod optimizer;
/// Data trials on a rayon pool.
pub mod parallel;
/// Parameter scans.
pub mod scan;
/// Minimizer and fit settings.
pub mod settings;
/// Fit record persistence.
pub mod sink;
/// Asimov sensitivity studies.
pub mod studies;
/// Reproducible pseudo-data.
pub mod toys;

pub use analysis::{Analysis, Counter, HypoFit, OctantOutcome};
pub use hypo_testing::{DataSource, DataTrial, FidTrial, Hypo, HypoTesting, HypoTestingSettings};
pub use optimizer::{GlobalSearch, Minimizer, ObjectiveFunction, OptimizationResult};
pub use parallel::run_data_trials_parallel;
pub use scan::{ScanDetail, ScanResults, ScanSettings, ScanValues};
pub use settings::{
    FitSettings, GlobalMinimizerSettings, MinimizerMethod, MinimizerSettings, OctantSettings,
    ResolvedOptions,
};
pub use sink::{FitSink, JsonDirSink, NullSink, read_json, write_json_atomic};
pub use studies::{
    HypoScanTrial, InjectedPoint, ShiftDirection, SystTest, SystTestResults, SystTestSettings,
    shifted_value,
};
pub use toys::{FluctuationMethod, TrialRole, fluctuate, random_state};
