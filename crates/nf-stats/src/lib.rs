//! Goodness-of-fit metrics for NuFit.
//!
//! This crate hosts the metric library used by the fitting engine:
//! - per-bin kernels for the Poisson and chi-square families
//! - the generalized Poisson likelihood over per-bin weight samples
//! - evaluation on named `Map`/`MapSet` pairs, with `NaN` masking

pub mod binned;
pub mod chi2;
pub mod generalized;
pub mod math;
pub mod poisson;

pub use binned::{binned, metric_binned_maps, metric_per_map, metric_total};
pub use math::SMALL_POS;
