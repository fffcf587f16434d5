//! # nf-core
//!
//! Core types for NuFit: parameters and priors, binned distributions, metric
//! identities, fit records and the `DistributionMaker` contract the fitting
//! engine drives.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Binned distributions.
pub mod map;
/// Metric identities.
pub mod metric;
/// Parameters, priors and the rescaling used by the minimizer.
pub mod params;
/// Label-selectable parameter variants.
pub mod selector;
/// The model contract.
pub mod traits;
/// Fit records.
pub mod types;
/// Physical units.
pub mod units;

pub use error::{BoundSide, Error, Result};
pub use map::{BinDim, Binning, Map, MapSet};
pub use metric::{Metric, MetricSense};
pub use params::{Param, ParamSet, Prior};
pub use selector::ParamSelector;
pub use traits::DistributionMaker;
pub use types::{DetailedMetricInfo, FitHistory, FitResult, MinimizerMetadata};
pub use units::Unit;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
