//! Core traits for NuFit
//!
//! The fitting engine never builds physics distributions itself; it drives a
//! [`DistributionMaker`] through this trait and only reads the resulting maps.

use crate::map::MapSet;
use crate::params::{Param, ParamSet};
use crate::Result;

/// Parameterised model that turns the current parameter values into expected maps.
///
/// The engine mutates the live parameters through [`DistributionMaker::params_mut`]
/// and then calls [`DistributionMaker::get_outputs`]; implementations must read
/// their parameters at that point, not cache them at construction.
pub trait DistributionMaker {
    /// Live parameters.
    fn params(&self) -> &ParamSet;

    /// Live parameters, mutably. Changes must be visible to the next `get_outputs`.
    fn params_mut(&mut self) -> &mut ParamSet;

    /// Switch selectable parameters to the variants named by `labels`.
    ///
    /// Must be idempotent when the same labels are already active.
    fn select_params(&mut self, labels: &[String]) -> Result<()>;

    /// Reset free parameters to their nominal values.
    fn reset_free(&mut self) {
        self.params_mut().reset_free();
    }

    /// Write the given parameter values into the live model.
    fn update_params(&mut self, params: &[Param]) -> Result<()> {
        for p in params {
            self.params_mut().update(p)?;
        }
        Ok(())
    }

    /// Run the model at the current parameter values.
    ///
    /// With `return_sum`, all outputs are combined into a single map.
    fn get_outputs(&mut self, return_sum: bool) -> Result<MapSet>;

    /// Identity of the model configuration. Two makers reporting the same
    /// `Some` hash are treated as the same model when aliasing hypotheses.
    fn config_hash(&self) -> Option<u64> {
        None
    }
}
