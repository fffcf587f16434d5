//! Data trials across threads.
//!
//! Each worker owns a [`HypoTesting`] built for exactly one data index, so no
//! maker is shared between threads. Random states depend only on trial
//! indices; the output matches a sequential run.

use crate::hypo_testing::{DataTrial, HypoTesting, HypoTestingSettings};
use crate::sink::FitSink;
use nf_core::{DistributionMaker, Result};
use rayon::prelude::*;

/// Run the data trials of `settings` in parallel, in index order.
///
/// `factory` receives the data index and builds an independent test for it.
pub fn run_data_trials_parallel<M, S, F>(
    settings: &HypoTestingSettings,
    factory: F,
) -> Result<Vec<DataTrial>>
where
    M: DistributionMaker,
    S: FitSink,
    F: Fn(u64) -> Result<HypoTesting<M, S>> + Sync,
{
    let indices: Vec<u64> = settings.normalized().data_indices().collect();
    log::info!("Running {} data trials on {} threads", indices.len(), rayon::current_num_threads());
    indices
        .par_iter()
        .map(|&data_ind| {
            let mut test = factory(data_ind)?;
            test.run_data_trial(data_ind)
        })
        .collect()
}
