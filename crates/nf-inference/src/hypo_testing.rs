//! Two-hypothesis discrimination over nested data and fiducial trials.
//!
//! Per data trial the (possibly fluctuated) data is fitted by both hypotheses.
//! Their best expectations become the fiducial Asimov distributions; per
//! fiducial trial those are (optionally) fluctuated and fitted four times:
//! each hypothesis against its own and against the other's fiducial data.
//!
//! Randomness comes only from `(role, data index, fid index)`, and every fit
//! is stored under a stable key, so an interrupted run resumes exactly.

use crate::analysis::{Analysis, Counter, HypoFit};
use crate::sink::FitSink;
use crate::toys::{fluctuate, random_state, FluctuationMethod, TrialRole};
use nf_core::{DistributionMaker, Error, FitResult, MapSet, ParamSet, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Trial loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypoTestingSettings {
    /// Number of data trials.
    pub num_data_trials: u64,
    /// First data trial index.
    pub data_start_ind: u64,
    /// Number of fiducial trials per data trial.
    pub num_fid_trials: u64,
    /// First fiducial trial index.
    pub fid_start_ind: u64,
    /// Fluctuation of the data distribution, if any.
    pub fluctuate_data: Option<FluctuationMethod>,
    /// Fluctuation of the fiducial distributions, if any.
    pub fluctuate_fid: Option<FluctuationMethod>,
    /// Selection labels of hypothesis h0.
    pub h0_param_selections: Vec<String>,
    /// Selection labels of hypothesis h1.
    pub h1_param_selections: Vec<String>,
    /// Selection labels of the data model; h0's when absent.
    pub data_param_selections: Option<Vec<String>>,
    /// Run every fit even where the no-fit shortcut applies.
    pub force_fits: bool,
}

impl Default for HypoTestingSettings {
    fn default() -> Self {
        Self {
            num_data_trials: 1,
            data_start_ind: 0,
            num_fid_trials: 1,
            fid_start_ind: 0,
            fluctuate_data: None,
            fluctuate_fid: None,
            h0_param_selections: Vec::new(),
            h1_param_selections: Vec::new(),
            data_param_selections: None,
            force_fits: false,
        }
    }
}

impl HypoTestingSettings {
    /// Copy with trial counts forced to 1 where nothing is fluctuated.
    pub fn normalized(&self) -> Self {
        let mut s = self.clone();
        if s.fluctuate_data.is_none() && s.num_data_trials != 1 {
            log::warn!(
                "Data is not fluctuated; forcing num_data_trials from {} to 1",
                s.num_data_trials
            );
            s.num_data_trials = 1;
        }
        if s.fluctuate_fid.is_none() && s.num_fid_trials != 1 {
            log::warn!(
                "Fiducial data is not fluctuated; forcing num_fid_trials from {} to 1",
                s.num_fid_trials
            );
            s.num_fid_trials = 1;
        }
        s
    }

    /// Data trial indices to run.
    pub fn data_indices(&self) -> std::ops::Range<u64> {
        self.data_start_ind..self.data_start_ind + self.num_data_trials
    }

    /// Fiducial trial indices to run.
    pub fn fid_indices(&self) -> std::ops::Range<u64> {
        self.fid_start_ind..self.fid_start_ind + self.num_fid_trials
    }

    pub(crate) fn data_selections(&self) -> &[String] {
        self.data_param_selections.as_deref().unwrap_or(&self.h0_param_selections)
    }
}

/// Where the data distribution comes from.
pub enum DataSource<M> {
    /// Measured data; never fluctuated.
    Measured(MapSet),
    /// Asimov expectation of a model; h0's model when `None`.
    Model(Option<M>),
}

/// Hypothesis label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypo {
    /// Null hypothesis.
    H0,
    /// Alternative hypothesis.
    H1,
}

impl Hypo {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Hypo::H0 => "h0",
            Hypo::H1 => "h1",
        }
    }
}

/// The four fits of one fiducial trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidTrial {
    /// Fiducial trial index.
    pub fid_ind: u64,
    /// h0 fitted to h0's fiducial data.
    pub h0_fit_to_h0_fid: FitResult,
    /// h1 fitted to h1's fiducial data.
    pub h1_fit_to_h1_fid: FitResult,
    /// h1 fitted to h0's fiducial data.
    pub h1_fit_to_h0_fid: FitResult,
    /// h0 fitted to h1's fiducial data.
    pub h0_fit_to_h1_fid: FitResult,
}

impl FidTrial {
    /// Metric values in field order.
    pub fn metric_vals(&self) -> [f64; 4] {
        [
            self.h0_fit_to_h0_fid.metric_val,
            self.h1_fit_to_h1_fid.metric_val,
            self.h1_fit_to_h0_fid.metric_val,
            self.h0_fit_to_h1_fid.metric_val,
        ]
    }
}

/// Everything computed for one data trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTrial {
    /// Data trial index.
    pub data_ind: u64,
    /// h0 fitted to the data.
    pub h0_fit_to_data: FitResult,
    /// h1 fitted to the data.
    pub h1_fit_to_data: FitResult,
    /// Fiducial trials, in index order.
    pub fid_trials: Vec<FidTrial>,
}

/// Best fit to the data plus what the fiducial stage needs from it.
struct DataFit {
    fit: FitResult,
    params: ParamSet,
    asimov: MapSet,
}

/// Hypothesis-test driver.
///
/// Makers live in one list; aliased roles share an index, so an h1 identical to
/// h0 reuses h0's maker instead of building a second one.
pub struct HypoTesting<M: DistributionMaker, S: FitSink> {
    pub(crate) analysis: Analysis,
    pub(crate) settings: HypoTestingSettings,
    pub(crate) makers: Vec<M>,
    pub(crate) h0: usize,
    pub(crate) h1: usize,
    pub(crate) data_maker: Option<usize>,
    pub(crate) measured: Option<MapSet>,
    pub(crate) data_asimov: Option<MapSet>,
    /// Set while the cached data expectation was not generated at the data model's nominal point.
    pub(crate) data_shifted: bool,
    /// Leading path component of every record key.
    pub(crate) key_prefix: Option<String>,
    sink: S,
    pub(crate) counter: Counter,
}

fn same_model<M: DistributionMaker>(a: &M, b: &M) -> bool {
    matches!((a.config_hash(), b.config_hash()), (Some(x), Some(y)) if x == y)
}

fn normalize_labels(labels: &[String]) -> Vec<String> {
    let mut v: Vec<String> = labels.iter().map(|l| l.trim().to_lowercase()).collect();
    v.sort();
    v.dedup();
    v
}

impl<M: DistributionMaker, S: FitSink> HypoTesting<M, S> {
    /// Set up a test; fails on a vacuous h0 vs h1 comparison or on fluctuating measured data.
    pub fn new(
        analysis: Analysis,
        settings: HypoTestingSettings,
        h0_maker: M,
        h1_maker: Option<M>,
        data: DataSource<M>,
        sink: S,
    ) -> Result<Self> {
        let measured_data = matches!(data, DataSource::Measured(_));
        if measured_data && settings.fluctuate_data.is_some() {
            return Err(Error::Configuration(
                "measured data must not be fluctuated; unset fluctuate_data".into(),
            ));
        }
        let settings = settings.normalized();

        let mut makers = vec![h0_maker];
        let h1 = match h1_maker {
            None => 0,
            Some(m) if same_model(&makers[0], &m) => {
                log::info!("h1 model is identical to h0's; sharing one instance");
                0
            }
            Some(m) => {
                makers.push(m);
                1
            }
        };
        if h1 == 0
            && normalize_labels(&settings.h0_param_selections)
                == normalize_labels(&settings.h1_param_selections)
        {
            return Err(Error::Configuration(
                "h0 and h1 share the model and the parameter selections; nothing to discriminate".into(),
            ));
        }

        let (data_maker, measured) = match data {
            DataSource::Measured(maps) => (None, Some(maps)),
            DataSource::Model(None) => (Some(0), None),
            DataSource::Model(Some(m)) => {
                let ind = if same_model(&makers[0], &m) {
                    0
                } else if h1 != 0 && same_model(&makers[h1], &m) {
                    h1
                } else {
                    makers.push(m);
                    makers.len() - 1
                };
                (Some(ind), None)
            }
        };

        Ok(Self {
            analysis,
            settings,
            makers,
            h0: 0,
            h1,
            data_maker,
            measured,
            data_asimov: None,
            data_shifted: false,
            key_prefix: None,
            sink,
            counter: Counter::new(),
        })
    }

    /// Settings after trial-count normalization.
    pub fn settings(&self) -> &HypoTestingSettings {
        &self.settings
    }

    /// Distributions generated so far.
    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// Sink holding the fit records.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Whether h1 shares h0's maker.
    pub fn h1_maker_is_h0_maker(&self) -> bool {
        self.h1 == self.h0
    }

    pub(crate) fn maker_index(&self, hypo: Hypo) -> usize {
        match hypo {
            Hypo::H0 => self.h0,
            Hypo::H1 => self.h1,
        }
    }

    pub(crate) fn selections(&self, hypo: Hypo) -> &[String] {
        match hypo {
            Hypo::H0 => &self.settings.h0_param_selections,
            Hypo::H1 => &self.settings.h1_param_selections,
        }
    }

    /// Record key of `name` within data trial `data_ind`.
    fn key(&self, data_ind: u64, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}/data_{data_ind}/{name}"),
            None => format!("data_{data_ind}/{name}"),
        }
    }

    /// Run every data trial in sequence.
    pub fn run(&mut self) -> Result<Vec<DataTrial>> {
        self.settings.data_indices().map(|i| self.run_data_trial(i)).collect()
    }

    /// Run one data trial with all of its fiducial trials.
    pub fn run_data_trial(&mut self, data_ind: u64) -> Result<DataTrial> {
        let data = self.generate_data(data_ind)?;
        let h0 = self.fit_hypo_to_data(Hypo::H0, &data, data_ind)?;
        let h1 = self.fit_hypo_to_data(Hypo::H1, &data, data_ind)?;

        let total = self.settings.num_fid_trials;
        let start = Instant::now();
        let mut fid_trials = Vec::with_capacity(total as usize);
        for (done, fid_ind) in self.settings.fid_indices().enumerate() {
            let (h0_fid, h1_fid) = self.produce_fid_data(data_ind, fid_ind, &h0.asimov, &h1.asimov)?;
            fid_trials.push(self.fit_hypos_to_fid(data_ind, fid_ind, &h0, &h1, &h0_fid, &h1_fid)?);

            let done = done as u64 + 1;
            let elapsed = start.elapsed().as_secs_f64();
            let eta = elapsed / done as f64 * (total - done) as f64;
            log::info!(
                "data trial {data_ind}: fid trial {fid_ind} done ({done}/{total}); \
                 elapsed {elapsed:.1} s, eta {eta:.1} s, {} dists generated",
                self.counter.count()
            );
        }

        Ok(DataTrial { data_ind, h0_fit_to_data: h0.fit, h1_fit_to_data: h1.fit, fid_trials })
    }

    /// Data distribution of one trial.
    pub fn generate_data(&mut self, data_ind: u64) -> Result<MapSet> {
        if let Some(maps) = &self.measured {
            return Ok(maps.clone());
        }
        let asimov = self.data_asimov()?;
        match self.settings.fluctuate_data {
            Some(method) => {
                let mut rng = random_state(TrialRole::Data, data_ind, 0);
                fluctuate(&asimov, method, &mut rng)
            }
            None => Ok(asimov),
        }
    }

    /// Nominal expectation of the data model, generated once.
    fn data_asimov(&mut self) -> Result<MapSet> {
        if let Some(a) = &self.data_asimov {
            return Ok(a.clone());
        }
        let ind = self
            .data_maker
            .ok_or_else(|| Error::Configuration("no data model configured".into()))?;
        let selections = self.settings.data_selections().to_vec();
        let maker = &mut self.makers[ind];
        maker.select_params(&selections)?;
        maker.reset_free();
        let asimov = maker.get_outputs(true).map_err(|e| Error::model_evaluation("get_outputs", e))?;
        self.counter.increment();
        self.data_asimov = Some(asimov.clone());
        Ok(asimov)
    }

    /// Whether `hypo` is exactly the unfluctuated data-generating configuration.
    fn data_fit_is_trivial(&self, hypo: Hypo) -> bool {
        self.measured.is_none()
            && !self.data_shifted
            && self.data_maker == Some(self.maker_index(hypo))
            && normalize_labels(self.selections(hypo))
                == normalize_labels(self.settings.data_selections())
            && self.settings.fluctuate_data.is_none()
            && !self.settings.force_fits
    }

    fn fit_hypo(&mut self, hypo: Hypo, data: &MapSet) -> Result<HypoFit> {
        let ind = self.maker_index(hypo);
        let selections = self.selections(hypo).to_vec();
        self.analysis.fit_hypo(data, &mut self.makers[ind], &selections, &mut self.counter)
    }

    fn fit_hypo_to_data(&mut self, hypo: Hypo, data: &MapSet, data_ind: u64) -> Result<DataFit> {
        let key = self.key(data_ind, &format!("{}_fit_to_data", hypo.label()));
        let (fit, params) = if self.data_fit_is_trivial(hypo) {
            log::info!("{} is the data-generating model; scoring without a fit", hypo.label());
            let ind = self.maker_index(hypo);
            let selections = self.selections(hypo).to_vec();
            let maker = &mut self.makers[ind];
            maker.select_params(&selections)?;
            maker.reset_free();
            let params = maker.params().clone();
            (self.analysis.nofit_hypo(data, &params, data)?, params)
        } else {
            log::info!("Fitting {} to data trial {data_ind}", hypo.label());
            let HypoFit { best_fit_info, best_params, .. } = self.fit_hypo(hypo, data)?;
            (best_fit_info, best_params)
        };
        let asimov = fit.hypo_asimov_dist.clone().ok_or_else(|| {
            Error::Validation(format!("{key} carries no expected distribution"))
        })?;
        self.sink.store(&key, &fit)?;
        Ok(DataFit { fit, params, asimov })
    }

    /// Fiducial data of both hypotheses for one trial, drawn from one stream.
    pub fn produce_fid_data(
        &self,
        data_ind: u64,
        fid_ind: u64,
        h0_asimov: &MapSet,
        h1_asimov: &MapSet,
    ) -> Result<(MapSet, MapSet)> {
        match self.settings.fluctuate_fid {
            None => Ok((h0_asimov.clone(), h1_asimov.clone())),
            Some(method) => {
                let mut rng = random_state(TrialRole::Fiducial, data_ind, fid_ind);
                let h0 = fluctuate(h0_asimov, method, &mut rng)?;
                let h1 = fluctuate(h1_asimov, method, &mut rng)?;
                Ok((h0, h1))
            }
        }
    }

    fn stored_or<F>(&mut self, key: &str, run: F) -> Result<FitResult>
    where
        F: FnOnce(&mut Self) -> Result<FitResult>,
    {
        if self.sink.contains(key) {
            log::info!("Loading existing fit '{key}'");
            return self.sink.load(key);
        }
        let fit = run(self)?;
        self.sink.store(key, &fit)?;
        Ok(fit)
    }

    /// Fit of `hypo` to the fiducial data produced by `source`.
    fn fid_fit(
        &mut self,
        data_ind: u64,
        fid_ind: u64,
        hypo: Hypo,
        source: Hypo,
        source_fit: &DataFit,
        fid_data: &MapSet,
    ) -> Result<FitResult> {
        let key =
            self.key(data_ind, &format!("{}_fit_to_{}_fid_{fid_ind}", hypo.label(), source.label()));
        let shortcut =
            hypo == source && self.settings.fluctuate_fid.is_none() && !self.settings.force_fits;
        self.stored_or(&key, |this| {
            if shortcut {
                log::debug!("{key}: fiducial data is {}'s own expectation; scoring without a fit", hypo.label());
                this.analysis.nofit_hypo(fid_data, &source_fit.params, &source_fit.asimov)
            } else {
                log::info!("Fitting {} to {}'s fiducial data", hypo.label(), source.label());
                Ok(this.fit_hypo(hypo, fid_data)?.best_fit_info)
            }
        })
    }

    fn fit_hypos_to_fid(
        &mut self,
        data_ind: u64,
        fid_ind: u64,
        h0: &DataFit,
        h1: &DataFit,
        h0_fid: &MapSet,
        h1_fid: &MapSet,
    ) -> Result<FidTrial> {
        let fit = |this: &mut Self, hypo: Hypo, source: Hypo| {
            let (source_fit, data) = match source {
                Hypo::H0 => (h0, h0_fid),
                Hypo::H1 => (h1, h1_fid),
            };
            this.fid_fit(data_ind, fid_ind, hypo, source, source_fit, data)
        };
        Ok(FidTrial {
            fid_ind,
            h0_fit_to_h0_fid: fit(self, Hypo::H0, Hypo::H0)?,
            h1_fit_to_h1_fid: fit(self, Hypo::H1, Hypo::H1)?,
            h1_fit_to_h0_fid: fit(self, Hypo::H1, Hypo::H0)?,
            h0_fit_to_h1_fid: fit(self, Hypo::H0, Hypo::H1)?,
        })
    }
}
