#![allow(dead_code)]

use nf_core::{
    Binning, DistributionMaker, Map, MapSet, Param, ParamSelector, ParamSet, Result, Unit,
};
use std::collections::BTreeMap;

/// Expected counts per bin at the given parameter values.
pub type Model = fn(&ParamSet) -> Vec<f64>;

/// Closed-form maker over a fixed 1-d binning.
pub struct ToyMaker {
    selector: ParamSelector,
    model: Model,
    edges: Vec<f64>,
    hash: Option<u64>,
    pub calls: usize,
}

impl ToyMaker {
    pub fn new(params: Vec<Param>, model: Model, num_bins: usize) -> Self {
        let params = ParamSet::new(params).unwrap();
        Self {
            selector: ParamSelector::from_params(params),
            model,
            edges: (0..=num_bins).map(|i| i as f64).collect(),
            hash: None,
            calls: 0,
        }
    }

    pub fn with_variants(mut self, variants: BTreeMap<String, Vec<Param>>, selected: &[&str]) -> Self {
        let params = self.selector.params().clone();
        self.selector = ParamSelector::new(params, variants, selected).unwrap();
        self
    }

    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = Some(hash);
        self
    }
}

impl DistributionMaker for ToyMaker {
    fn params(&self) -> &ParamSet {
        self.selector.params()
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        self.selector.params_mut()
    }

    fn select_params(&mut self, labels: &[String]) -> Result<()> {
        self.selector.select(labels)
    }

    fn get_outputs(&mut self, _return_sum: bool) -> Result<MapSet> {
        self.calls += 1;
        let hist = (self.model)(self.selector.params());
        let binning = Binning::one_dim("reco_energy", self.edges.clone())?;
        Ok(MapSet::single(Map::new("total", binning, hist)?))
    }

    fn config_hash(&self) -> Option<u64> {
        self.hash
    }
}

pub fn value(params: &ParamSet, name: &str) -> f64 {
    params.get(name).map(Param::value).unwrap_or(0.0)
}

pub fn counts(hist: Vec<f64>) -> MapSet {
    let n = hist.len();
    let binning = Binning::one_dim("reco_energy", (0..=n).map(|i| i as f64).collect()).unwrap();
    MapSet::single(Map::new("total", binning, hist).unwrap())
}

/// `mu = 10 + 5 theta`, theta in [0, 4].
pub fn linear_maker(start: f64) -> ToyMaker {
    ToyMaker::new(
        vec![Param::new("theta", start, Unit::Dimensionless).with_range(0.0, 4.0)],
        |p| vec![10.0 + 5.0 * value(p, "theta")],
        1,
    )
}

/// One bin that reaches 150 only above 45 degrees.
pub fn octant_maker() -> ToyMaker {
    ToyMaker::new(
        vec![Param::new("theta23", 40.0, Unit::Degree).with_range(30.0, 60.0)],
        |p| {
            let t = value(p, "theta23");
            let w = if t < 45.0 { 0.8 } else { 1.0 };
            let s = (4.0 * (t - 45.0)).to_radians().sin();
            vec![100.0 + 80.0 * s * s * w]
        },
        1,
    )
}

/// Three bins with a free normalisation and a shape set by the ordering selection.
pub fn ordering_maker(selected: &[&str]) -> ToyMaker {
    let mut variants = BTreeMap::new();
    variants.insert("nh".to_string(), vec![Param::new("dm", 1.0, Unit::Dimensionless).fixed()]);
    variants.insert("ih".to_string(), vec![Param::new("dm", -1.0, Unit::Dimensionless).fixed()]);
    ToyMaker::new(
        vec![Param::new("norm", 1.0, Unit::Dimensionless).with_range(0.5, 1.5)],
        |p| {
            let norm = value(p, "norm");
            let dm = value(p, "dm");
            [200.0, 100.0, 50.0]
                .iter()
                .zip([0.3, -0.2, 0.1])
                .map(|(b, c)| b * norm * (1.0 + dm * c))
                .collect()
        },
        3,
    )
    .with_variants(variants, selected)
}

/// Three bins, normalisation and slope free, plus a free flat background.
pub fn shape_maker() -> ToyMaker {
    ToyMaker::new(
        vec![
            Param::new("norm", 1.0, Unit::Dimensionless).with_range(0.5, 2.0),
            Param::new("slope", 0.2, Unit::Dimensionless).with_range(-0.4, 0.8),
            Param::new("bkg", 5.0, Unit::Dimensionless).with_range(0.0, 10.0),
        ],
        |p| {
            let norm = value(p, "norm");
            let slope = value(p, "slope");
            let bkg = value(p, "bkg");
            [100.0, 60.0, 30.0]
                .iter()
                .enumerate()
                .map(|(i, b)| b * norm * (1.0 + slope * i as f64) + bkg)
                .collect()
        },
        3,
    )
}
