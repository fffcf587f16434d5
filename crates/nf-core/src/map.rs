//! Binned distributions: [`Map`] and the named collection [`MapSet`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One binning dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinDim {
    /// Dimension name (e.g. `reco_energy`).
    pub name: String,
    /// Bin edges, strictly increasing; `edges.len() - 1` bins.
    pub edges: Vec<f64>,
}

impl BinDim {
    /// New dimension; needs at least two strictly increasing finite edges.
    pub fn new(name: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if edges.len() < 2 {
            return Err(Error::Validation(format!(
                "dimension '{name}' needs at least 2 edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::Validation(format!(
                "dimension '{name}' edges must be finite and strictly increasing"
            )));
        }
        Ok(Self { name, edges })
    }

    /// Number of bins along this dimension.
    pub fn num_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }
}

/// Multi-dimensional binning; row-major bin order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Dimensions, outermost first.
    pub dims: Vec<BinDim>,
}

impl Binning {
    /// Binning from dimensions.
    pub fn new(dims: Vec<BinDim>) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::Validation("binning needs at least one dimension".into()));
        }
        Ok(Self { dims })
    }

    /// Single-dimension binning.
    pub fn one_dim(name: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        Self::new(vec![BinDim::new(name, edges)?])
    }

    /// Bins per dimension.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(BinDim::num_bins).collect()
    }

    /// Total number of bins.
    pub fn num_bins(&self) -> usize {
        self.dims.iter().map(BinDim::num_bins).product()
    }
}

/// A named histogram with optional per-bin uncertainty and weight samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    /// Unique name within a [`MapSet`].
    pub name: String,
    /// Binning shared by `hist`, `errors` and `weight_samples`.
    pub binning: Binning,
    /// Bin contents, row-major.
    pub hist: Vec<f64>,
    /// Per-bin standard uncertainty on `hist`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<f64>>,
    /// Per-bin weights of the simulated events filling each bin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_samples: Option<Vec<Vec<f64>>>,
}

impl Map {
    /// New map; `hist.len()` must equal the number of bins.
    pub fn new(name: impl Into<String>, binning: Binning, hist: Vec<f64>) -> Result<Self> {
        let name = name.into();
        let n = binning.num_bins();
        if hist.len() != n {
            return Err(Error::Validation(format!(
                "map '{name}': {} values for {n} bins",
                hist.len()
            )));
        }
        Ok(Self { name, binning, hist, errors: None, weight_samples: None })
    }

    /// Attach per-bin uncertainties.
    pub fn with_errors(mut self, errors: Vec<f64>) -> Result<Self> {
        if errors.len() != self.hist.len() {
            return Err(Error::Validation(format!(
                "map '{}': {} errors for {} bins",
                self.name,
                errors.len(),
                self.hist.len()
            )));
        }
        self.errors = Some(errors);
        Ok(self)
    }

    /// Attach per-bin weight samples.
    pub fn with_weight_samples(mut self, samples: Vec<Vec<f64>>) -> Result<Self> {
        if samples.len() != self.hist.len() {
            return Err(Error::Validation(format!(
                "map '{}': weight samples for {} bins, map has {}",
                self.name,
                samples.len(),
                self.hist.len()
            )));
        }
        self.weight_samples = Some(samples);
        Ok(self)
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.hist.len()
    }

    /// Sum of all bin contents.
    pub fn total(&self) -> f64 {
        self.hist.iter().sum()
    }

    /// Uncertainty of bin `i`, zero when the map carries none.
    pub fn error(&self, i: usize) -> f64 {
        self.errors.as_ref().and_then(|e| e.get(i).copied()).unwrap_or(0.0)
    }

    /// Add maps bin by bin; errors add in quadrature, weight samples concatenate.
    pub fn sum(name: impl Into<String>, maps: &[&Map]) -> Result<Self> {
        let name = name.into();
        let first = maps
            .first()
            .ok_or_else(|| Error::Validation(format!("cannot sum zero maps into '{name}'")))?;
        for m in &maps[1..] {
            if m.binning != first.binning {
                return Err(Error::Validation(format!(
                    "cannot sum map '{}' into '{name}': incompatible binning",
                    m.name
                )));
            }
        }
        let n = first.num_bins();
        let mut hist = vec![0.0; n];
        for m in maps {
            for (h, v) in hist.iter_mut().zip(&m.hist) {
                *h += v;
            }
        }
        let mut out = Map::new(name, first.binning.clone(), hist)?;

        if maps.iter().any(|m| m.errors.is_some()) {
            let errors =
                (0..n).map(|i| maps.iter().map(|m| m.error(i).powi(2)).sum::<f64>().sqrt()).collect();
            out.errors = Some(errors);
        }
        if maps.iter().all(|m| m.weight_samples.is_some()) {
            let mut samples: Vec<Vec<f64>> = vec![Vec::new(); n];
            for ws in maps.iter().filter_map(|m| m.weight_samples.as_ref()) {
                for (dst, src) in samples.iter_mut().zip(ws) {
                    dst.extend_from_slice(src);
                }
            }
            out.weight_samples = Some(samples);
        }
        Ok(out)
    }
}

/// Ordered collection of uniquely named maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapSet {
    maps: Vec<Map>,
}

impl MapSet {
    /// New set; names must be unique.
    pub fn new(maps: Vec<Map>) -> Result<Self> {
        for (i, m) in maps.iter().enumerate() {
            if maps[..i].iter().any(|o| o.name == m.name) {
                return Err(Error::Validation(format!("duplicate map name '{}'", m.name)));
            }
        }
        Ok(Self { maps })
    }

    /// Set holding exactly one map.
    pub fn single(map: Map) -> Self {
        Self { maps: vec![map] }
    }

    /// Number of maps.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Map by name.
    pub fn get(&self, name: &str) -> Option<&Map> {
        self.maps.iter().find(|m| m.name == name)
    }

    /// Names in order.
    pub fn names(&self) -> Vec<String> {
        self.maps.iter().map(|m| m.name.clone()).collect()
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = &Map> {
        self.maps.iter()
    }

    /// Combine all maps into one called `name`.
    pub fn sum(&self, name: impl Into<String>) -> Result<Map> {
        let refs: Vec<&Map> = self.maps.iter().collect();
        Map::sum(name, &refs)
    }

    /// Apply `f` to every map, producing a new set with the same names.
    pub fn try_map<F>(&self, mut f: F) -> Result<MapSet>
    where
        F: FnMut(&Map) -> Result<Map>,
    {
        let maps = self.maps.iter().map(&mut f).collect::<Result<Vec<_>>>()?;
        MapSet::new(maps)
    }
}

impl IntoIterator for MapSet {
    type Item = Map;
    type IntoIter = std::vec::IntoIter<Map>;

    fn into_iter(self) -> Self::IntoIter {
        self.maps.into_iter()
    }
}
