//! Parameter selections: named alternative variants of some parameters.
//!
//! A hypothesis is often "the same model, with `deltam31` taken from the
//! inverted-ordering variant". [`ParamSelector`] keeps the regular parameters
//! and the labelled variants, and exposes the merged live [`ParamSet`].

use crate::params::{Param, ParamSet};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Regular parameters plus label-selectable variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSelector {
    params: ParamSet,
    variants: BTreeMap<String, Vec<Param>>,
    /// Regular parameter behind every name a variant provides; `None` when only variants provide it.
    #[serde(default)]
    defaults: BTreeMap<String, Option<Param>>,
    /// Labels applied at construction; an empty selection returns to them.
    #[serde(default)]
    default_selection: Vec<String>,
    selected: Vec<String>,
}

fn normalize(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

impl ParamSelector {
    /// Build from regular params and `label -> params` variants, then apply
    /// `selected`, which also becomes the default selection.
    pub fn new<S: AsRef<str>>(
        regular: ParamSet,
        variants: BTreeMap<String, Vec<Param>>,
        selected: &[S],
    ) -> Result<Self> {
        let mut normalized: BTreeMap<String, Vec<Param>> = BTreeMap::new();
        for (label, params) in variants {
            let key = normalize(&label);
            // Variants go through the same validation as any parameter set.
            let checked = ParamSet::new(params)?;
            if normalized.insert(key.clone(), checked.iter().cloned().collect()).is_some() {
                return Err(Error::Configuration(format!("duplicate selection label '{key}'")));
            }
        }
        let defaults = normalized
            .values()
            .flatten()
            .map(|p| (p.name.clone(), regular.get(&p.name).cloned()))
            .collect();
        let mut sel = Self {
            params: regular,
            variants: normalized,
            defaults,
            default_selection: Vec::new(),
            selected: Vec::new(),
        };
        sel.select(selected)?;
        sel.default_selection = sel.selected.clone();
        Ok(sel)
    }

    /// Selector without any variants.
    pub fn from_params(params: ParamSet) -> Self {
        Self {
            params,
            variants: BTreeMap::new(),
            defaults: BTreeMap::new(),
            default_selection: Vec::new(),
            selected: Vec::new(),
        }
    }

    /// Live parameters (regular plus currently selected variants).
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Live parameters, mutably.
    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Labels an empty selection returns to.
    pub fn default_selection(&self) -> &[String] {
        &self.default_selection
    }

    /// Currently active labels.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// All known labels.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Swap the variants named by `labels` into the live set.
    ///
    /// Re-selecting the active labels is a no-op, so parameter values set since
    /// the last selection survive. Parameters of labels no longer selected fall
    /// back to their regular definition. An empty list returns to the default
    /// selection.
    pub fn select<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let mut wanted: Vec<String> = if labels.is_empty() {
            self.default_selection.clone()
        } else {
            labels.iter().map(|l| normalize(l.as_ref())).collect()
        };
        wanted.sort();
        wanted.dedup();
        if wanted == self.selected {
            return Ok(());
        }

        let mut provided: BTreeMap<&str, &str> = BTreeMap::new();
        for label in &wanted {
            let variant = self.variants.get(label).ok_or_else(|| {
                let known: Vec<&str> = self.variants.keys().map(String::as_str).collect();
                Error::Configuration(format!(
                    "unknown param selection '{label}'; known selections: [{}]",
                    known.join(", ")
                ))
            })?;
            for p in variant {
                if let Some(other) = provided.insert(p.name.as_str(), label.as_str()) {
                    return Err(Error::Configuration(format!(
                        "parameter '{}' is provided by both selections '{other}' and '{label}'",
                        p.name
                    )));
                }
            }
        }

        for label in &self.selected {
            for p in &self.variants[label] {
                if provided.contains_key(p.name.as_str()) {
                    continue;
                }
                match self.defaults.get(&p.name) {
                    Some(Some(regular)) => {
                        if let Some(slot) = self.params.get_mut(&p.name) {
                            *slot = regular.clone();
                        }
                    }
                    _ => self.params.remove(&p.name),
                }
            }
        }

        for label in &wanted {
            for p in &self.variants[label] {
                match self.params.get_mut(&p.name) {
                    Some(slot) => *slot = p.clone(),
                    None => self.params.push(p.clone())?,
                }
            }
        }
        log::debug!("param selections now [{}]", wanted.join(", "));
        self.selected = wanted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn selector() -> ParamSelector {
        let regular = ParamSet::new(vec![
            Param::new("theta23", 42.0, Unit::Degree).with_range(31.0, 59.0),
        ])
        .unwrap();
        let mut variants = BTreeMap::new();
        variants.insert(
            "NH".to_string(),
            vec![Param::new("deltam31", 2.5e-3, Unit::ElectronVoltSquared)
                .with_range(1e-3, 5e-3)],
        );
        variants.insert(
            "ih".to_string(),
            vec![Param::new("deltam31", -2.4e-3, Unit::ElectronVoltSquared)
                .with_range(-5e-3, -1e-3)],
        );
        ParamSelector::new(regular, variants, &["nh"]).unwrap()
    }

    #[test]
    fn test_select_swaps_variant() {
        let mut s = selector();
        assert_eq!(s.params().get("deltam31").unwrap().value(), 2.5e-3);
        s.select(&["ih"]).unwrap();
        assert_eq!(s.params().get("deltam31").unwrap().value(), -2.4e-3);
        assert_eq!(s.params().names(), vec!["theta23", "deltam31"]);
    }

    #[test]
    fn test_reselect_is_idempotent() {
        let mut s = selector();
        s.params_mut().set_value("deltam31", 2.6e-3).unwrap();
        s.select(&["NH"]).unwrap();
        assert_eq!(s.params().get("deltam31").unwrap().value(), 2.6e-3);
    }

    #[test]
    fn test_empty_selection_restores_regular_set() {
        let regular = ParamSet::new(vec![
            Param::new("theta23", 42.0, Unit::Degree).with_range(31.0, 59.0),
            Param::new("deltam31", 2.5e-3, Unit::ElectronVoltSquared).with_range(1e-3, 5e-3),
        ])
        .unwrap();
        let mut variants = BTreeMap::new();
        variants.insert(
            "ih".to_string(),
            vec![
                Param::new("deltam31", -2.4e-3, Unit::ElectronVoltSquared).with_range(-5e-3, -1e-3),
                Param::new("ih_only", 1.0, Unit::Dimensionless).fixed(),
            ],
        );
        let mut s = ParamSelector::new::<&str>(regular.clone(), variants, &[]).unwrap();
        s.select(&["ih"]).unwrap();
        assert_eq!(s.params().get("deltam31").unwrap().value(), -2.4e-3);
        assert!(s.params().contains("ih_only"));

        s.select::<&str>(&[]).unwrap();
        assert!(s.selected().is_empty());
        assert_eq!(s.params(), &regular);
    }

    #[test]
    fn test_empty_selection_returns_to_default_variant() {
        let mut s = selector();
        assert_eq!(s.default_selection(), &["nh".to_string()][..]);
        s.select(&["ih"]).unwrap();
        s.select::<&str>(&[]).unwrap();
        assert_eq!(s.selected(), &["nh".to_string()][..]);
        assert_eq!(s.params().get("deltam31").unwrap().value(), 2.5e-3);
    }

    #[test]
    fn test_switching_drops_variant_only_params() {
        let regular = ParamSet::new(vec![
            Param::new("theta23", 42.0, Unit::Degree).with_range(31.0, 59.0),
        ])
        .unwrap();
        let mut variants = BTreeMap::new();
        variants.insert(
            "ih".to_string(),
            vec![Param::new("deltam31", -2.4e-3, Unit::ElectronVoltSquared)
                .with_range(-5e-3, -1e-3)],
        );
        let mut s = ParamSelector::new::<&str>(regular, variants, &[]).unwrap();
        s.select(&["ih"]).unwrap();
        assert_eq!(s.params().names(), vec!["theta23", "deltam31"]);
        s.select::<&str>(&[]).unwrap();
        assert_eq!(s.params().names(), vec!["theta23"]);
    }

    #[test]
    fn test_unknown_and_conflicting_labels() {
        let mut s = selector();
        assert!(matches!(s.select(&["qh"]), Err(Error::Configuration(_))));
        assert!(matches!(s.select(&["nh", "ih"]), Err(Error::Configuration(_))));
    }
}
