//! Parameter vectors and the `key-value_key-value` run directory convention.
//!
//! The same convention names simulator output folders and recovers the
//! parameters of existing folders, so both directions live here.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};

/// Separates `key-value` tokens in a directory name.
pub const TOKEN_SEPARATOR: &str = "_";
/// Separates key and value inside a token.
pub const VALUE_SEPARATOR: &str = "-";

/// Ordered prior-name → value mapping for one simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParameterVector {
    entries: IndexMap<String, f64>,
}

impl ParameterVector {
    pub fn new(entries: IndexMap<String, f64>) -> Self {
        Self { entries }
    }

    /// Pair `names` with `values` positionally.
    pub fn from_values(names: &[&str], values: &[f64]) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::Dimension(format!(
                "{} parameter values for {} parameters",
                values.len(),
                names.len()
            )));
        }
        Ok(Self {
            entries: names
                .iter()
                .map(|n| n.to_string())
                .zip(values.iter().copied())
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.values().copied().collect()
    }

    /// Directory name for a run with these parameters followed by `fixed`.
    pub fn dir_name(&self, fixed: &IndexMap<String, f64>) -> String {
        self.iter()
            .chain(fixed.iter().map(|(k, &v)| (k.as_str(), v)))
            .map(|(key, value)| format!("{key}{}{value}", VALUE_SEPARATOR))
            .collect::<Vec<_>>()
            .join(TOKEN_SEPARATOR)
    }

    /// `-key=value` overrides handed to the simulator.
    pub fn simulator_overrides(&self, fixed: &IndexMap<String, f64>) -> Vec<String> {
        self.iter()
            .chain(fixed.iter().map(|(k, &v)| (k.as_str(), v)))
            .map(|(key, value)| format!("-{key}={value}"))
            .collect()
    }

    /// Recover the vector for `prior_names` from a run directory name.
    pub fn from_dir_name(name: &str, prior_names: &[&str], precision: u32) -> Result<Self> {
        let found = parse_dir_name(name, prior_names)?;
        let mut entries = IndexMap::with_capacity(prior_names.len());
        for &prior in prior_names {
            let value = found.get(prior).ok_or_else(|| Error::DirectoryName {
                name: name.to_string(),
                message: format!("missing parameter '{prior}'"),
            })?;
            entries.insert(prior.to_string(), round_to(*value, precision));
        }
        Ok(Self { entries })
    }
}

/// Round to `digits` decimal digits.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round() / scale
}

/// Collect every `key-value` token of `name`.
///
/// Tokens without a value (a leading sweep index, a failure tag) are skipped
/// or, when a known key itself contains `_` (`b_cf`), glued back onto the
/// following token. Values of keys outside `known` that fail to parse are
/// ignored.
pub fn parse_dir_name(name: &str, known: &[&str]) -> Result<IndexMap<String, f64>> {
    let mut found = IndexMap::new();
    let mut pending: Vec<&str> = Vec::new();
    for token in name.split(TOKEN_SEPARATOR) {
        let Some((head, raw)) = token.split_once(VALUE_SEPARATOR) else {
            pending.push(token);
            continue;
        };
        pending.push(head);
        let key = resolve_key(&pending, known);
        pending.clear();

        match raw.parse::<f64>() {
            Ok(value) => {
                found.insert(key, value);
            }
            Err(_) if known.contains(&key.as_str()) => {
                return Err(Error::DirectoryName {
                    name: name.to_string(),
                    message: format!("value '{raw}' of '{key}' is not a number"),
                });
            }
            Err(_) => {}
        }
    }
    Ok(found)
}

/// Longest run of trailing fragments that forms a known key, else the last
/// fragment alone.
fn resolve_key(fragments: &[&str], known: &[&str]) -> String {
    (0..fragments.len())
        .map(|start| fragments[start..].join(TOKEN_SEPARATOR))
        .find(|candidate| known.contains(&candidate.as_str()))
        .unwrap_or_else(|| fragments.last().copied().unwrap_or_default().to_string())
}
