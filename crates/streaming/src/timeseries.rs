use std::collections::BTreeMap;

use foundation::time::Week;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Weekly activity values for one feature.
///
/// A present key with `None` means "no data" for that week, the same as an
/// absent key when projecting, but it still counts as a modelled week.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeseries {
    values: BTreeMap<Week, Option<f64>>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw `timeseries` property.
    ///
    /// Accepts a JSON object or a string holding single-quoted JSON-like text
    /// (`{'15': 0.12}`). Anything unparseable degrades to an empty series.
    pub fn from_property(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::new(),
            Some(Value::Object(map)) => Self::from_object(map),
            Some(Value::String(text)) => match Self::parse_str(text) {
                Ok(series) => series,
                Err(err) => {
                    warn!(raw = %text, "could not parse timeseries property: {err}");
                    Self::new()
                }
            },
            Some(other) => {
                warn!(raw = %other, "timeseries property is neither object nor string");
                Self::new()
            }
        }
    }

    pub fn parse_str(text: &str) -> Result<Self, serde_json::Error> {
        let normalized = text.replace('\'', "\"");
        let map: Map<String, Value> = serde_json::from_str(&normalized)?;
        Ok(Self::from_object(&map))
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in map {
            let Ok(week) = key.trim().parse::<Week>() else {
                debug!(key = %key, "skipping non-week timeseries key");
                continue;
            };
            let numeric = value.as_f64().filter(|v| v.is_finite());
            values.insert(week, numeric);
        }
        Self { values }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Week, Option<f64>)>) -> Self {
        Self {
            values: entries.into_iter().collect(),
        }
    }

    /// Numeric value for `week`, `None` when absent or null.
    pub fn get(&self, week: Week) -> Option<f64> {
        self.values.get(&week).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Week, Option<f64>)> + '_ {
        self.values.iter().map(|(w, v)| (*w, *v))
    }

    pub fn weeks(&self) -> impl Iterator<Item = Week> + '_ {
        self.values.keys().copied()
    }

    /// Arithmetic mean of the numeric entries.
    pub fn mean(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for v in self.values.values().flatten() {
            sum += v;
            count += 1;
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Null out every week while keeping the week keys.
    pub fn mask(&mut self) {
        for v in self.values.values_mut() {
            *v = None;
        }
    }
}
