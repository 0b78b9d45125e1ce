use std::collections::BTreeMap;

use foundation::time::{Season, Week};
use serde::Serialize;
use streaming::{CacheRegistry, Feature, LayerKey, LoadError};
use tracing::debug;

pub struct Statistics;

impl Statistics {
    pub fn mean(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
        let first = *values.first()?;
        let mut min = first;
        let mut max = first;
        for &v in values.iter().skip(1) {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

/// Cross-feature summary of one layer's resident features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerAggregate {
    pub week: Week,
    /// Mean of the features reporting a value for `week`.
    pub current: Option<f64>,
    /// Largest value over all weeks and features.
    pub peak: Option<f64>,
    /// Mean over all weeks and features.
    pub average: Option<f64>,
    /// Cross-feature mean per week; `None` where no feature reports.
    pub per_week: BTreeMap<Week, Option<f64>>,
}

/// Aggregate `features` for `week`.
///
/// The week domain is the whole season plus any week observed in a
/// timeseries, so data outside the season still counts toward peak and
/// average.
pub fn aggregate<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    season: &Season,
    week: Week,
) -> LayerAggregate {
    let mut buckets: BTreeMap<Week, Vec<f64>> = season.weeks().map(|w| (w, Vec::new())).collect();
    for feature in features {
        for (w, value) in feature.timeseries.iter() {
            let bucket = buckets.entry(w).or_default();
            if let Some(v) = value.filter(|v| v.is_finite()) {
                bucket.push(v);
            }
        }
    }

    let all: Vec<f64> = buckets.values().flatten().copied().collect();
    let per_week: BTreeMap<Week, Option<f64>> = buckets
        .iter()
        .map(|(w, values)| (*w, Statistics::mean(values)))
        .collect();

    LayerAggregate {
        week,
        current: per_week.get(&week).copied().flatten(),
        peak: Statistics::min_max(&all).map(|(_, max)| max),
        average: Statistics::mean(&all),
        per_week,
    }
}

/// Aggregate the resident features of layer `key`.
pub fn aggregate_layer(
    registry: &CacheRegistry,
    key: &LayerKey,
    season: &Season,
    week: Week,
) -> Result<LayerAggregate, LoadError> {
    let features = registry.features(key)?;
    debug!(layer = %key, features = features.len(), week, "aggregating layer");
    Ok(aggregate(features.iter().map(|f| f.as_ref()), season, week))
}

/// The same summary for a single selected feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub key: String,
    pub week: Week,
    pub current: Option<f64>,
    pub peak: Option<f64>,
    pub average: Option<f64>,
}

impl FeatureSummary {
    pub fn of(feature: &Feature, week: Week) -> Self {
        let values: Vec<f64> = feature.timeseries.iter().filter_map(|(_, v)| v).collect();
        Self {
            key: feature.key.clone(),
            week,
            current: feature.value_at(week),
            peak: Statistics::min_max(&values).map(|(_, max)| max),
            average: Statistics::mean(&values),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ActivityLevel {
    /// Classify a percentage (0..=100).
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage > 75.0 {
            ActivityLevel::VeryHigh
        } else if percentage >= 50.0 {
            ActivityLevel::High
        } else if percentage >= 25.0 {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::Low
        }
    }

    /// Classify a raw index in `0.0..=1.0`.
    pub fn from_index(value: f64) -> Self {
        Self::from_percentage(value * 100.0)
    }

    pub fn label(self) -> &'static str {
        match self {
            ActivityLevel::Low => "Low",
            ActivityLevel::Moderate => "Moderate",
            ActivityLevel::High => "High",
            ActivityLevel::VeryHigh => "Very High",
        }
    }
}

impl std::fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
