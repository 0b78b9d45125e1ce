use foundation::ids::FeatureId;
use foundation::time::Week;
use serde_json::{Map, Value};

use crate::timeseries::Timeseries;

/// Property holding the stable natural key used for de-duplication.
pub const NATURAL_KEY_PROPERTY: &str = "name";

/// Property holding the weekly values, as an object or quoted string.
pub const TIMESERIES_PROPERTY: &str = "timeseries";

/// One raw record as yielded by a spatial source.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

impl FeatureRecord {
    pub fn new(geometry: Value, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Build from a GeoJSON `Feature` object.
    pub fn from_geojson(value: Value) -> Option<Self> {
        let Value::Object(mut obj) = value else {
            return None;
        };
        let geometry = obj.remove("geometry").unwrap_or(Value::Null);
        let properties = match obj.remove("properties") {
            Some(Value::Object(props)) => props,
            _ => Map::new(),
        };
        Some(Self::new(geometry, properties))
    }

    pub fn natural_key(&self) -> Option<&str> {
        self.properties
            .get(NATURAL_KEY_PROPERTY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// True only for an explicit boolean `true`.
    pub fn flag(&self, attribute: &str) -> bool {
        matches!(self.properties.get(attribute), Some(Value::Bool(true)))
    }
}

/// A resident feature: identity, opaque geometry and normalized weekly data.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub key: String,
    pub geometry: Value,
    /// Remaining source properties, minus the raw timeseries.
    pub properties: Map<String, Value>,
    pub timeseries: Timeseries,
    pub avg_value: Option<f64>,
}

impl Feature {
    /// Normalize a record into a feature. `masked` nulls every week.
    pub fn ingest(id: FeatureId, key: String, mut record: FeatureRecord, masked: bool) -> Self {
        let raw = record.properties.remove(TIMESERIES_PROPERTY);
        let mut timeseries = Timeseries::from_property(raw.as_ref());
        if masked {
            timeseries.mask();
        }
        let avg_value = timeseries.mean();
        Self {
            id,
            key,
            geometry: record.geometry,
            properties: record.properties,
            timeseries,
            avg_value,
        }
    }

    pub fn value_at(&self, week: Week) -> Option<f64> {
        self.timeseries.get(week)
    }
}

#[cfg(test)]
mod tests {
    use super::{Feature, FeatureRecord};
    use foundation::ids::FeatureId;
    use serde_json::json;

    fn record(props: serde_json::Value) -> FeatureRecord {
        FeatureRecord::from_geojson(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [11.1, 46.0]},
            "properties": props
        }))
        .unwrap()
    }

    #[test]
    fn natural_key_requires_non_empty_name() {
        assert_eq!(record(json!({"name": "Trento"})).natural_key(), Some("Trento"));
        assert_eq!(record(json!({"name": ""})).natural_key(), None);
        assert_eq!(record(json!({"name": 7})).natural_key(), None);
        assert_eq!(record(json!({})).natural_key(), None);
    }

    #[test]
    fn flag_is_true_only_for_boolean_true() {
        assert!(record(json!({"in": true})).flag("in"));
        assert!(!record(json!({"in": "true"})).flag("in"));
        assert!(!record(json!({"in": 1})).flag("in"));
        assert!(!record(json!({})).flag("in"));
    }

    #[test]
    fn ingest_normalizes_and_averages() {
        let rec = record(json!({"name": "Rovereto", "timeseries": "{'20': 0.2, '21': 0.4}"}));
        let f = Feature::ingest(FeatureId::new(3), "Rovereto".into(), rec, false);
        assert_eq!(f.value_at(21), Some(0.4));
        assert!((f.avg_value.unwrap() - 0.3).abs() < 1e-12);
        assert!(!f.properties.contains_key("timeseries"));
        assert_eq!(f.properties["name"], json!("Rovereto"));
    }

    #[test]
    fn masked_ingest_keeps_identity_and_geometry() {
        let rec = record(json!({"name": "Bolzano", "timeseries": {"20": 0.9}}));
        let geometry = rec.geometry.clone();
        let f = Feature::ingest(FeatureId::new(9), "Bolzano".into(), rec, true);
        assert_eq!(f.id, FeatureId::new(9));
        assert_eq!(f.geometry, geometry);
        assert_eq!(f.timeseries.len(), 1);
        assert_eq!(f.value_at(20), None);
        assert_eq!(f.avg_value, None);
    }
}
