use std::sync::Arc;

use streaming::{Feature, LayerKey};

/// The currently selected feature, scoped to the layer it was picked on.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    picked: Option<(LayerKey, Arc<Feature>)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, layer: LayerKey, feature: Arc<Feature>) {
        self.picked = Some((layer, feature));
    }

    pub fn clear(&mut self) {
        self.picked = None;
    }

    pub fn is_empty(&self) -> bool {
        self.picked.is_none()
    }

    pub fn layer(&self) -> Option<&LayerKey> {
        self.picked.as_ref().map(|(layer, _)| layer)
    }

    pub fn feature(&self) -> Option<&Arc<Feature>> {
        self.picked.as_ref().map(|(_, feature)| feature)
    }

    /// The selected feature, only if it was picked on `layer`.
    pub fn feature_on(&self, layer: &LayerKey) -> Option<&Arc<Feature>> {
        match &self.picked {
            Some((picked_on, feature)) if picked_on == layer => Some(feature),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::ids::FeatureId;
    use serde_json::{Map, Value};
    use streaming::{Feature, LayerKey, Timeseries};

    use super::Selection;

    #[test]
    fn selection_is_layer_scoped() {
        let feature = Arc::new(Feature {
            id: FeatureId::new(1),
            key: "Trento".into(),
            geometry: Value::Null,
            properties: Map::new(),
            timeseries: Timeseries::new(),
            avg_value: None,
        });
        let mut sel = Selection::new();
        assert!(sel.is_empty());

        sel.select(LayerKey::new("nuts"), feature);
        assert_eq!(sel.layer(), Some(&LayerKey::new("nuts")));
        assert!(sel.feature_on(&LayerKey::new("nuts")).is_some());
        assert!(sel.feature_on(&LayerKey::new("commune")).is_none());

        sel.clear();
        assert!(sel.feature().is_none());
    }
}
