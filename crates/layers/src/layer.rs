use serde::{Deserialize, Serialize};
use streaming::{LayerCache, LayerKey, LayerVariant};

/// Static description of one thematic layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub key: LayerKey,
    /// Rendering-surface data source fed by this layer's cache.
    pub source_id: String,
    /// Locator handed to the spatial source.
    pub locator: String,
    /// Rendering-surface layer whose visibility this layer controls.
    pub render_layer_id: String,
    /// Set for forecast layers: the historical layer they are compared with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<LayerKey>,
}

impl LayerDescriptor {
    pub fn base(key: &str, source_id: &str, locator: &str) -> Self {
        Self {
            key: LayerKey::new(key),
            source_id: source_id.to_string(),
            locator: locator.to_string(),
            render_layer_id: format!("{key}-layer"),
            baseline: None,
        }
    }

    pub fn forecast(key: &str, source_id: &str, locator: &str, baseline: &str) -> Self {
        Self {
            baseline: Some(LayerKey::new(baseline)),
            ..Self::base(key, source_id, locator)
        }
    }

    pub fn is_forecast(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn variant(&self) -> LayerVariant {
        match &self.baseline {
            Some(baseline) => LayerVariant::Forecast {
                baseline: baseline.clone(),
            },
            None => LayerVariant::Base,
        }
    }

    /// Fresh, empty cache for this layer.
    pub fn new_cache(&self) -> LayerCache {
        LayerCache::new(
            self.key.clone(),
            self.source_id.clone(),
            self.locator.clone(),
            self.variant(),
        )
    }
}
