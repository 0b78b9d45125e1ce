use std::collections::BTreeSet;

use streaming::{CacheRegistry, LayerKey};

use crate::config::ConfigError;
use crate::layer::LayerDescriptor;

/// The fixed set of thematic layers known to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCatalog {
    layers: Vec<LayerDescriptor>,
}

impl LayerCatalog {
    /// Validate and build a catalog.
    ///
    /// Keys must be unique and every forecast's baseline must name a base
    /// layer of the same catalog.
    pub fn new(layers: Vec<LayerDescriptor>) -> Result<Self, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::Invalid("catalog has no layers".into()));
        }
        let mut seen = BTreeSet::new();
        for layer in &layers {
            if !seen.insert(layer.key.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate layer key {}",
                    layer.key
                )));
            }
        }
        for layer in &layers {
            let Some(baseline) = &layer.baseline else {
                continue;
            };
            match layers.iter().find(|l| &l.key == baseline) {
                Some(base) if !base.is_forecast() => {}
                Some(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "baseline {baseline} of {} is itself a forecast",
                        layer.key
                    )));
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "baseline {baseline} of {} is not a known layer",
                        layer.key
                    )));
                }
            }
        }
        Ok(Self { layers })
    }

    /// Mosquito model grid, NUTS3 regions and municipalities, each with a
    /// 2025 forecast variant.
    pub fn dashboard_default() -> Self {
        Self {
            layers: default_layers(),
        }
    }

    pub fn get(&self, key: &LayerKey) -> Option<&LayerDescriptor> {
        self.layers.iter().find(|l| &l.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerDescriptor> + '_ {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn first(&self) -> Option<&LayerDescriptor> {
        self.layers.first()
    }

    /// One empty cache per layer, created once for the application lifetime.
    pub fn build_registry(&self) -> CacheRegistry {
        CacheRegistry::new(self.layers.iter().map(LayerDescriptor::new_cache))
    }
}

pub fn default_layers() -> Vec<LayerDescriptor> {
    vec![
        LayerDescriptor::base("mosquito", "mosquito-data", "model_output_trentino.geojsonl"),
        LayerDescriptor::base("nuts", "nuts-regions", "EU_NUTS3_01M.geojsonl"),
        LayerDescriptor::base("commune", "communes", "IT_comuni.geojsonl"),
        LayerDescriptor::forecast(
            "mosquito_2025",
            "mosquito-data-2025",
            "model_output_trentino_2025.geojsonl",
            "mosquito",
        ),
        LayerDescriptor::forecast(
            "nuts_2025",
            "nuts-regions-2025",
            "EU_NUTS3_01M_2025.geojsonl",
            "nuts",
        ),
        LayerDescriptor::forecast(
            "commune_2025",
            "communes-2025",
            "IT_comuni_2025.geojsonl",
            "commune",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::LayerCatalog;
    use crate::config::ConfigError;
    use crate::layer::LayerDescriptor;
    use streaming::LayerKey;

    #[test]
    fn default_catalog_pairs_every_forecast_with_a_base() {
        let catalog = LayerCatalog::dashboard_default();
        assert_eq!(catalog.len(), 6);
        let validated = LayerCatalog::new(catalog.iter().cloned().collect()).unwrap();
        assert_eq!(validated, catalog);

        let forecast = catalog.get(&LayerKey::new("commune_2025")).unwrap();
        assert_eq!(forecast.baseline, Some(LayerKey::new("commune")));

        let registry = catalog.build_registry();
        assert_eq!(registry.keys().count(), 6);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = LayerCatalog::new(vec![
            LayerDescriptor::base("a", "a", "a"),
            LayerDescriptor::base("a", "b", "b"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_dangling_or_chained_baselines() {
        assert!(LayerCatalog::new(vec![LayerDescriptor::forecast("f", "f", "f", "missing")]).is_err());
        assert!(
            LayerCatalog::new(vec![
                LayerDescriptor::base("a", "a", "a"),
                LayerDescriptor::forecast("b", "b", "b", "a"),
                LayerDescriptor::forecast("c", "c", "c", "b"),
            ])
            .is_err()
        );
        assert!(LayerCatalog::new(Vec::new()).is_err());
    }
}
