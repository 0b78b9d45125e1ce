use std::sync::Arc;

use streaming::{
    CacheRegistry, IncrementalLoader, LayerKey, LoadError, RenderSurface, SpatialSource,
};
use tracing::info;

use crate::catalog::LayerCatalog;
use crate::config::{ConfigError, DashboardConfig};
use crate::controller::{Activation, ControllerSettings, LayerLifecycleController};
use crate::projector::FeatureStateProjector;

/// Everything one map view needs, wired from a [`DashboardConfig`].
pub struct Dashboard {
    catalog: Arc<LayerCatalog>,
    registry: Arc<CacheRegistry>,
    loader: Arc<IncrementalLoader>,
    controller: Arc<LayerLifecycleController>,
    initial_layer: LayerKey,
}

impl Dashboard {
    pub fn new(
        config: &DashboardConfig,
        source: Arc<dyn SpatialSource>,
        surface: Arc<dyn RenderSurface>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);
        let initial_layer = match &config.initial_layer {
            Some(key) if catalog.get(key).is_some() => key.clone(),
            Some(key) => {
                return Err(ConfigError::Invalid(format!(
                    "initial layer {key} is not in the catalog"
                )));
            }
            None => catalog
                .first()
                .map(|layer| layer.key.clone())
                .ok_or_else(|| ConfigError::Invalid("no layers configured".into()))?,
        };

        let registry = Arc::new(catalog.build_registry());
        let loader = Arc::new(IncrementalLoader::new(
            Arc::clone(&registry),
            source,
            Arc::clone(&surface),
            config.loader_settings(),
        ));
        let projector = Arc::new(FeatureStateProjector::new(Arc::clone(&registry), surface));
        let controller = LayerLifecycleController::new(
            Arc::clone(&catalog),
            Arc::clone(&loader),
            projector,
            ControllerSettings {
                throttle_interval: config.throttle_interval(),
                playback_interval: config.playback_interval(),
                season: config.season,
            },
            config.start_week(),
        );
        info!(
            layers = catalog.len(),
            masking = config.limited_version,
            "dashboard configured"
        );

        Ok(Self {
            catalog,
            registry,
            loader,
            controller,
            initial_layer,
        })
    }

    /// Activate the startup layer.
    pub async fn start(&self) -> Result<Activation, LoadError> {
        self.controller.activate(&self.initial_layer).await
    }

    pub fn initial_layer(&self) -> &LayerKey {
        &self.initial_layer
    }

    pub fn catalog(&self) -> &Arc<LayerCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<IncrementalLoader> {
        &self.loader
    }

    pub fn controller(&self) -> &Arc<LayerLifecycleController> {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::bounds::BoundingBox;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::{FeatureRecord, HeadlessSurface, LayerKey, MemorySource};

    use super::Dashboard;
    use crate::config::{ConfigError, DashboardConfig};

    fn surface_for(config: &DashboardConfig) -> Arc<HeadlessSurface> {
        let surface = Arc::new(HeadlessSurface::new(BoundingBox::new(10.0, 45.0, 12.0, 47.0)));
        for layer in &config.layers {
            surface.add_source(layer.source_id.clone());
            surface.add_layer(layer.render_layer_id.clone());
        }
        surface
    }

    #[tokio::test]
    async fn starts_on_the_configured_forecast_with_masking_applied() {
        let config = DashboardConfig {
            limited_version: true,
            initial_layer: Some(LayerKey::new("mosquito_2025")),
            ..DashboardConfig::default()
        };
        let surface = surface_for(&config);
        let source = Arc::new(MemorySource::new());
        let forecast = config
            .layers
            .iter()
            .find(|l| l.key.as_str() == "mosquito_2025")
            .cloned()
            .unwrap();
        source.insert(
            forecast.locator.clone(),
            vec![
                FeatureRecord::from_geojson(json!({
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [11.1, 46.0]},
                    "properties": {
                        "name": "Trento",
                        "study_area_extent_trentino": true,
                        "timeseries": "{'15': 0.4}"
                    }
                }))
                .unwrap(),
                FeatureRecord::from_geojson(json!({
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [11.0, 45.4]},
                    "properties": {"name": "Verona", "timeseries": "{'15': 0.9}"}
                }))
                .unwrap(),
            ],
        );

        let dashboard = Dashboard::new(&config, source, surface.clone()).unwrap();
        assert_eq!(dashboard.initial_layer(), &forecast.key);
        dashboard.start().await.unwrap();

        assert_eq!(dashboard.controller().active_layer(), Some(forecast.key.clone()));
        assert_eq!(surface.visible_layers(), vec![forecast.render_layer_id.clone()]);
        let verona = dashboard
            .registry()
            .read(&forecast.key, |c| c.get("Verona").cloned())
            .unwrap()
            .unwrap();
        assert_eq!(verona.value_at(15), None);
        assert_eq!(verona.avg_value, None);
        let trento = dashboard
            .registry()
            .read(&forecast.key, |c| c.get("Trento").cloned())
            .unwrap()
            .unwrap();
        assert_eq!(trento.value_at(15), Some(0.4));
    }

    #[test]
    fn defaults_to_the_first_catalog_layer() {
        let config = DashboardConfig::default();
        let surface = surface_for(&config);
        let dashboard = Dashboard::new(&config, Arc::new(MemorySource::new()), surface).unwrap();
        assert_eq!(dashboard.initial_layer(), &config.layers[0].key);
        assert!(dashboard.controller().active_layer().is_none());
    }

    #[test]
    fn zero_playback_interval_is_rejected() {
        let config = DashboardConfig {
            playback_ms: 0,
            ..DashboardConfig::default()
        };
        let surface = surface_for(&config);
        let result = Dashboard::new(&config, Arc::new(MemorySource::new()), surface);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_initial_layer_is_rejected() {
        let config = DashboardConfig {
            initial_layer: Some(LayerKey::new("nope")),
            ..DashboardConfig::default()
        };
        let surface = surface_for(&config);
        let result = Dashboard::new(&config, Arc::new(MemorySource::new()), surface);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
