use std::sync::Arc;

use foundation::ids::FeatureId;
use foundation::time::Week;
use streaming::{CacheRegistry, FeatureValue, LayerKey, LoadError, RenderSurface};

/// Paints one week of every resident feature onto the rendering surface.
///
/// Linear in the number of resident features, no I/O, idempotent.
pub struct FeatureStateProjector {
    registry: Arc<CacheRegistry>,
    surface: Arc<dyn RenderSurface>,
}

impl FeatureStateProjector {
    pub fn new(registry: Arc<CacheRegistry>, surface: Arc<dyn RenderSurface>) -> Self {
        Self { registry, surface }
    }

    /// Push `week`'s value (or the no-data marker) for every feature of `key`.
    ///
    /// Returns how many feature states were written; zero when the surface
    /// source does not exist yet.
    pub fn project(&self, key: &LayerKey, week: Week) -> Result<usize, LoadError> {
        let (source_id, states) = self.registry.read(key, |cache| {
            let states: Vec<(FeatureId, FeatureValue)> = cache
                .features()
                .map(|f| (f.id, FeatureValue::from(f.value_at(week))))
                .collect();
            (cache.source_id().to_string(), states)
        })?;

        if !self.surface.has_source(&source_id) {
            return Ok(0);
        }
        for (id, value) in &states {
            self.surface.set_feature_state(&source_id, *id, *value);
        }
        Ok(states.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::bounds::BoundingBox;
    use serde_json::json;
    use streaming::{
        CacheRegistry, FeatureRecord, FeatureValue, HeadlessSurface, IncrementalLoader,
        LayerCache, LayerKey, LayerVariant, LoaderSettings, MemorySource,
    };

    use super::FeatureStateProjector;

    async fn setup(with_source: bool) -> (FeatureStateProjector, Arc<HeadlessSurface>, Arc<CacheRegistry>) {
        let registry = Arc::new(CacheRegistry::new([LayerCache::new(
            LayerKey::new("nuts"),
            "nuts-src",
            "nuts.geojsonl",
            LayerVariant::Base,
        )]));
        let surface = Arc::new(HeadlessSurface::new(BoundingBox::new(0.0, 0.0, 5.0, 5.0)));
        surface.add_source("nuts-src");

        let src = Arc::new(MemorySource::new());
        src.insert(
            "nuts.geojsonl",
            vec![FeatureRecord::from_geojson(json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [1.0, 1.0]},
                "properties": {"name": "A", "timeseries": {"10": 0.4}}
            }))
            .unwrap()],
        );
        let loader = IncrementalLoader::new(
            registry.clone(),
            src,
            surface.clone(),
            LoaderSettings::default(),
        );
        loader
            .load(&LayerKey::new("nuts"), BoundingBox::new(0.0, 0.0, 5.0, 5.0))
            .await
            .unwrap();

        let target: Arc<HeadlessSurface> = if with_source {
            surface
        } else {
            Arc::new(HeadlessSurface::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0)))
        };
        (
            FeatureStateProjector::new(registry.clone(), target.clone()),
            target,
            registry,
        )
    }

    #[tokio::test]
    async fn projects_value_or_no_data_marker() {
        let (projector, surface, registry) = setup(true).await;
        let nuts = LayerKey::new("nuts");
        let id = registry.features(&nuts).unwrap()[0].id;

        assert_eq!(projector.project(&nuts, 11).unwrap(), 1);
        assert_eq!(surface.feature_state("nuts-src", id), Some(FeatureValue::NoData));

        projector.project(&nuts, 10).unwrap();
        assert_eq!(surface.feature_state("nuts-src", id), Some(FeatureValue::Value(0.4)));

        // Idempotent.
        projector.project(&nuts, 10).unwrap();
        assert_eq!(surface.feature_state("nuts-src", id), Some(FeatureValue::Value(0.4)));
    }

    #[tokio::test]
    async fn missing_surface_source_is_a_no_op() {
        let (projector, surface, registry) = setup(false).await;
        let nuts = LayerKey::new("nuts");
        let id = registry.features(&nuts).unwrap()[0].id;
        assert_eq!(projector.project(&nuts, 10).unwrap(), 0);
        assert_eq!(surface.feature_state("nuts-src", id), None);
    }

    #[tokio::test]
    async fn unknown_layer_is_an_error() {
        let (projector, _, _) = setup(true).await;
        assert!(projector.project(&LayerKey::new("nope"), 10).is_err());
    }
}
