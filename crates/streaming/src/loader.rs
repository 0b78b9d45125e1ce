use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use foundation::bounds::BoundingBox;
use futures_util::StreamExt;
use tracing::{debug, error, info};

use crate::cache::{CacheRegistry, CacheSlot, LayerKey};
use crate::error::{LoadError, SourceError};
use crate::feature::Feature;
use crate::metrics::{LoadEvent, LoadMetrics};
use crate::source::SpatialSource;
use crate::surface::RenderSurface;

/// Default attribute marking a record as inside the study area.
pub const DEFAULT_EXTENT_ATTRIBUTE: &str = "study_area_extent_trentino";

/// Out-of-study-area masking for forecast layers.
///
/// The flag is read once at the start of every load, so flipping it affects
/// subsequent loads only.
#[derive(Debug)]
pub struct MaskingPolicy {
    enabled: AtomicBool,
    extent_attribute: String,
}

impl MaskingPolicy {
    pub fn new(enabled: bool, extent_attribute: impl Into<String>) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            extent_attribute: extent_attribute.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, DEFAULT_EXTENT_ATTRIBUTE)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn extent_attribute(&self) -> &str {
        &self.extent_attribute
    }
}

impl Default for MaskingPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Default)]
pub struct LoaderSettings {
    pub masking: MaskingPolicy,
    /// Give up waiting for the surface after this long. `None` waits forever.
    pub ack_timeout: Option<Duration>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The viewport was already covered; nothing was fetched.
    CacheHit,
    /// The rendering surface has no source for this layer yet.
    SourceMissing,
    /// Fetched, but every record was already resident or unusable.
    NoNewFeatures,
    Committed { added: usize },
}

/// Fills layer caches for a viewport from a spatial source.
///
/// Loads on the same cache are queued behind each other; loads on different
/// caches are independent. A load is never cancelled: if the active layer
/// changes mid-flight it still commits into its own cache.
pub struct IncrementalLoader {
    registry: Arc<CacheRegistry>,
    source: Arc<dyn SpatialSource>,
    surface: Arc<dyn RenderSurface>,
    settings: LoaderSettings,
    metrics: LoadMetrics,
}

struct Staged {
    features: Vec<Feature>,
    keys: HashSet<String>,
}

impl IncrementalLoader {
    pub fn new(
        registry: Arc<CacheRegistry>,
        source: Arc<dyn SpatialSource>,
        surface: Arc<dyn RenderSurface>,
        settings: LoaderSettings,
    ) -> Self {
        Self {
            registry,
            source,
            surface,
            settings,
            metrics: LoadMetrics::new(),
        }
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn surface(&self) -> &Arc<dyn RenderSurface> {
        &self.surface
    }

    pub fn masking(&self) -> &MaskingPolicy {
        &self.settings.masking
    }

    pub fn metrics(&self) -> &LoadMetrics {
        &self.metrics
    }

    /// Make every feature of `key` intersecting `viewport` resident.
    ///
    /// Resolves only after the rendering surface acknowledged the new data.
    /// On a source failure the records staged so far are still committed,
    /// but the loaded envelope is not advanced, so a later call retries.
    pub async fn load(
        &self,
        key: &LayerKey,
        viewport: BoundingBox,
    ) -> Result<LoadOutcome, LoadError> {
        let slot = self.registry.slot(key)?;
        if slot.covers(&viewport) {
            self.metrics.record(key, LoadEvent::CacheHit, 1);
            return Ok(LoadOutcome::CacheHit);
        }

        let _gate = slot.load_gate.lock().await;

        let (source_id, locator, forecast) = {
            let cache = slot.cache.lock();
            // A load queued ahead of us may have covered this viewport.
            if cache.covers(&viewport) {
                self.metrics.record(key, LoadEvent::CacheHit, 1);
                return Ok(LoadOutcome::CacheHit);
            }
            (
                cache.source_id().to_string(),
                cache.locator().to_string(),
                cache.is_forecast(),
            )
        };

        if !self.surface.has_source(&source_id) {
            debug!(layer = %key, source = %source_id, "render source not ready, skipping load");
            return Ok(LoadOutcome::SourceMissing);
        }

        let mask = forecast && self.settings.masking.is_enabled();
        self.metrics.record(key, LoadEvent::Fetch, 1);
        let (staged, failure) = self.stage(key, &slot, &locator, viewport, mask).await;

        let added = if staged.features.is_empty() {
            0
        } else {
            match self.commit(&slot, &source_id, staged.features).await {
                Ok(added) => added,
                Err(commit_err) => {
                    if let Some(err) = &failure {
                        self.metrics.record(key, LoadEvent::Failed, 1);
                        error!(layer = %key, "load aborted: {err}");
                    }
                    return Err(commit_err);
                }
            }
        };

        if let Some(err) = failure {
            self.metrics.record(key, LoadEvent::Failed, 1);
            error!(layer = %key, committed = added, "load aborted: {err}");
            return Err(LoadError::Source(err));
        }

        slot.cache.lock().extend_bounds(viewport);

        if added == 0 {
            debug!(layer = %key, "no new features in viewport");
            Ok(LoadOutcome::NoNewFeatures)
        } else {
            info!(layer = %key, features = added, "loaded features");
            Ok(LoadOutcome::Committed { added })
        }
    }

    /// Drain the source stream into a staging batch, in yield order.
    async fn stage(
        &self,
        key: &LayerKey,
        slot: &CacheSlot,
        locator: &str,
        viewport: BoundingBox,
        mask: bool,
    ) -> (Staged, Option<SourceError>) {
        let extent_attribute = self.settings.masking.extent_attribute();
        let mut staged = Staged {
            features: Vec::new(),
            keys: HashSet::new(),
        };
        let mut records = self.source.query(locator, viewport);

        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(err) => return (staged, Some(err)),
            };
            let Some(natural_key) = record.natural_key().map(str::to_string) else {
                self.metrics.record(key, LoadEvent::Dropped, 1);
                continue;
            };
            let resident = slot.cache.lock().contains_key(&natural_key);
            if resident || staged.keys.contains(&natural_key) {
                self.metrics.record(key, LoadEvent::Duplicate, 1);
                continue;
            }

            let out_of_extent = mask && !record.flag(extent_attribute);
            if out_of_extent {
                self.metrics.record(key, LoadEvent::Masked, 1);
            }
            let id = self.registry.ids().next_id();
            staged.keys.insert(natural_key.clone());
            staged
                .features
                .push(Feature::ingest(id, natural_key, record, out_of_extent));
            self.metrics.record(key, LoadEvent::Staged, 1);
        }
        (staged, None)
    }

    /// Merge staged features and hand the full set to the surface.
    async fn commit(
        &self,
        slot: &CacheSlot,
        source_id: &str,
        staged: Vec<Feature>,
    ) -> Result<usize, LoadError> {
        let (added, snapshot) = {
            let mut cache = slot.cache.lock();
            let added = cache.merge(staged);
            (added, cache.snapshot())
        };

        let (ack, pending) = slot.ack.register(source_id)?;
        self.surface.replace_source_data(source_id, snapshot, ack)?;
        pending.wait(self.settings.ack_timeout).await?;
        Ok(added)
    }
}
