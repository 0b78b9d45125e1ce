use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use foundation::bounds::{BoundingBox, contains, union};
use foundation::ids::{FeatureId, IdAllocator};
use parking_lot::Mutex;
use runtime::throttle::Throttle;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::feature::Feature;
use crate::surface::AckSlot;

/// Stable name of a thematic layer (`mosquito`, `nuts_2025`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerKey(String);

impl LayerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerVariant {
    Base,
    /// Future-year projection, compared against its `baseline` layer.
    Forecast { baseline: LayerKey },
}

/// Resident features of one layer plus the envelope of every viewport that
/// has been loaded for it.
///
/// Features are keyed by natural key and never evicted; `loaded_bounds` only
/// grows.
#[derive(Debug)]
pub struct LayerCache {
    key: LayerKey,
    source_id: String,
    locator: String,
    variant: LayerVariant,
    features: HashMap<String, Arc<Feature>>,
    loaded_bounds: Option<BoundingBox>,
}

impl LayerCache {
    pub fn new(
        key: LayerKey,
        source_id: impl Into<String>,
        locator: impl Into<String>,
        variant: LayerVariant,
    ) -> Self {
        Self {
            key,
            source_id: source_id.into(),
            locator: locator.into(),
            variant,
            features: HashMap::new(),
            loaded_bounds: None,
        }
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn variant(&self) -> &LayerVariant {
        &self.variant
    }

    pub fn is_forecast(&self) -> bool {
        matches!(self.variant, LayerVariant::Forecast { .. })
    }

    pub fn baseline(&self) -> Option<&LayerKey> {
        match &self.variant {
            LayerVariant::Forecast { baseline } => Some(baseline),
            LayerVariant::Base => None,
        }
    }

    pub fn loaded_bounds(&self) -> Option<BoundingBox> {
        self.loaded_bounds
    }

    /// True if `viewport` lies inside the already-loaded envelope.
    pub fn covers(&self, viewport: &BoundingBox) -> bool {
        self.loaded_bounds
            .is_some_and(|loaded| contains(viewport, &loaded))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains_key(&self, natural_key: &str) -> bool {
        self.features.contains_key(natural_key)
    }

    pub fn get(&self, natural_key: &str) -> Option<&Arc<Feature>> {
        self.features.get(natural_key)
    }

    pub fn find_by_id(&self, id: FeatureId) -> Option<&Arc<Feature>> {
        self.features.values().find(|f| f.id == id)
    }

    pub fn features(&self) -> impl Iterator<Item = &Arc<Feature>> + '_ {
        self.features.values()
    }

    /// All resident features ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Feature>> {
        let mut out: Vec<_> = self.features.values().cloned().collect();
        out.sort_by_key(|f| f.id);
        out
    }

    /// Insert features whose key is not yet resident. Returns how many landed.
    pub(crate) fn merge(&mut self, staged: Vec<Feature>) -> usize {
        let mut added = 0;
        for feature in staged {
            if self.features.contains_key(&feature.key) {
                continue;
            }
            self.features.insert(feature.key.clone(), Arc::new(feature));
            added += 1;
        }
        added
    }

    pub(crate) fn extend_bounds(&mut self, viewport: BoundingBox) {
        self.loaded_bounds = union(self.loaded_bounds, Some(viewport));
    }
}

/// A cache plus the coordination state around it.
#[derive(Debug)]
pub struct CacheSlot {
    pub(crate) cache: Mutex<LayerCache>,
    /// Queues loads on the same cache behind each other.
    pub(crate) load_gate: tokio::sync::Mutex<()>,
    pub(crate) ack: AckSlot,
    listener: Mutex<Option<Throttle>>,
}

impl CacheSlot {
    fn new(cache: LayerCache) -> Self {
        Self {
            cache: Mutex::new(cache),
            load_gate: tokio::sync::Mutex::new(()),
            ack: AckSlot::new(),
            listener: Mutex::new(None),
        }
    }

    /// Read access to the cache. The lock must not be held across an await.
    pub fn read<R>(&self, f: impl FnOnce(&LayerCache) -> R) -> R {
        f(&self.cache.lock())
    }

    pub fn covers(&self, viewport: &BoundingBox) -> bool {
        self.cache.lock().covers(viewport)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Fire the viewport-change listener, if one is attached.
    pub fn trigger_listener(&self) -> bool {
        match self.listener.lock().as_ref() {
            Some(throttle) => {
                throttle.trigger();
                true
            }
            None => false,
        }
    }

    fn replace_listener(&self, listener: Option<Throttle>) -> Option<Throttle> {
        std::mem::replace(&mut *self.listener.lock(), listener)
    }
}

/// Explicit context holding every layer cache and the shared id allocator.
///
/// Created once at startup; the set of layers never changes afterwards.
#[derive(Debug)]
pub struct CacheRegistry {
    slots: BTreeMap<LayerKey, Arc<CacheSlot>>,
    ids: IdAllocator,
}

impl CacheRegistry {
    pub fn new(caches: impl IntoIterator<Item = LayerCache>) -> Self {
        let slots = caches
            .into_iter()
            .map(|cache| (cache.key().clone(), Arc::new(CacheSlot::new(cache))))
            .collect();
        Self {
            slots,
            ids: IdAllocator::new(),
        }
    }

    pub fn slot(&self, key: &LayerKey) -> Result<Arc<CacheSlot>, LoadError> {
        self.slots
            .get(key)
            .cloned()
            .ok_or_else(|| LoadError::UnknownLayer(key.clone()))
    }

    pub fn contains(&self, key: &LayerKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &LayerKey> + '_ {
        self.slots.keys()
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn read<R>(&self, key: &LayerKey, f: impl FnOnce(&LayerCache) -> R) -> Result<R, LoadError> {
        Ok(self.slot(key)?.read(f))
    }

    /// Resident features of `key`, ordered by id.
    pub fn features(&self, key: &LayerKey) -> Result<Vec<Arc<Feature>>, LoadError> {
        self.read(key, LayerCache::snapshot)
    }

    /// Attach `listener` to `key`, detaching every other listener first so at
    /// most one exists across all caches.
    pub fn attach_listener(&self, key: &LayerKey, listener: Throttle) -> Result<(), LoadError> {
        let slot = self.slot(key)?;
        self.detach_listeners();
        slot.replace_listener(Some(listener));
        Ok(())
    }

    /// Detach every listener. Returns how many were attached.
    pub fn detach_listeners(&self) -> usize {
        self.slots
            .values()
            .filter_map(|slot| slot.replace_listener(None))
            .count()
    }

    pub fn listening_layer(&self) -> Option<LayerKey> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.has_listener())
            .map(|(key, _)| key.clone())
    }
}
