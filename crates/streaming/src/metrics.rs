use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::cache::LayerKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadEvent {
    /// Viewport already inside the loaded envelope; no fetch.
    CacheHit,
    Fetch,
    Staged,
    Duplicate,
    /// Record without a usable natural key.
    Dropped,
    Masked,
    Failed,
}

impl LoadEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadEvent::CacheHit => "cache_hit",
            LoadEvent::Fetch => "fetch",
            LoadEvent::Staged => "staged",
            LoadEvent::Duplicate => "duplicate",
            LoadEvent::Dropped => "dropped",
            LoadEvent::Masked => "masked",
            LoadEvent::Failed => "failed",
        }
    }
}

/// Per-layer load counters.
///
/// Sorted maps keep snapshots in a stable order for logs and tests.
#[derive(Debug, Default)]
pub struct LoadMetrics {
    counters: Mutex<BTreeMap<(LayerKey, LoadEvent), u64>>,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, layer: &LayerKey, event: LoadEvent, by: u64) {
        if by == 0 {
            return;
        }
        *self
            .counters
            .lock()
            .entry((layer.clone(), event))
            .or_insert(0) += by;
    }

    pub fn count(&self, layer: &LayerKey, event: LoadEvent) -> u64 {
        self.counters
            .lock()
            .get(&(layer.clone(), event))
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<(LayerKey, LoadEvent, u64)> {
        self.counters
            .lock()
            .iter()
            .map(|((layer, event), n)| (layer.clone(), *event, *n))
            .collect()
    }
}
