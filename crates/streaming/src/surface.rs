//! The rendering-surface seam and the single-shot hand-off acknowledgment.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use foundation::bounds::BoundingBox;
use foundation::ids::FeatureId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{LoadError, SurfaceError};
use crate::feature::Feature;

/// Per-feature auxiliary render state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FeatureValue {
    Value(f64),
    /// Explicit "no data" marker, distinct from zero.
    NoData,
}

impl From<Option<f64>> for FeatureValue {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(v) => FeatureValue::Value(v),
            None => FeatureValue::NoData,
        }
    }
}

/// Map rendering surface as seen by the feature cache.
///
/// Missing sources and layers are benign startup races: implementations treat
/// state and visibility updates for them as no-ops.
pub trait RenderSurface: Send + Sync {
    /// Currently visible map extent.
    fn viewport(&self) -> BoundingBox;

    /// True once the named data source exists and can accept data.
    fn has_source(&self, source_id: &str) -> bool;

    /// Replace the full feature collection of `source_id`.
    ///
    /// `ack` must be completed once the surface has finished processing the
    /// new data. Dropping it uncompleted fails the waiting load.
    fn replace_source_data(
        &self,
        source_id: &str,
        features: Vec<Arc<Feature>>,
        ack: SourceAck,
    ) -> Result<(), SurfaceError>;

    fn set_feature_state(&self, source_id: &str, id: FeatureId, value: FeatureValue);

    fn set_layer_visibility(&self, layer_id: &str, visible: bool);
}

/// Completion handle for one data hand-off.
#[derive(Debug)]
pub struct SourceAck {
    source_id: String,
    tx: oneshot::Sender<()>,
}

impl SourceAck {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn complete(self) {
        // The loader may have timed out and gone away; nothing to report then.
        let _ = self.tx.send(());
    }
}

/// Guards the one-outstanding-acknowledgment-per-cache rule.
#[derive(Debug, Default)]
pub struct AckSlot {
    pending: AtomicBool,
}

impl AckSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Reserve the slot. Fails if an acknowledgment is still outstanding.
    pub fn register(&self, source_id: &str) -> Result<(SourceAck, PendingAck<'_>), LoadError> {
        if self.pending.swap(true, Ordering::AcqRel) {
            return Err(LoadError::AckPending {
                source_id: source_id.to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        let ack = SourceAck {
            source_id: source_id.to_string(),
            tx,
        };
        let pending = PendingAck {
            slot: self,
            source_id: source_id.to_string(),
            rx,
        };
        Ok((ack, pending))
    }
}

/// Receiving side of a reserved [`AckSlot`]; releases the slot when dropped.
#[derive(Debug)]
pub struct PendingAck<'a> {
    slot: &'a AckSlot,
    source_id: String,
    rx: oneshot::Receiver<()>,
}

impl PendingAck<'_> {
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<(), LoadError> {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(r) => r,
                Err(_) => {
                    return Err(LoadError::AckTimeout {
                        source_id: self.source_id.clone(),
                        waited: limit,
                    });
                }
            },
            None => (&mut self.rx).await,
        };
        received.map_err(|_| LoadError::AckDropped {
            source_id: self.source_id.clone(),
        })
    }
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        self.slot.pending.store(false, Ordering::Release);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AckMode {
    /// Complete every hand-off as soon as it is received.
    Immediate,
    /// Hold acknowledgments until [`HeadlessSurface::flush_acks`].
    Manual,
}

#[derive(Debug, Default)]
struct SourceData {
    features: Vec<Arc<Feature>>,
    revision: u64,
}

#[derive(Debug)]
struct HeadlessState {
    viewport: BoundingBox,
    sources: BTreeMap<String, SourceData>,
    layers: BTreeMap<String, bool>,
    states: HashMap<(String, FeatureId), FeatureValue>,
    held_acks: Vec<SourceAck>,
}

/// In-memory rendering surface for headless runs and tests.
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
    ack_mode: AckMode,
}

impl HeadlessSurface {
    pub fn new(viewport: BoundingBox) -> Self {
        Self::with_ack_mode(viewport, AckMode::Immediate)
    }

    pub fn with_ack_mode(viewport: BoundingBox, ack_mode: AckMode) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                viewport,
                sources: BTreeMap::new(),
                layers: BTreeMap::new(),
                states: HashMap::new(),
                held_acks: Vec::new(),
            }),
            ack_mode,
        }
    }

    pub fn add_source(&self, source_id: impl Into<String>) {
        self.state
            .lock()
            .sources
            .entry(source_id.into())
            .or_default();
    }

    /// Register a render layer, initially hidden.
    pub fn add_layer(&self, layer_id: impl Into<String>) {
        self.state.lock().layers.entry(layer_id.into()).or_insert(false);
    }

    pub fn set_viewport(&self, viewport: BoundingBox) {
        self.state.lock().viewport = viewport;
    }

    pub fn source_features(&self, source_id: &str) -> Vec<Arc<Feature>> {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map(|s| s.features.clone())
            .unwrap_or_default()
    }

    /// Number of data replacements the source has received.
    pub fn source_revision(&self, source_id: &str) -> u64 {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map_or(0, |s| s.revision)
    }

    pub fn feature_state(&self, source_id: &str, id: FeatureId) -> Option<FeatureValue> {
        self.state
            .lock()
            .states
            .get(&(source_id.to_string(), id))
            .copied()
    }

    pub fn layer_visible(&self, layer_id: &str) -> Option<bool> {
        self.state.lock().layers.get(layer_id).copied()
    }

    pub fn visible_layers(&self) -> Vec<String> {
        self.state
            .lock()
            .layers
            .iter()
            .filter(|(_, visible)| **visible)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn held_acks(&self) -> usize {
        self.state.lock().held_acks.len()
    }

    /// Complete every held acknowledgment. Returns how many were completed.
    pub fn flush_acks(&self) -> usize {
        let acks = std::mem::take(&mut self.state.lock().held_acks);
        let n = acks.len();
        for ack in acks {
            ack.complete();
        }
        n
    }
}

impl RenderSurface for HeadlessSurface {
    fn viewport(&self) -> BoundingBox {
        self.state.lock().viewport
    }

    fn has_source(&self, source_id: &str) -> bool {
        self.state.lock().sources.contains_key(source_id)
    }

    fn replace_source_data(
        &self,
        source_id: &str,
        features: Vec<Arc<Feature>>,
        ack: SourceAck,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        let Some(source) = state.sources.get_mut(source_id) else {
            return Err(SurfaceError::new(format!("no source named {source_id}")));
        };
        source.features = features;
        source.revision += 1;
        match self.ack_mode {
            AckMode::Immediate => ack.complete(),
            AckMode::Manual => state.held_acks.push(ack),
        }
        Ok(())
    }

    fn set_feature_state(&self, source_id: &str, id: FeatureId, value: FeatureValue) {
        let mut state = self.state.lock();
        if !state.sources.contains_key(source_id) {
            return;
        }
        state.states.insert((source_id.to_string(), id), value);
    }

    fn set_layer_visibility(&self, layer_id: &str, visible: bool) {
        if let Some(v) = self.state.lock().layers.get_mut(layer_id) {
            *v = visible;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AckSlot, FeatureValue};
    use crate::error::LoadError;

    #[tokio::test]
    async fn second_registration_is_rejected_while_pending() {
        let slot = AckSlot::new();
        let (ack, pending) = slot.register("src").unwrap();
        assert!(matches!(
            slot.register("src"),
            Err(LoadError::AckPending { .. })
        ));

        ack.complete();
        pending.wait(None).await.unwrap();
        assert!(!slot.is_pending());
        assert!(slot.register("src").is_ok());
    }

    #[tokio::test]
    async fn dropped_ack_fails_the_wait_and_frees_the_slot() {
        let slot = AckSlot::new();
        let (ack, pending) = slot.register("src").unwrap();
        drop(ack);
        assert!(matches!(
            pending.wait(None).await,
            Err(LoadError::AckDropped { .. })
        ));
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let slot = AckSlot::new();
        let (_ack, pending) = slot.register("src").unwrap();
        let err = pending
            .wait(Some(Duration::from_millis(250)))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::AckTimeout { .. }));
        assert!(!slot.is_pending());
    }

    #[test]
    fn missing_value_maps_to_no_data() {
        assert_eq!(FeatureValue::from(None), FeatureValue::NoData);
        assert_eq!(FeatureValue::from(Some(0.0)), FeatureValue::Value(0.0));
    }
}
