//! Active-layer lifecycle: activation, viewport-driven reloads, week slider,
//! playback and selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use foundation::ids::FeatureId;
use foundation::time::{Season, Week};
use parking_lot::Mutex;
use runtime::throttle::Throttle;
use runtime::ticker::Ticker;
use streaming::{Feature, IncrementalLoader, LayerKey, LoadError, LoadOutcome};
use tracing::{debug, error, info, warn};

use crate::catalog::LayerCatalog;
use crate::projector::FeatureStateProjector;
use crate::selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub throttle_interval: Duration,
    pub playback_interval: Duration,
    pub season: Season,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(500),
            playback_interval: Duration::from_millis(500),
            season: Season::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Activation {
    Active,
    /// A later `activate` call started while this one was loading; it owns
    /// visibility and the viewport listener instead.
    Superseded,
}

#[derive(Debug)]
struct ControllerState {
    active: Option<LayerKey>,
    week: Week,
    selection: Selection,
}

/// Owns the "active layer": exactly one thematic layer is visible and at most
/// one viewport listener exists at any time.
pub struct LayerLifecycleController {
    catalog: Arc<LayerCatalog>,
    loader: Arc<IncrementalLoader>,
    projector: Arc<FeatureStateProjector>,
    settings: ControllerSettings,
    state: Mutex<ControllerState>,
    activations: AtomicU64,
    playback: Mutex<Option<Ticker>>,
}

impl LayerLifecycleController {
    pub fn new(
        catalog: Arc<LayerCatalog>,
        loader: Arc<IncrementalLoader>,
        projector: Arc<FeatureStateProjector>,
        settings: ControllerSettings,
        initial_week: Week,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            loader,
            projector,
            settings,
            state: Mutex::new(ControllerState {
                active: None,
                week: settings.season.clamp(initial_week),
                selection: Selection::new(),
            }),
            activations: AtomicU64::new(0),
            playback: Mutex::new(None),
        })
    }

    pub fn active_layer(&self) -> Option<LayerKey> {
        self.state.lock().active.clone()
    }

    pub fn current_week(&self) -> Week {
        self.state.lock().week
    }

    pub fn season(&self) -> Season {
        self.settings.season
    }

    /// Switch the active layer.
    ///
    /// Loads run first; visibility and listener attachment happen only once
    /// they succeed, so a failed switch leaves the previous layer in place.
    pub async fn activate(self: &Arc<Self>, key: &LayerKey) -> Result<Activation, LoadError> {
        let Some(descriptor) = self.catalog.get(key) else {
            error!(layer = %key, "activate called with unknown layer");
            return Err(LoadError::UnknownLayer(key.clone()));
        };
        let ticket = self.activations.fetch_add(1, Ordering::SeqCst) + 1;
        info!(layer = %key, "activating layer");

        let surface = self.loader.surface();
        let viewport = surface.viewport();
        if let Err(err) = self.loader.load(key, viewport).await {
            error!(layer = %key, "layer switch failed: {err}");
            return Err(err);
        }

        if let Some(baseline) = &descriptor.baseline {
            let empty = self.loader.registry().read(baseline, |c| c.is_empty())?;
            if empty {
                if let Err(err) = self.loader.load(baseline, viewport).await {
                    error!(layer = %key, baseline = %baseline, "baseline load failed: {err}");
                    return Err(err);
                }
                info!(baseline = %baseline, "baseline loaded for comparison");
            }
        }

        if self.activations.load(Ordering::SeqCst) != ticket {
            debug!(layer = %key, "activation superseded");
            return Ok(Activation::Superseded);
        }

        for layer in self.catalog.iter() {
            surface.set_layer_visibility(&layer.render_layer_id, &layer.key == key);
        }

        let week = self.current_week();
        self.projector.project(key, week)?;

        let listener = self.viewport_listener(key.clone());
        self.loader.registry().attach_listener(key, listener)?;

        let mut state = self.state.lock();
        state.active = Some(key.clone());
        state.selection.clear();
        info!(layer = %key, week, "layer active");
        Ok(Activation::Active)
    }

    fn viewport_listener(self: &Arc<Self>, key: LayerKey) -> Throttle {
        let weak: Weak<Self> = Arc::downgrade(self);
        Throttle::spawn(self.settings.throttle_interval, move || {
            let weak = weak.clone();
            let key = key.clone();
            async move {
                if let Some(this) = weak.upgrade() {
                    this.reload_viewport(&key).await;
                }
            }
        })
    }

    async fn reload_viewport(&self, key: &LayerKey) {
        let viewport = self.loader.surface().viewport();
        match self.loader.load(key, viewport).await {
            Ok(LoadOutcome::Committed { .. }) => {
                // Newly resident features need this week's state too.
                let week = {
                    let state = self.state.lock();
                    (state.active.as_ref() == Some(key)).then_some(state.week)
                };
                if let Some(week) = week {
                    if let Err(err) = self.projector.project(key, week) {
                        warn!(layer = %key, "projection after reload failed: {err}");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => warn!(layer = %key, "viewport load failed: {err}"),
        }
    }

    /// Notify the controller that the map finished moving.
    ///
    /// Returns `false` when no layer is active yet.
    pub fn viewport_changed(&self) -> bool {
        let Some(key) = self.active_layer() else {
            return false;
        };
        match self.loader.registry().slot(&key) {
            Ok(slot) => slot.trigger_listener(),
            Err(_) => false,
        }
    }

    /// Move the week slider. Re-projects the active layer without reloading.
    pub fn set_week(&self, week: Week) -> Week {
        let week = self.settings.season.clamp(week);
        let active = {
            let mut state = self.state.lock();
            state.week = week;
            state.active.clone()
        };
        if let Some(key) = active {
            if let Err(err) = self.projector.project(&key, week) {
                warn!(layer = %key, week, "projection failed: {err}");
            }
        }
        week
    }

    /// Advance one week, wrapping to the start of the season.
    pub fn advance_week(&self) -> Week {
        let next = self.settings.season.next(self.current_week());
        self.set_week(next)
    }

    /// Start the week animation. Returns `false` if it was already running.
    pub fn start_playback(self: &Arc<Self>) -> bool {
        let mut playback = self.playback.lock();
        if playback.is_some() {
            return false;
        }
        let weak = Arc::downgrade(self);
        *playback = Some(Ticker::spawn(self.settings.playback_interval, move || {
            if let Some(this) = weak.upgrade() {
                this.advance_week();
            }
        }));
        true
    }

    /// Stop the week animation. Returns `false` if it was not running.
    pub fn stop_playback(&self) -> bool {
        self.playback.lock().take().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.lock().is_some()
    }

    /// Select the resident feature `id` of the active layer.
    pub fn select_feature(&self, id: FeatureId) -> Option<Arc<Feature>> {
        let key = self.active_layer()?;
        let feature = self
            .loader
            .registry()
            .read(&key, |c| c.find_by_id(id).cloned())
            .ok()
            .flatten();
        let mut state = self.state.lock();
        match &feature {
            Some(f) => state.selection.select(key, Arc::clone(f)),
            None => state.selection.clear(),
        }
        feature
    }

    pub fn clear_selection(&self) {
        self.state.lock().selection.clear();
    }

    pub fn selection(&self) -> Selection {
        self.state.lock().selection.clone()
    }

    /// Same-key feature of the active forecast's baseline layer, for
    /// comparing a selected forecast region with its historical average.
    pub fn baseline_for_selection(&self) -> Option<Arc<Feature>> {
        let (active, key) = {
            let state = self.state.lock();
            let active = state.active.clone()?;
            let key = state.selection.feature_on(&active)?.key.clone();
            (active, key)
        };
        let baseline = self.catalog.get(&active)?.baseline.as_ref()?;
        self.loader
            .registry()
            .read(baseline, |c| c.get(&key).cloned())
            .ok()
            .flatten()
    }
}
