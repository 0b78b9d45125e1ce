//! Headless driver behind the `atlas` binary: wires a dashboard to a
//! GeoJSON-seq directory and an in-memory surface, then reports what a
//! viewer would see.

use std::collections::BTreeMap;
use std::sync::Arc;

use compute::{ActivityLevel, FeatureSummary, LayerAggregate, TemporalAnalysis, Trend, aggregate_layer};
use foundation::bounds::BoundingBox;
use foundation::time::{Week, month_label};
use layers::{ConfigError, Dashboard, DashboardConfig, LayerCatalog};
use serde::Serialize;
use streaming::{GeoJsonSeqSource, HeadlessSurface, LayerKey, LoadError, LoadOutcome};
use tracing::info;

#[derive(Debug)]
pub enum ToolError {
    Config(ConfigError),
    Load(LoadError),
    Usage(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Config(err) => write!(f, "{err}"),
            ToolError::Load(err) => write!(f, "load failed: {err}"),
            ToolError::Usage(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::Config(err) => Some(err),
            ToolError::Load(err) => Some(err),
            ToolError::Usage(_) => None,
        }
    }
}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        ToolError::Config(err)
    }
}

impl From<LoadError> for ToolError {
    fn from(err: LoadError) -> Self {
        ToolError::Load(err)
    }
}

/// `minx,miny,maxx,maxy`
pub fn parse_bbox(text: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("bad bbox {text:?}: {e}"))?;
    let &[min_x, min_y, max_x, max_y] = parts.as_slice() else {
        return Err(format!("bbox needs 4 numbers, got {}", parts.len()));
    };
    if min_x > max_x || min_y > max_y {
        return Err(format!("bbox {text:?} has min > max"));
    }
    Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub layer: Option<LayerKey>,
    /// Viewports visited in order; the first one is the startup view.
    pub viewports: Vec<BoundingBox>,
    pub week: Option<Week>,
    /// Natural key of a feature to summarize.
    pub feature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    #[serde(flatten)]
    pub summary: FeatureSummary,
    pub level: Option<ActivityLevel>,
    /// Same region in the forecast's baseline layer.
    pub baseline: Option<FeatureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub layer: LayerKey,
    pub week: Week,
    pub month: Option<&'static str>,
    pub loaded_bounds: Option<BoundingBox>,
    pub resident_features: usize,
    pub level: Option<ActivityLevel>,
    pub aggregate: LayerAggregate,
    pub trend: Option<Trend>,
    pub feature: Option<FeatureReport>,
    pub load_events: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerListing {
    pub key: LayerKey,
    pub locator: String,
    pub baseline: Option<LayerKey>,
}

pub fn list_layers(catalog: &LayerCatalog) -> Vec<LayerListing> {
    catalog
        .iter()
        .map(|l| LayerListing {
            key: l.key.clone(),
            locator: l.locator.clone(),
            baseline: l.baseline.clone(),
        })
        .collect()
}

/// Load the requested viewports for one layer and summarize the result.
pub async fn run_report(config: &DashboardConfig, request: &ReportRequest) -> Result<Report, ToolError> {
    let mut config = config.clone();
    if let Some(layer) = &request.layer {
        config.initial_layer = Some(layer.clone());
    }
    let Some((first_view, later_views)) = request.viewports.split_first() else {
        return Err(ToolError::Usage("at least one viewport is required".into()));
    };

    let surface = Arc::new(HeadlessSurface::new(*first_view));
    for layer in &config.layers {
        surface.add_source(layer.source_id.clone());
        surface.add_layer(layer.render_layer_id.clone());
    }
    let source = Arc::new(GeoJsonSeqSource::new(&config.data_root));
    let dashboard = Dashboard::new(&config, source, surface.clone())?;
    let key = dashboard.initial_layer().clone();

    dashboard.start().await?;
    for view in later_views {
        surface.set_viewport(*view);
        let outcome = dashboard.loader().load(&key, *view).await?;
        if let LoadOutcome::Committed { added } = outcome {
            info!(layer = %key, added, "viewport extended");
        }
    }

    let controller = dashboard.controller();
    let week = match request.week {
        Some(week) => controller.set_week(week),
        None => controller.set_week(controller.current_week()),
    };

    let season = controller.season();
    let aggregate = aggregate_layer(dashboard.registry(), &key, &season, week)?;
    let trend = TemporalAnalysis::weekly_trend(&aggregate.per_week);
    let (loaded_bounds, resident_features) = dashboard
        .registry()
        .read(&key, |c| (c.loaded_bounds(), c.len()))?;

    let feature = match &request.feature {
        Some(name) => Some(feature_report(&dashboard, &key, name, week)?),
        None => None,
    };

    let load_events = dashboard
        .loader()
        .metrics()
        .snapshot()
        .into_iter()
        .filter(|(layer, _, _)| layer == &key)
        .map(|(_, event, n)| (event.as_str().to_string(), n))
        .collect();

    Ok(Report {
        level: aggregate.current.map(ActivityLevel::from_index),
        layer: key,
        week,
        month: month_label(week),
        loaded_bounds,
        resident_features,
        aggregate,
        trend,
        feature,
        load_events,
    })
}

fn feature_report(
    dashboard: &Dashboard,
    key: &LayerKey,
    name: &str,
    week: Week,
) -> Result<FeatureReport, ToolError> {
    let Some(feature) = dashboard.registry().read(key, |c| c.get(name).cloned())? else {
        return Err(ToolError::Usage(format!("feature {name:?} is not resident in {key}")));
    };
    let controller = dashboard.controller();
    controller.select_feature(feature.id);
    let baseline = controller
        .baseline_for_selection()
        .map(|base| FeatureSummary::of(&base, week));
    let summary = FeatureSummary::of(&feature, week);
    Ok(FeatureReport {
        level: summary.current.map(ActivityLevel::from_index),
        summary,
        baseline,
    })
}
