use std::path::{Path, PathBuf};
use std::time::Duration;

use foundation::time::{Season, Week};
use serde::{Deserialize, Serialize};
use streaming::{DEFAULT_EXTENT_ATTRIBUTE, LayerKey, LoaderSettings, MaskingPolicy};

use crate::catalog::{LayerCatalog, default_layers};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "read {}: {source}", path.display()),
            ConfigError::Parse(err) => write!(f, "config json: {err}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Deployment configuration for the dashboard core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Directory the spatial source resolves layer locators against.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Limited deployment: mask forecast features outside the study area.
    #[serde(default)]
    pub limited_version: bool,
    #[serde(default = "default_extent_attribute")]
    pub extent_attribute: String,
    /// Minimum interval between viewport-triggered loads.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default)]
    pub ack_timeout_ms: Option<u64>,
    #[serde(default)]
    pub season: Season,
    #[serde(default)]
    pub initial_week: Option<Week>,
    #[serde(default)]
    pub initial_layer: Option<LayerKey>,
    #[serde(default = "default_playback_ms")]
    pub playback_ms: u64,
    #[serde(default = "default_layers")]
    pub layers: Vec<crate::layer::LayerDescriptor>,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data/out")
}

fn default_extent_attribute() -> String {
    DEFAULT_EXTENT_ATTRIBUTE.to_string()
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_playback_ms() -> u64 {
    500
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            limited_version: false,
            extent_attribute: default_extent_attribute(),
            throttle_ms: default_throttle_ms(),
            ack_timeout_ms: None,
            season: Season::default(),
            initial_week: None,
            initial_layer: None,
            playback_ms: default_playback_ms(),
            layers: default_layers(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Timer intervals must be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throttle_ms == 0 {
            return Err(ConfigError::Invalid("throttle_ms must be at least 1".into()));
        }
        if self.playback_ms == 0 {
            return Err(ConfigError::Invalid("playback_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `ATLAS_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ATLAS_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        self.limited_version = env_var_bool(&lookup, "ATLAS_LIMITED_VERSION", self.limited_version);
        self.throttle_ms = env_var_millis(&lookup, "ATLAS_THROTTLE_MS", self.throttle_ms);
        self.playback_ms = env_var_millis(&lookup, "ATLAS_PLAYBACK_MS", self.playback_ms);
    }

    pub fn catalog(&self) -> Result<LayerCatalog, ConfigError> {
        LayerCatalog::new(self.layers.clone())
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            masking: MaskingPolicy::new(self.limited_version, self.extent_attribute.clone()),
            ack_timeout: self.ack_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_ms)
    }

    /// Week shown at startup: the configured one, else the season's first.
    pub fn start_week(&self) -> Week {
        self.initial_week
            .map(|w| self.season.clamp(w))
            .unwrap_or(self.season.first_week)
    }
}

/// Non-zero millisecond interval; zero or garbage keeps `default`.
fn env_var_millis(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(default)
}

fn env_var_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name).as_deref().map(str::trim) {
        Some("1" | "true" | "TRUE" | "yes") => true,
        Some("0" | "false" | "FALSE" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{ConfigError, DashboardConfig};

    #[test]
    fn empty_object_yields_dashboard_defaults() {
        let cfg = DashboardConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.throttle_interval(), Duration::from_millis(500));
        assert_eq!(cfg.start_week(), 15);
        assert_eq!(cfg.catalog().unwrap().len(), 6);
        assert!(!cfg.loader_settings().masking.is_enabled());
    }

    #[test]
    fn parses_explicit_fields() {
        let cfg = DashboardConfig::from_json_str(
            r#"{
                "limited_version": true,
                "ack_timeout_ms": 3000,
                "season": {"first_week": 20, "last_week": 30},
                "initial_week": 42,
                "layers": [
                    {"key": "nuts", "source_id": "n", "locator": "n.geojsonl", "render_layer_id": "nuts-layer"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.start_week(), 30);
        let settings = cfg.loader_settings();
        assert!(settings.masking.is_enabled());
        assert_eq!(settings.masking.extent_attribute(), "study_area_extent_trentino");
        assert_eq!(settings.ack_timeout, Some(Duration::from_secs(3)));
        assert_eq!(cfg.catalog().unwrap().len(), 1);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ATLAS_LIMITED_VERSION", "true"),
            ("ATLAS_THROTTLE_MS", "250"),
            ("ATLAS_PLAYBACK_MS", "not-a-number"),
            ("ATLAS_DATA_ROOT", "/srv/atlas"),
        ]);
        let mut cfg = DashboardConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(cfg.limited_version);
        assert_eq!(cfg.throttle_ms, 250);
        assert_eq!(cfg.playback_ms, 500);
        assert_eq!(cfg.data_root, std::path::PathBuf::from("/srv/atlas"));
    }

    #[test]
    fn reversed_season_is_ordered_not_fatal() {
        let cfg = DashboardConfig::from_json_str(
            r#"{"season": {"first_week": 30, "last_week": 20}, "initial_week": 25}"#,
        )
        .unwrap();
        assert_eq!(cfg.season.first_week, 20);
        assert_eq!(cfg.season.last_week, 30);
        assert_eq!(cfg.start_week(), 25);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(matches!(
            DashboardConfig::from_json_str(r#"{"playback_ms": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DashboardConfig::from_json_str(r#"{"throttle_ms": 0}"#),
            Err(ConfigError::Invalid(_))
        ));

        let mut cfg = DashboardConfig::default();
        cfg.apply_overrides(|k| (k == "ATLAS_PLAYBACK_MS").then(|| "0".to_string()));
        assert_eq!(cfg.playback_ms, 500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DashboardConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(DashboardConfig::load(&bad), Err(ConfigError::Parse(_))));
    }
}
