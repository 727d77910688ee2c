/// Service configuration.
///
/// Loaded once at startup from a TOML file (path from `RISKMON_CONFIG`,
/// default `config/riskmon.toml`) after `.env` has been read. `DATABASE_URL`
/// overrides `[database].url`. The result is validated before the engine is
/// built and is read-only afterwards; changing it means restarting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::analysis::grid::InterpolationMethod;
use crate::model::RiskLevel;
use crate::regions::{MonitoredLocation, Region};

pub const CONFIG_PATH_ENV: &str = "RISKMON_CONFIG";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DEFAULT_CONFIG_PATH: &str = "config/riskmon.toml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("at least one region must be configured")]
    NoRegions,
    #[error("region '{name}' is invalid: {reason}")]
    InvalidRegion { name: String, reason: String },
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting { key, reason: reason.into() }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Seed for the engine's RNG; entropy when absent.
    pub rng_seed: Option<u64>,
    pub active_window_hours: i64,
    pub retention_days: i64,
    /// Suppress alerts whose idempotency key was already logged.
    pub dedup_enabled: bool,
    pub fetch_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
    /// How long a cached observation may stand in for a failed fetch.
    pub last_known_max_age_hours: i64,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rng_seed: None,
            active_window_hours: 24,
            retention_days: 7,
            dedup_enabled: true,
            fetch_timeout_ms: 3_000,
            dispatch_timeout_ms: 5_000,
            last_known_max_age_hours: 6,
            log_level: "info".to_string(),
        }
    }
}

/// Upper bound for every configured window and age, ten years.
pub const MAX_WINDOW_DAYS: i64 = 3_650;
const MAX_WINDOW_HOURS: i64 = MAX_WINDOW_DAYS * 24;

/// Hours clamped to `±MAX_WINDOW_HOURS`, so an unvalidated setting can
/// never overflow `TimeDelta` or date arithmetic.
fn capped_hours(hours: i64) -> TimeDelta {
    TimeDelta::try_hours(hours.clamp(-MAX_WINDOW_HOURS, MAX_WINDOW_HOURS)).unwrap_or_else(TimeDelta::zero)
}

impl EngineSettings {
    pub fn active_window(&self) -> TimeDelta {
        capped_hours(self.active_window_hours)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::try_days(self.retention_days.clamp(-MAX_WINDOW_DAYS, MAX_WINDOW_DAYS))
            .unwrap_or_else(TimeDelta::zero)
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn last_known_max_age(&self) -> TimeDelta {
        capped_hours(self.last_known_max_age_hours)
    }
}

/// Alert-raising thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Minimum formation probability that raises a formation alert.
    pub formation_probability: f64,
    /// Formation alerts within this many hours are titled imminent.
    pub time_to_formation_hours: f64,
    /// Wind speed (kt) that raises tracking and intensification alerts.
    pub wind_speed_kt: f64,
    /// Distance to a monitored location that raises a landfall alert.
    pub nearby_distance_km: f64,
    /// Forecast / current wind ratio that raises an intensification alert.
    pub intensification_ratio: f64,
    /// Lowest risk level at which point risk scores raise alerts.
    pub min_risk_level: RiskLevel,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            formation_probability: 0.5,
            time_to_formation_hours: 48.0,
            wind_speed_kt: 64.0,
            nearby_distance_km: 300.0,
            intensification_ratio: 1.25,
            min_risk_level: RiskLevel::High,
        }
    }
}

/// Formation favorability gates and candidate selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationSettings {
    pub sst_threshold_c: f64,
    pub max_wind_shear_ms: f64,
    pub min_humidity_pct: f64,
    pub min_vorticity: f64,
    pub primary_cutoff: f64,
    pub primary_top_k: usize,
    pub fallback_cutoff: f64,
    pub fallback_top_k: usize,
    pub probability_cap: f64,
    pub default_forecast_days: u32,
}

impl Default for FormationSettings {
    fn default() -> Self {
        Self {
            sst_threshold_c: 26.5,
            max_wind_shear_ms: 10.0,
            min_humidity_pct: 70.0,
            min_vorticity: 1e-5,
            primary_cutoff: 0.10,
            primary_top_k: 10,
            fallback_cutoff: 0.05,
            fallback_top_k: 15,
            probability_cap: 0.95,
            default_forecast_days: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub resolution_deg: f64,
    pub method: InterpolationMethod,
    /// Dampening applied to the reference sample's bias.
    pub calibration_weight: f64,
    /// Perturb non-measured values with the engine RNG.
    pub jitter: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            resolution_deg: 0.5,
            method: InterpolationMethod::Calibrated,
            calibration_weight: 0.75,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub webhooks: Vec<WebhookChannel>,
    /// Also write every dispatched alert to the log.
    pub log: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self { webhooks: Vec::new(), log: true }
    }
}

/// Where observations come from. With neither a URL nor a replay file the
/// engine runs on climatology alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub url_template: Option<String>,
    pub replay_file: Option<PathBuf>,
    pub replay_day_offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfiguration {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub thresholds: AlertThresholds,
    #[serde(default)]
    pub formation: FormationSettings,
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub monitored_locations: Vec<MonitoredLocation>,
    #[serde(default)]
    pub channels: ChannelSettings,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl AlertConfiguration {
    /// Defaults for every section and the given regions.
    pub fn with_regions(regions: Vec<Region>) -> Self {
        Self {
            engine: EngineSettings::default(),
            thresholds: AlertThresholds::default(),
            formation: FormationSettings::default(),
            grid: GridSettings::default(),
            regions,
            monitored_locations: Vec::new(),
            channels: ChannelSettings::default(),
            source: SourceSettings::default(),
            database: DatabaseSettings::default(),
        }
    }

    pub fn from_toml_str(body: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(body)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&body)
    }

    /// Reads `.env`, loads the file named by `RISKMON_CONFIG`, applies
    /// environment overrides and validates.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        log::info!("loading configuration from {path}");
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.database.url = Some(url);
        }
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Startup validation. Any error here is fatal: the engine refuses to
    /// run with an undefined region or nonsensical thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        let mut names = HashSet::new();
        for region in &self.regions {
            if region.name.trim().is_empty() {
                return Err(ConfigError::InvalidRegion {
                    name: region.name.clone(),
                    reason: "name is empty".to_string(),
                });
            }
            if !names.insert(region.name.as_str()) {
                return Err(ConfigError::InvalidRegion {
                    name: region.name.clone(),
                    reason: "duplicate region name".to_string(),
                });
            }
            region.bounds.validate().map_err(|reason| ConfigError::InvalidRegion {
                name: region.name.clone(),
                reason,
            })?;
        }

        for loc in &self.monitored_locations {
            let ok = loc.lat.is_finite()
                && loc.lng.is_finite()
                && (-90.0..=90.0).contains(&loc.lat)
                && (-180.0..=180.0).contains(&loc.lng);
            if !ok {
                return Err(invalid(
                    "monitored_locations",
                    format!("'{}' has invalid coordinates {},{}", loc.name, loc.lat, loc.lng),
                ));
            }
            if let Some(stages) = &loc.river_stages {
                if !stages.is_ordered() {
                    return Err(invalid(
                        "monitored_locations.river_stages",
                        format!("'{}' stages must ascend action < flood < moderate < major", loc.name),
                    ));
                }
            }
        }

        let e = &self.engine;
        if e.active_window_hours <= 0 {
            return Err(invalid("engine.active_window_hours", "must be positive"));
        }
        if e.active_window_hours > MAX_WINDOW_HOURS {
            return Err(invalid("engine.active_window_hours", format!("must not exceed {MAX_WINDOW_HOURS}")));
        }
        if e.retention_days > MAX_WINDOW_DAYS {
            return Err(invalid("engine.retention_days", format!("must not exceed {MAX_WINDOW_DAYS}")));
        }
        if e.last_known_max_age_hours > MAX_WINDOW_HOURS {
            return Err(invalid("engine.last_known_max_age_hours", format!("must not exceed {MAX_WINDOW_HOURS}")));
        }
        if e.retention() < e.active_window() {
            return Err(invalid("engine.retention_days", "must cover the active window"));
        }
        if e.fetch_timeout_ms == 0 || e.dispatch_timeout_ms == 0 {
            return Err(invalid("engine.*_timeout_ms", "timeouts must be positive"));
        }
        if e.last_known_max_age_hours < 0 {
            return Err(invalid("engine.last_known_max_age_hours", "must not be negative"));
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.formation_probability) {
            return Err(invalid("thresholds.formation_probability", "must lie in [0, 1]"));
        }
        if !(t.time_to_formation_hours > 0.0) {
            return Err(invalid("thresholds.time_to_formation_hours", "must be positive"));
        }
        if !(t.wind_speed_kt > 0.0) || !(t.nearby_distance_km > 0.0) {
            return Err(invalid("thresholds", "wind speed and distance must be positive"));
        }
        if !(t.intensification_ratio > 1.0) {
            return Err(invalid("thresholds.intensification_ratio", "must exceed 1.0"));
        }

        let f = &self.formation;
        for (key, v) in [("formation.primary_cutoff", f.primary_cutoff), ("formation.fallback_cutoff", f.fallback_cutoff)] {
            if !(0.0..1.0).contains(&v) {
                return Err(invalid(key, "must lie in [0, 1)"));
            }
        }
        if !(f.probability_cap > 0.0 && f.probability_cap <= 1.0) {
            return Err(invalid("formation.probability_cap", "must lie in (0, 1]"));
        }
        if f.primary_top_k == 0 || f.fallback_top_k == 0 {
            return Err(invalid("formation.*_top_k", "must be at least 1"));
        }

        let g = &self.grid;
        if !(g.resolution_deg > 0.0 && g.resolution_deg <= 10.0) {
            return Err(invalid("grid.resolution_deg", "must lie in (0, 10]"));
        }
        if !(0.0..=1.0).contains(&g.calibration_weight) {
            return Err(invalid("grid.calibration_weight", "must lie in [0, 1]"));
        }

        for hook in &self.channels.webhooks {
            if !(hook.url.starts_with("http://") || hook.url.starts_with("https://")) {
                return Err(invalid("channels.webhooks", format!("'{}' is not an http(s) URL", hook.name)));
            }
        }

        let s = &self.source;
        if s.url_template.is_some() && s.replay_file.is_some() {
            return Err(invalid("source", "set url_template or replay_file, not both"));
        }
        if let Some(template) = &s.url_template {
            if !(template.contains("{lat}") && template.contains("{lng}")) {
                return Err(invalid("source.url_template", "must contain {lat} and {lng}"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::BoundingBox;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [engine]
        rng_seed = 42
        active_window_hours = 24

        [thresholds]
        formation_probability = 0.6
        min_risk_level = "moderate"

        [grid]
        method = "nearest_sample"

        [[regions]]
        name = "coral_sea"
        min_lat = -25.0
        max_lat = -10.0
        min_lng = 145.0
        max_lng = 165.0

        [[monitored_locations]]
        name = "Townsville"
        lat = -19.26
        lng = 146.82
        river_stages = { action_m = 4.0, flood_m = 5.0, moderate_m = 6.5, major_m = 8.0 }

        [[channels.webhooks]]
        name = "ops"
        url = "https://hooks.example.org/riskmon"
    "#;

    fn coral_sea() -> Region {
        Region { name: "coral_sea".to_string(), bounds: BoundingBox::new(-25.0, -10.0, 145.0, 165.0) }
    }

    #[test]
    fn test_sample_parses_with_defaults_filled() {
        let config = AlertConfiguration::from_toml_str(SAMPLE).expect("sample parses");
        config.validate().expect("sample is valid");
        assert_eq!(config.engine.rng_seed, Some(42));
        assert_eq!(config.engine.retention_days, 7);
        assert_eq!(config.thresholds.min_risk_level, RiskLevel::Moderate);
        assert_eq!(config.thresholds.wind_speed_kt, 64.0);
        assert_eq!(config.grid.method, InterpolationMethod::NearestSample);
        assert_eq!(config.formation.primary_top_k, 10);
        assert_eq!(config.regions[0].bounds.min_lng, 145.0);
        assert!(config.monitored_locations[0].river_stages.is_some());
        assert!(config.channels.log);
    }

    #[test]
    fn test_database_url_override() {
        let mut config = AlertConfiguration::from_toml_str(SAMPLE).unwrap();
        config.apply_env_overrides(|key| {
            (key == DATABASE_URL_ENV).then(|| "postgres://localhost/riskmon".to_string())
        });
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/riskmon"));
    }

    #[test]
    fn test_empty_regions_are_fatal() {
        let config = AlertConfiguration::with_regions(Vec::new());
        assert!(matches!(config.validate(), Err(ConfigError::NoRegions)));
    }

    #[test]
    fn test_inverted_bounds_are_fatal() {
        let region = Region { name: "bad".to_string(), bounds: BoundingBox::new(-10.0, -25.0, 145.0, 165.0) };
        let config = AlertConfiguration::with_regions(vec![region]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRegion { .. })));
    }

    #[test]
    fn test_duplicate_region_names_are_fatal() {
        let config = AlertConfiguration::with_regions(vec![coral_sea(), coral_sea()]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRegion { .. })));
    }

    #[test]
    fn test_url_template_needs_placeholders() {
        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.source.url_template = Some("https://obs.example.org/latest".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSetting { key: "source.url_template", .. })));
    }

    #[test]
    fn test_retention_shorter_than_active_window_is_rejected() {
        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.engine.active_window_hours = 24 * 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_windows_are_rejected_not_panicking() {
        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.engine.retention_days = i64::MAX / 1000;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSetting { key: "engine.retention_days", .. })));

        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.engine.active_window_hours = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { key: "engine.active_window_hours", .. })
        ));

        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.engine.last_known_max_age_hours = i64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.engine.last_known_max_age(), TimeDelta::days(MAX_WINDOW_DAYS));
    }

    #[test]
    fn test_unknown_interpolation_method_is_a_parse_error() {
        let body = SAMPLE.replace("nearest_sample", "kriging");
        assert!(matches!(AlertConfiguration::from_toml_str(&body), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AlertConfiguration::from_file(file.path()).expect("file loads");
        assert_eq!(config.regions.len(), 1);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AlertConfiguration::from_file("/nonexistent/riskmon.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/riskmon.toml"));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = AlertConfiguration::from_toml_str(include_str!("../config/riskmon.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.regions.len(), 2);
        assert!(config.region("coral_sea").is_some());
    }
}
