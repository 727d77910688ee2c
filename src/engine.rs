//! The service facade.
//!
//! [`RiskEngine`] owns everything a running instance needs: validated
//! configuration, the scoring strategy, the optional observation source, the
//! alert manager and the one RNG all randomness is drawn from. Several engines
//! can coexist in one process (one per region, one per test).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::AbortRegistration;
use serde::Serialize;

use crate::alert::log::AlertLog;
use crate::alert::manager::{AlertManager, ProcessOutcome};
use crate::alert::sink::{DispatchError, LogSink, NotificationSink, WebhookSink};
use crate::alert::thresholds::{AlertClassifier, TrackingUpdate};
use crate::analysis::flood::{FloodDepthEstimate, check_river_stage};
use crate::analysis::formation::{FormationAnalyzer, FormationForecast};
use crate::analysis::grid::{GridInterpolator, collect_samples};
use crate::analysis::ocean::{self, OceanSubScores};
use crate::analysis::strategy::{HeuristicStrategy, ScoringStrategy};
use crate::climatology;
use crate::config::{AlertConfiguration, ConfigError};
use crate::db::AlertStore;
use crate::ingest::normalize;
use crate::ingest::replay::{ReplayError, ReplaySource};
use crate::ingest::source::{
    FetchError, HttpObservationSource, LastKnownCache, ObservationSource, fetch_with_timeout,
};
use crate::logging::{self, Component};
use crate::model::{
    Alert, Domain, EnvironmentalObservation, FormationCandidate, GeoPoint, RiskScore, ScoringError,
    Severity, SharedRng, shared_rng,
};
use crate::recommend;
use crate::regions::Region;

pub const MIN_FORECAST_DAYS: u32 = 1;
pub const MAX_FORECAST_DAYS: u32 = 14;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown region '{0}'")]
    UnknownRegion(String),
    #[error("unknown monitored location '{0}'")]
    UnknownLocation(String),
    #[error("monitored location '{0}' has no river gauge thresholds")]
    NoRiverStages(String),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("observation source setup failed: {0}")]
    Source(#[from] FetchError),
    #[error("replay source setup failed: {0}")]
    Replay(#[from] ReplayError),
    #[error("notification channel setup failed: {0}")]
    Channel(#[from] DispatchError),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RiskEngineBuilder {
    config: AlertConfiguration,
    strategy: Option<Arc<dyn ScoringStrategy>>,
    source: Option<Arc<dyn ObservationSource>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    store: Option<Arc<dyn AlertStore>>,
    seed: Option<u64>,
    configured_channels: bool,
}

impl RiskEngineBuilder {
    pub fn new(config: AlertConfiguration) -> Self {
        Self {
            config,
            strategy: None,
            source: None,
            sinks: Vec::new(),
            store: None,
            seed: None,
            configured_channels: true,
        }
    }

    pub fn strategy(mut self, strategy: Arc<dyn ScoringStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Overrides the source described by `[source]`.
    pub fn source(mut self, source: Arc<dyn ObservationSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Adds a sink alongside the configured channels.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Skips the `[channels]` section; only sinks added with [`sink`](Self::sink) are used.
    pub fn without_configured_channels(mut self) -> Self {
        self.configured_channels = false;
        self
    }

    pub fn store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides `engine.rng_seed`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration and wires the engine.
    pub fn build(self) -> Result<RiskEngine, EngineError> {
        let config = self.config;
        config.validate()?;

        let source = match self.source {
            Some(source) => Some(source),
            None => source_from_config(&config)?,
        };

        let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();
        if self.configured_channels {
            if config.channels.log {
                sinks.push(Arc::new(LogSink));
            }
            for hook in &config.channels.webhooks {
                sinks.push(Arc::new(WebhookSink::new(hook.name.clone(), hook.url.clone())?));
            }
        }
        sinks.extend(self.sinks);

        let rng = shared_rng(self.seed.or(config.engine.rng_seed));
        let strategy = self.strategy.unwrap_or_else(|| Arc::new(HeuristicStrategy) as Arc<dyn ScoringStrategy>);

        let alerts = AlertManager::new(
            AlertClassifier::new(config.thresholds.clone(), config.monitored_locations.clone()),
            AlertLog::new(
                config.engine.active_window(),
                config.engine.retention(),
                config.engine.dedup_enabled,
            ),
            sinks,
            self.store,
            Arc::clone(&rng),
            config.engine.dispatch_timeout(),
        );

        logging::info(
            Component::System,
            None,
            &format!(
                "engine ready: {} region(s), strategy {}, source {}",
                config.regions.len(),
                strategy.name(),
                source.as_ref().map_or("none", |s| s.name()),
            ),
        );

        Ok(RiskEngine {
            interpolator: GridInterpolator::new(config.grid.clone()),
            analyzer: FormationAnalyzer::new(config.formation.clone(), Arc::clone(&strategy)),
            config,
            strategy,
            source,
            alerts,
            last_known: LastKnownCache::new(),
            rng,
        })
    }
}

fn source_from_config(config: &AlertConfiguration) -> Result<Option<Arc<dyn ObservationSource>>, EngineError> {
    let settings = &config.source;
    if let Some(path) = &settings.replay_file {
        let replay = ReplaySource::from_file(path)?.with_day_offset(settings.replay_day_offset);
        return Ok(Some(Arc::new(replay)));
    }
    if let Some(template) = &settings.url_template {
        let http = HttpObservationSource::new(template.clone(), config.engine.fetch_timeout())?;
        return Ok(Some(Arc::new(http)));
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Point assessment
// ---------------------------------------------------------------------------

/// Where a point assessment's observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationOrigin {
    Live,
    LastKnown,
    Climatology,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointAssessment {
    pub location: GeoPoint,
    pub origin: ObservationOrigin,
    pub observation: EnvironmentalObservation,
    pub cyclone: Option<RiskScore>,
    pub flood: Option<RiskScore>,
    pub ocean_health: Option<RiskScore>,
    pub reef: Option<RiskScore>,
    /// Heuristic breakdown behind the ocean scores, whatever the strategy.
    pub ocean_sub_scores: Option<OceanSubScores>,
    /// Domains that could not be scored, with the reason.
    pub skipped: Vec<String>,
    pub alerts: ProcessOutcome,
}

impl PointAssessment {
    /// Every produced score, in domain order.
    pub fn scores(&self) -> Vec<&RiskScore> {
        self.cyclone
            .iter()
            .chain(self.flood.iter())
            .chain(self.ocean_health.iter())
            .chain(self.reef.iter())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RiskEngine {
    config: AlertConfiguration,
    strategy: Arc<dyn ScoringStrategy>,
    source: Option<Arc<dyn ObservationSource>>,
    interpolator: GridInterpolator,
    analyzer: FormationAnalyzer,
    alerts: AlertManager,
    last_known: LastKnownCache,
    rng: SharedRng,
}

impl RiskEngine {
    pub fn builder(config: AlertConfiguration) -> RiskEngineBuilder {
        RiskEngineBuilder::new(config)
    }

    pub fn config(&self) -> &AlertConfiguration {
        &self.config
    }

    pub fn source(&self) -> Option<&dyn ObservationSource> {
        self.source.as_deref()
    }

    /// The full alert log, including alerts no longer active.
    pub fn alert_log(&self) -> &AlertLog {
        self.alerts.log()
    }

    // -- scoring ------------------------------------------------------------

    pub fn score_cyclone(&self, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        self.strategy.predict(Domain::Cyclone, obs)
    }

    pub fn score_flood(&self, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        self.strategy.predict(Domain::Flood, obs)
    }

    pub fn score_ocean_health(&self, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        self.strategy.predict(Domain::OceanHealth, obs)
    }

    pub fn score_reef_health(&self, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        self.strategy.predict(Domain::Reef, obs)
    }

    /// Water quality, pollution, biodiversity and reef sub-indices from the
    /// weighted heuristics. Not routed through the strategy, which only
    /// produces whole-domain scores.
    pub fn ocean_sub_scores(&self, obs: &EnvironmentalObservation) -> Result<OceanSubScores, ScoringError> {
        ocean::score_ocean_health(obs).map(|a| a.sub_scores)
    }

    /// Stage and depth above flood stage at a gauged monitored location.
    /// `Ok(None)` means the level is below the action stage.
    pub fn estimate_flood_depth(&self, location: &str, river_level_m: f64) -> Result<Option<FloodDepthEstimate>, EngineError> {
        let loc = self
            .config
            .monitored_locations
            .iter()
            .find(|l| l.name == location)
            .ok_or_else(|| EngineError::UnknownLocation(location.to_string()))?;
        let stages = loc
            .river_stages
            .as_ref()
            .ok_or_else(|| EngineError::NoRiverStages(location.to_string()))?;
        Ok(check_river_stage(river_level_m, stages))
    }

    // -- regional forecasts -------------------------------------------------

    pub async fn predict_formation(&self, region: &Region, forecast_days: u32) -> FormationForecast {
        self.predict_formation_at(region, forecast_days, Utc::now()).await
    }

    pub async fn predict_formation_at(&self, region: &Region, forecast_days: u32, now: DateTime<Utc>) -> FormationForecast {
        self.run_forecast(region, forecast_days, now, None).await
    }

    /// As [`predict_formation_at`](Self::predict_formation_at), but the sample
    /// fan-out stops when the paired `AbortHandle` fires. The forecast then
    /// runs on climatology.
    pub async fn predict_formation_abortable(
        &self,
        region: &Region,
        forecast_days: u32,
        now: DateTime<Utc>,
        abort: AbortRegistration,
    ) -> FormationForecast {
        self.run_forecast(region, forecast_days, now, Some(abort)).await
    }

    /// Forecast for a configured region by name. `None` days uses the
    /// configured default.
    pub async fn predict_region(&self, name: &str, forecast_days: Option<u32>) -> Result<FormationForecast, EngineError> {
        self.predict_region_at(name, forecast_days, Utc::now()).await
    }

    pub async fn predict_region_at(
        &self,
        name: &str,
        forecast_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<FormationForecast, EngineError> {
        let region = self
            .config
            .region(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownRegion(name.to_string()))?;
        let days = forecast_days.unwrap_or(self.config.formation.default_forecast_days);
        Ok(self.predict_formation_at(&region, days, now).await)
    }

    async fn run_forecast(
        &self,
        region: &Region,
        forecast_days: u32,
        now: DateTime<Utc>,
        abort: Option<AbortRegistration>,
    ) -> FormationForecast {
        let days = forecast_days.clamp(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS);
        let points = region.bounds.sample_points();
        let set = collect_samples(self.source(), &points, self.config.engine.fetch_timeout(), abort).await;
        for sample in &set.samples {
            self.last_known.record(sample);
        }

        let forecast = {
            let mut rng = self.rng.lock();
            let grid = self.interpolator.interpolate(&region.bounds, &set.samples, now, &mut *rng);
            self.analyzer.analyze(region, &grid, days, set.failed, now, &mut *rng)
        };
        logging::log_forecast_summary(
            &region.name,
            forecast.candidates.len(),
            forecast.samples_used,
            forecast.samples_failed,
        );
        forecast
    }

    // -- point assessment ---------------------------------------------------

    pub async fn assess_point(&self, point: GeoPoint) -> PointAssessment {
        self.assess_point_at(point, Utc::now()).await
    }

    /// Scores every domain at `point` and raises alerts for risky scores.
    ///
    /// The observation is a live fetch when possible, then a fresh enough
    /// cached one, then climatology. Domains whose inputs are missing are
    /// skipped, not failed.
    pub async fn assess_point_at(&self, point: GeoPoint, now: DateTime<Utc>) -> PointAssessment {
        let (observation, origin) = self.observe(point, now).await;

        let mut skipped = Vec::new();
        let mut keep = |domain: Domain, result: Result<RiskScore, ScoringError>| match result {
            Ok(score) => Some(score),
            Err(e) => {
                logging::debug(Component::System, Some(domain.as_ref()), &format!("not scored at {point}: {e}"));
                skipped.push(format!("{}: {e}", domain.as_ref()));
                None
            }
        };
        let cyclone = keep(Domain::Cyclone, self.score_cyclone(&observation));
        let flood = keep(Domain::Flood, self.score_flood(&observation));
        let ocean_health = keep(Domain::OceanHealth, self.score_ocean_health(&observation));
        let reef = keep(Domain::Reef, self.score_reef_health(&observation));
        let ocean_sub_scores = self.ocean_sub_scores(&observation).ok();

        let mut assessment = PointAssessment {
            location: point,
            origin,
            observation,
            cyclone,
            flood,
            ocean_health,
            reef,
            ocean_sub_scores,
            skipped,
            alerts: ProcessOutcome::default(),
        };

        let scores: Vec<RiskScore> = assessment.scores().into_iter().cloned().collect();
        for score in &scores {
            self.alerts.persist_score(score).await;
            let outcome = self.alerts.process_risk_score_at(score, now).await;
            assessment.alerts.merge(outcome);
        }
        assessment
    }

    async fn observe(&self, point: GeoPoint, now: DateTime<Utc>) -> (EnvironmentalObservation, ObservationOrigin) {
        if let Some(source) = self.source() {
            let fetched = fetch_with_timeout(source, point, self.config.engine.fetch_timeout())
                .await
                .and_then(|obs| {
                    normalize::validate(&obs)?;
                    Ok(obs)
                });
            match fetched {
                Ok(obs) => {
                    self.last_known.record(&obs);
                    return (obs, ObservationOrigin::Live);
                }
                Err(e) => logging::log_fetch_failure(source.name(), &point.to_string(), &e),
            }
        }

        if let Some(obs) = self.last_known.lookup_at(point, self.config.engine.last_known_max_age(), now) {
            logging::info(Component::Source, Some(&point.to_string()), "using last known observation");
            return (obs, ObservationOrigin::LastKnown);
        }

        logging::warn(Component::Source, Some(&point.to_string()), "no usable observation, using climatology");
        (climatology::baseline(point.lat, point.lng, now), ObservationOrigin::Climatology)
    }

    // -- alerts -------------------------------------------------------------

    pub async fn process_formation_predictions(&self, candidates: &[FormationCandidate]) -> ProcessOutcome {
        self.alerts.process_formation_predictions(candidates).await
    }

    pub async fn process_formation_predictions_at(
        &self,
        candidates: &[FormationCandidate],
        now: DateTime<Utc>,
    ) -> ProcessOutcome {
        self.alerts.process_formation_predictions_at(candidates, now).await
    }

    pub async fn process_risk_score_at(&self, score: &RiskScore, now: DateTime<Utc>) -> ProcessOutcome {
        self.alerts.process_risk_score_at(score, now).await
    }

    pub async fn process_tracking_update(&self, update: &TrackingUpdate) -> ProcessOutcome {
        self.alerts.process_tracking_update_at(update, Utc::now()).await
    }

    pub async fn process_tracking_update_at(&self, update: &TrackingUpdate, now: DateTime<Utc>) -> ProcessOutcome {
        self.alerts.process_tracking_update_at(update, now).await
    }

    pub async fn send_alert(&self, alert: Alert) -> ProcessOutcome {
        self.alerts.send_alert(alert).await
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.get_active_alerts_at(Utc::now())
    }

    pub fn get_active_alerts_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        self.alerts.active_alerts_at(now)
    }

    pub fn get_alerts_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.get_alerts_by_severity_at(severity, Utc::now())
    }

    pub fn get_alerts_by_severity_at(&self, severity: Severity, now: DateTime<Utc>) -> Vec<Alert> {
        self.alerts.alerts_by_severity_at(severity, now)
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.alerts.purge_expired(now)
    }

    // -- recommendations ----------------------------------------------------

    pub fn recommendations_for_score(&self, score: &RiskScore) -> Vec<String> {
        recommend::for_score(score)
    }

    pub fn recommendations_for_candidate(&self, candidate: &FormationCandidate) -> Vec<String> {
        recommend::for_candidate(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use crate::regions::{BoundingBox, FloodStageThresholds, MonitoredLocation};
    use chrono::TimeZone;

    fn coral_sea() -> Region {
        Region { name: "coral_sea".to_string(), bounds: BoundingBox::new(-18.0, -14.0, 150.0, 156.0) }
    }

    fn config() -> AlertConfiguration {
        let mut config = AlertConfiguration::with_regions(vec![coral_sea()]);
        config.monitored_locations.push(MonitoredLocation {
            name: "Townsville".to_string(),
            lat: -19.26,
            lng: 146.82,
            river_stages: Some(FloodStageThresholds { action_m: 3.0, flood_m: 4.0, moderate_m: 5.0, major_m: 6.5 }),
        });
        config.channels.log = false;
        config
    }

    fn engine() -> RiskEngine {
        RiskEngine::builder(config()).seed(7).build().unwrap()
    }

    fn feb() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_build_rejects_missing_regions() {
        let err = RiskEngine::builder(AlertConfiguration::with_regions(Vec::new())).build();
        assert!(matches!(err, Err(EngineError::Config(ConfigError::NoRegions))));
    }

    #[test]
    fn test_build_rejects_inverted_region() {
        let bad = Region { name: "bad".to_string(), bounds: BoundingBox::new(10.0, 5.0, 0.0, 1.0) };
        let err = RiskEngine::builder(AlertConfiguration::with_regions(vec![bad])).build();
        assert!(matches!(err, Err(EngineError::Config(ConfigError::InvalidRegion { .. }))));
    }

    #[test]
    fn test_score_cyclone_goes_through_strategy() {
        let mut obs = EnvironmentalObservation::new(-16.0, 152.0, feb());
        obs.pressure = Some(975.0);
        obs.wind_speed = Some(130.0);
        let score = engine().score_cyclone(&obs).unwrap();
        assert_eq!(score.risk_level, RiskLevel::Severe);
        assert!(score.probability_or_score >= 0.85);
    }

    #[test]
    fn test_estimate_flood_depth() {
        let e = engine();
        let estimate = e.estimate_flood_depth("Townsville", 5.2).unwrap().unwrap();
        assert!((estimate.depth_above_flood_stage_m - 1.2).abs() < 1e-9);
        assert!(e.estimate_flood_depth("Townsville", 2.0).unwrap().is_none());
        assert!(matches!(e.estimate_flood_depth("Cairns", 5.0), Err(EngineError::UnknownLocation(_))));
    }

    #[tokio::test]
    async fn test_forecast_without_source_uses_climatology() {
        let forecast = engine().predict_formation_at(&coral_sea(), 5, feb()).await;
        assert_eq!(forecast.samples_used, 0);
        assert!(forecast.cells_evaluated > 0);
        assert!(forecast.explanation.contains("climatology"));
    }

    #[tokio::test]
    async fn test_forecast_days_are_clamped() {
        let forecast = engine().predict_formation_at(&coral_sea(), 90, feb()).await;
        assert_eq!(forecast.forecast_days, MAX_FORECAST_DAYS);
        let forecast = engine().predict_formation_at(&coral_sea(), 0, feb()).await;
        assert_eq!(forecast.forecast_days, MIN_FORECAST_DAYS);
    }

    #[tokio::test]
    async fn test_same_seed_same_forecast() {
        let a = engine().predict_formation_at(&coral_sea(), 5, feb()).await;
        let b = engine().predict_formation_at(&coral_sea(), 5, feb()).await;
        assert_eq!(a.candidates, b.candidates);
    }

    #[tokio::test]
    async fn test_unknown_region_is_an_error() {
        let err = engine().predict_region_at("gulf", None, feb()).await;
        assert!(matches!(err, Err(EngineError::UnknownRegion(_))));
    }

    #[tokio::test]
    async fn test_assess_point_without_source_falls_back_to_climatology() {
        let assessment = engine().assess_point_at(GeoPoint::new(-16.0, 152.0), feb()).await;
        assert_eq!(assessment.origin, ObservationOrigin::Climatology);
        assert!(assessment.cyclone.is_some());
        assert!(assessment.cyclone.as_ref().unwrap().confidence < 1.0);
    }
}
