/// End-to-end tests through the engine facade.
///
/// Observations come from an in-memory replay source or from sources that
/// fail on purpose; nothing here touches the network or a database.
///
/// Run with: cargo test --test engine_integration

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::AbortHandle;
use parking_lot::Mutex;

use riskmon_service::alert::{DispatchError, NotificationSink};
use riskmon_service::analysis::formation::ForecastPath;
use riskmon_service::analysis::strategy::{HeuristicStrategy, ScoringStrategy};
use riskmon_service::config::AlertConfiguration;
use riskmon_service::engine::{ObservationOrigin, RiskEngine};
use riskmon_service::ingest::{FetchError, ObservationSource, ReplaySource};
use riskmon_service::model::{
    Alert, AlertType, Domain, EnvironmentalObservation, GeoPoint, IntensityBucket, RiskLevel, RiskScore,
    ScoringError, Severity,
};
use riskmon_service::regions::{BoundingBox, Region, haversine_km};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Alert>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

/// Fails every fetch.
struct DownSource;

#[async_trait]
impl ObservationSource for DownSource {
    fn name(&self) -> &str {
        "down"
    }

    async fn fetch(&self, _: GeoPoint) -> Result<EnvironmentalObservation, FetchError> {
        Err(FetchError::Status(503))
    }
}

/// Serves `obs` once, then fails.
struct OnceSource {
    obs: Mutex<Option<EnvironmentalObservation>>,
}

#[async_trait]
impl ObservationSource for OnceSource {
    fn name(&self) -> &str {
        "once"
    }

    async fn fetch(&self, point: GeoPoint) -> Result<EnvironmentalObservation, FetchError> {
        self.obs.lock().take().ok_or(FetchError::NoData(point))
    }
}

/// Never answers.
struct HangingSource;

#[async_trait]
impl ObservationSource for HangingSource {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn fetch(&self, point: GeoPoint) -> Result<EnvironmentalObservation, FetchError> {
        futures::future::pending::<()>().await;
        Err(FetchError::NoData(point))
    }
}

/// Heuristic scores with every risk level forced down to low.
struct CalmStrategy;

impl ScoringStrategy for CalmStrategy {
    fn name(&self) -> &str {
        "calm"
    }

    fn predict(&self, domain: Domain, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        let mut score = HeuristicStrategy.predict(domain, obs)?;
        score.risk_level = RiskLevel::Low;
        Ok(score)
    }
}

fn peak_season() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap()
}

/// 1° × 1° box inside the Coral Sea basin: four 0.5° cells.
fn coral_sea_box() -> Region {
    Region { name: "coral_sea".to_string(), bounds: BoundingBox::new(-16.0, -15.0, 150.0, 151.0) }
}

fn config() -> AlertConfiguration {
    let mut config = AlertConfiguration::with_regions(vec![coral_sea_box()]);
    config.channels.log = false;
    config
}

fn favorable_sample(at: DateTime<Utc>) -> EnvironmentalObservation {
    let mut obs = EnvironmentalObservation::new(-15.75, 150.25, at);
    obs.sea_temp = Some(29.5);
    obs.wind_shear = Some(4.0);
    obs.humidity = Some(88.0);
    obs.vorticity = Some(6e-5);
    obs
}

/// Hot, acidified, hypoxic and turbid water over a reef with little live
/// coral left.
fn bleaching_reef(at: DateTime<Utc>) -> EnvironmentalObservation {
    let mut obs = EnvironmentalObservation::new(-18.3, 147.7, at);
    obs.sea_temp = Some(31.5);
    obs.ph = Some(7.7);
    obs.degree_heating_weeks = Some(10.0);
    obs.dissolved_oxygen = Some(1.5);
    obs.turbidity = Some(12.0);
    obs.chlorophyll = Some(12.0);
    obs.coral_coverage = Some(0.1);
    obs
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_favorable_sample_in_peak_season_raises_severe_alert() {
    let sink = Arc::new(RecordingSink::default());
    let engine = RiskEngine::builder(config())
        .source(Arc::new(ReplaySource::new(vec![favorable_sample(peak_season())])))
        .sink(sink.clone())
        .seed(11)
        .build()
        .unwrap();

    let forecast = engine.predict_formation_at(&coral_sea_box(), 5, peak_season()).await;
    assert_eq!(forecast.path, ForecastPath::Primary);
    assert_eq!(forecast.samples_used, 1);

    let sample_point = GeoPoint::new(-15.75, 150.25);
    let candidate = forecast
        .candidates
        .iter()
        .find(|c| haversine_km(c.location, sample_point) < 1.0)
        .expect("the sampled cell is a candidate");
    assert!(candidate.formation_probability > 0.6);
    assert!(candidate.expected_intensity_bucket >= IntensityBucket::TropicalStorm);
    assert!(candidate.environmental_factors.favorable_count() == 4);

    let outcome = engine
        .process_formation_predictions_at(std::slice::from_ref(candidate), peak_season())
        .await;
    let formation = outcome
        .appended
        .iter()
        .find(|a| a.alert_type == AlertType::Formation)
        .expect("formation alert raised");
    assert!(matches!(formation.severity, Severity::High | Severity::Critical));
    assert!(!formation.recommended_actions.is_empty());
    assert_eq!(sink.sent.lock().len(), outcome.appended.len());
}

#[tokio::test]
async fn test_forecast_is_reproducible_under_seed() {
    let run = || async {
        let engine = RiskEngine::builder(config())
            .source(Arc::new(ReplaySource::new(vec![favorable_sample(peak_season())])))
            .seed(99)
            .build()
            .unwrap();
        engine.predict_formation_at(&coral_sea_box(), 5, peak_season()).await
    };
    let a = run().await;
    let b = run().await;
    assert_eq!(a.candidates, b.candidates);
    assert_eq!(a.average_probability, b.average_probability);
}

#[tokio::test]
async fn test_source_outage_degrades_to_climatology() {
    let engine = RiskEngine::builder(config())
        .source(Arc::new(DownSource))
        .seed(3)
        .build()
        .unwrap();
    let forecast = engine.predict_formation_at(&coral_sea_box(), 5, peak_season()).await;
    assert_eq!(forecast.samples_used, 0);
    assert_eq!(forecast.samples_failed, 5);
    assert_eq!(forecast.cells_evaluated, 4);
    assert!(forecast.explanation.contains("climatology"));
    assert!(forecast.confidence <= 0.5 + 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_source_times_out() {
    let mut config = config();
    config.engine.fetch_timeout_ms = 250;
    let engine = RiskEngine::builder(config)
        .source(Arc::new(HangingSource))
        .seed(3)
        .build()
        .unwrap();
    let forecast = engine.predict_formation_at(&coral_sea_box(), 5, peak_season()).await;
    assert_eq!(forecast.samples_failed, 5);
    assert_eq!(forecast.cells_evaluated, 4);
}

#[tokio::test]
async fn test_aborted_fan_out_still_returns_forecast() {
    let engine = RiskEngine::builder(config())
        .source(Arc::new(HangingSource))
        .seed(3)
        .build()
        .unwrap();
    let (handle, registration) = AbortHandle::new_pair();
    handle.abort();
    let forecast = engine
        .predict_formation_abortable(&coral_sea_box(), 5, peak_season(), registration)
        .await;
    assert_eq!(forecast.samples_used, 0);
    assert_eq!(forecast.cells_evaluated, 4);
}

#[tokio::test]
async fn test_assess_point_scores_live_observation() {
    let mut live = EnvironmentalObservation::new(-19.26, 146.82, peak_season());
    live.pressure = Some(975.0);
    live.wind_speed = Some(130.0);
    live.rainfall_24h = Some(120.0);
    live.rainfall_72h = Some(210.0);

    let sink = Arc::new(RecordingSink::default());
    let engine = RiskEngine::builder(config())
        .source(Arc::new(ReplaySource::new(vec![live])))
        .sink(sink.clone())
        .seed(5)
        .build()
        .unwrap();

    let assessment = engine.assess_point_at(GeoPoint::new(-19.26, 146.82), peak_season()).await;
    assert_eq!(assessment.origin, ObservationOrigin::Live);
    assert!(assessment.cyclone.is_some());
    assert!(assessment.flood.is_some());
    // No sea temperature or pH reported.
    assert!(assessment.ocean_health.is_none());
    assert!(assessment.reef.is_none());
    assert_eq!(assessment.skipped.len(), 2);

    let types: Vec<AlertType> = assessment.alerts.appended.iter().map(|a| a.alert_type).collect();
    assert!(types.contains(&AlertType::Tracking));
    assert!(types.contains(&AlertType::Flood));
    assert_eq!(engine.get_active_alerts_at(peak_season()).len(), types.len());
}

#[tokio::test]
async fn test_assess_point_falls_back_to_last_known() {
    let mut obs = EnvironmentalObservation::new(-16.92, 145.77, peak_season());
    obs.rainfall_24h = Some(30.0);
    obs.rainfall_72h = Some(60.0);
    let engine = RiskEngine::builder(config())
        .source(Arc::new(OnceSource { obs: Mutex::new(Some(obs)) }))
        .seed(5)
        .build()
        .unwrap();
    let cairns = GeoPoint::new(-16.92, 145.77);

    let first = engine.assess_point_at(cairns, peak_season()).await;
    assert_eq!(first.origin, ObservationOrigin::Live);

    let later = peak_season() + chrono::Duration::hours(2);
    let second = engine.assess_point_at(cairns, later).await;
    assert_eq!(second.origin, ObservationOrigin::LastKnown);
    assert_eq!(second.flood.as_ref().map(|s| s.raw_score), first.flood.as_ref().map(|s| s.raw_score));

    // Past the six hour limit the cache no longer counts.
    let stale = peak_season() + chrono::Duration::hours(7);
    let third = engine.assess_point_at(cairns, stale).await;
    assert_eq!(third.origin, ObservationOrigin::Climatology);
}

#[tokio::test]
async fn test_far_point_without_data_uses_climatology() {
    let engine = RiskEngine::builder(config())
        .source(Arc::new(ReplaySource::new(vec![favorable_sample(peak_season())])))
        .seed(5)
        .build()
        .unwrap();
    let assessment = engine.assess_point_at(GeoPoint::new(10.0, -40.0), peak_season()).await;
    assert_eq!(assessment.origin, ObservationOrigin::Climatology);
    assert!(assessment.scores().iter().all(|s| s.confidence < 1.0));
}

#[tokio::test]
async fn test_tracking_update_raises_alerts() {
    let sink = Arc::new(RecordingSink::default());
    let engine = RiskEngine::builder(config())
        .without_configured_channels()
        .sink(sink.clone())
        .seed(5)
        .build()
        .unwrap();
    let update = riskmon_service::alert::TrackingUpdate {
        system_name: "TC Alfred".to_string(),
        location: GeoPoint::new(-17.0, 153.0),
        current_wind_kt: 90.0,
        forecast_wind_kt: 120.0,
        observed_at: peak_season(),
    };
    let outcome = engine.process_tracking_update_at(&update, peak_season()).await;
    assert_eq!(outcome.appended.len(), 2);
    assert_eq!(outcome.dispatch.len(), 2);
    assert!(outcome.dispatch.iter().all(|r| r.is_complete()));
    assert_eq!(engine.get_alerts_by_severity_at(Severity::Critical, peak_season()).len(), 1);
}

#[tokio::test]
async fn test_injected_strategy_scores_ocean_and_reef() {
    let engine = RiskEngine::builder(config())
        .strategy(Arc::new(CalmStrategy))
        .source(Arc::new(ReplaySource::new(vec![bleaching_reef(peak_season())])))
        .seed(5)
        .build()
        .unwrap();

    let assessment = engine.assess_point_at(GeoPoint::new(-18.3, 147.7), peak_season()).await;
    assert_eq!(assessment.ocean_health.as_ref().map(|s| s.risk_level), Some(RiskLevel::Low));
    assert_eq!(assessment.reef.as_ref().map(|s| s.risk_level), Some(RiskLevel::Low));
    assert!(assessment.ocean_sub_scores.is_some());
    assert!(assessment.alerts.appended.is_empty());
}

#[tokio::test]
async fn test_degraded_reef_raises_ocean_and_reef_alerts() {
    let engine = RiskEngine::builder(config())
        .source(Arc::new(ReplaySource::new(vec![bleaching_reef(peak_season())])))
        .seed(5)
        .build()
        .unwrap();

    let assessment = engine.assess_point_at(GeoPoint::new(-18.3, 147.7), peak_season()).await;
    assert_eq!(assessment.ocean_health.as_ref().map(|s| s.risk_level), Some(RiskLevel::Severe));
    assert_eq!(assessment.reef.as_ref().map(|s| s.risk_level), Some(RiskLevel::Severe));

    let types: Vec<AlertType> = assessment.alerts.appended.iter().map(|a| a.alert_type).collect();
    assert!(types.contains(&AlertType::OceanHealth));
    assert!(types.contains(&AlertType::Reef));
    assert_eq!(assessment.alerts.suppressed, 0);
}
