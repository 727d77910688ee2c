/// Property tests for the scoring functions: monotonicity, output ranges and
/// loud failure on missing inputs.
///
/// Run with: cargo test --test scoring_properties

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use riskmon_service::analysis::cyclone::score_cyclone;
use riskmon_service::analysis::flood::score_flood;
use riskmon_service::analysis::ocean::score_ocean_health;
use riskmon_service::model::{EnvironmentalObservation, RiskLevel, ScoringError};

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
}

fn cyclone_obs(pressure: f64, wind: f64) -> EnvironmentalObservation {
    let mut obs = EnvironmentalObservation::new(-16.0, 152.0, at());
    obs.pressure = Some(pressure);
    obs.wind_speed = Some(wind);
    obs
}

fn flood_obs(r24: f64, r72: f64, soil: Option<f64>) -> EnvironmentalObservation {
    let mut obs = EnvironmentalObservation::new(-19.26, 146.82, at());
    obs.rainfall_24h = Some(r24);
    obs.rainfall_72h = Some(r72);
    obs.soil_saturation = soil;
    obs
}

proptest! {
    #[test]
    fn test_lower_pressure_never_lowers_cyclone_risk(
        high in 850.0f64..1090.0,
        drop in 0.0f64..240.0,
        wind in 0.0f64..400.0,
    ) {
        let low = (high - drop).max(850.0);
        let a = score_cyclone(&cyclone_obs(high, wind)).unwrap();
        let b = score_cyclone(&cyclone_obs(low, wind)).unwrap();
        prop_assert!(b.probability_or_score >= a.probability_or_score);
        prop_assert!(b.risk_level >= a.risk_level);
    }

    #[test]
    fn test_more_wind_never_lowers_cyclone_risk(
        pressure in 850.0f64..1090.0,
        wind in 0.0f64..300.0,
        extra in 0.0f64..100.0,
    ) {
        let a = score_cyclone(&cyclone_obs(pressure, wind)).unwrap();
        let b = score_cyclone(&cyclone_obs(pressure, wind + extra)).unwrap();
        prop_assert!(b.probability_or_score >= a.probability_or_score);
    }

    #[test]
    fn test_more_rain_never_lowers_flood_risk(
        r24 in 0.0f64..1500.0,
        r72 in 0.0f64..4000.0,
        extra in 0.0f64..500.0,
        soil in proptest::option::of(0.0f64..=1.0),
    ) {
        let a = score_flood(&flood_obs(r24, r72, soil)).unwrap();
        let b = score_flood(&flood_obs(r24 + extra, r72 + extra, soil)).unwrap();
        prop_assert!(b.probability_or_score >= a.probability_or_score);
        prop_assert!(b.raw_score >= a.raw_score);
    }

    #[test]
    fn test_point_scores_stay_in_range(
        pressure in 850.0f64..1090.0,
        wind in 0.0f64..400.0,
        r24 in 0.0f64..2000.0,
        r72 in 0.0f64..5000.0,
    ) {
        for score in [
            score_cyclone(&cyclone_obs(pressure, wind)).unwrap(),
            score_flood(&flood_obs(r24, r72, None)).unwrap(),
        ] {
            prop_assert!((0.0..=1.0).contains(&score.probability_or_score));
            prop_assert!((0.0..=100.0).contains(&score.raw_score));
            prop_assert!((0.0..=1.0).contains(&score.confidence));
        }
    }

    #[test]
    fn test_ocean_scores_stay_in_range(
        sst in -2.0f64..40.0,
        ph in 6.5f64..9.0,
        dhw in proptest::option::of(0.0f64..40.0),
        oxygen in proptest::option::of(0.0f64..20.0),
        turbidity in proptest::option::of(0.0f64..1000.0),
        chlorophyll in proptest::option::of(0.0f64..100.0),
        cover in proptest::option::of(0.0f64..=1.0),
    ) {
        let mut obs = EnvironmentalObservation::new(-18.3, 147.7, at());
        obs.sea_temp = Some(sst);
        obs.ph = Some(ph);
        obs.degree_heating_weeks = dhw;
        obs.dissolved_oxygen = oxygen;
        obs.turbidity = turbidity;
        obs.chlorophyll = chlorophyll;
        obs.coral_coverage = cover;
        let assessment = score_ocean_health(&obs).unwrap();
        for score in [&assessment.overall, &assessment.reef] {
            prop_assert!(score.probability_or_score.is_finite());
            prop_assert!((0.0..=100.0).contains(&score.probability_or_score));
            prop_assert!((0.0..=1.0).contains(&score.confidence));
        }
        prop_assert!((0.0..=100.0).contains(&assessment.sub_scores.pollution_index));
    }
}

#[test]
fn test_severe_cyclone_reference_point() {
    let score = score_cyclone(&cyclone_obs(975.0, 130.0)).unwrap();
    assert_eq!(score.risk_level, RiskLevel::Severe);
    assert!(score.probability_or_score >= 0.85);
}

#[test]
fn test_flood_24h_band_edge() {
    let at_edge = score_flood(&flood_obs(100.0, 0.0, None)).unwrap();
    let below = score_flood(&flood_obs(99.99, 0.0, None)).unwrap();
    assert_eq!(at_edge.raw_score, 50.0);
    assert_eq!(below.raw_score, 35.0);
}

#[test]
fn test_missing_inputs_fail_loudly() {
    let mut obs = EnvironmentalObservation::new(-16.0, 152.0, at());
    obs.pressure = Some(990.0);
    assert!(matches!(score_cyclone(&obs), Err(ScoringError::MissingField { .. })));
    assert!(matches!(score_flood(&obs), Err(ScoringError::MissingField { .. })));
    assert!(matches!(score_ocean_health(&obs), Err(ScoringError::MissingField { .. })));
}

#[test]
fn test_out_of_range_input_is_rejected() {
    assert!(matches!(
        score_cyclone(&cyclone_obs(700.0, 50.0)),
        Err(ScoringError::InvalidField { .. })
    ));
}
