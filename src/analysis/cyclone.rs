//! Cyclone risk from minimum pressure and maximum wind speed.
//!
//! Pressure and wind each contribute up to 50 points. Pressure bands are
//! strict `<` comparisons and wind bands strict `>`, so a reading exactly on
//! a band edge scores the lower band.

use chrono::{DateTime, Utc};

use crate::model::{
    ContributingFactor, Domain, EnvironmentalObservation, FactorKind, GeoPoint, ObservationField,
    RiskScore, ScoreScale, ScoringError,
};

use super::{points_to_probability, points_to_risk_level};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycloneInputs {
    pub min_pressure_hpa: f64,
    pub max_wind_speed_kmh: f64,
}

pub fn pressure_points(pressure_hpa: f64) -> f64 {
    if pressure_hpa < 980.0 {
        50.0
    } else if pressure_hpa < 990.0 {
        35.0
    } else if pressure_hpa < 1000.0 {
        20.0
    } else if pressure_hpa < 1010.0 {
        10.0
    } else {
        0.0
    }
}

pub fn wind_points(wind_kmh: f64) -> f64 {
    if wind_kmh > 120.0 {
        50.0
    } else if wind_kmh > 90.0 {
        35.0
    } else if wind_kmh > 60.0 {
        20.0
    } else if wind_kmh > 40.0 {
        10.0
    } else {
        0.0
    }
}

fn validate(field: ObservationField, value: f64) -> Result<(), ScoringError> {
    if field.in_range(value) {
        Ok(())
    } else {
        let (lo, hi) = field.valid_range();
        Err(ScoringError::InvalidField {
            field,
            value,
            reason: format!("outside valid range [{lo}, {hi}]"),
        })
    }
}

/// Scores explicit inputs. `confidence` comes from the caller because only
/// the caller knows where the inputs came from.
pub fn score_cyclone_inputs(
    inputs: CycloneInputs,
    location: GeoPoint,
    observed_at: DateTime<Utc>,
    confidence: f64,
) -> Result<RiskScore, ScoringError> {
    validate(ObservationField::Pressure, inputs.min_pressure_hpa)?;
    validate(ObservationField::WindSpeed, inputs.max_wind_speed_kmh)?;

    let p_points = pressure_points(inputs.min_pressure_hpa);
    let w_points = wind_points(inputs.max_wind_speed_kmh);
    let raw = (p_points + w_points).clamp(0.0, 100.0);
    let probability = points_to_probability(raw);
    let risk_level = points_to_risk_level(raw);

    let mut factors = Vec::new();
    if p_points > 0.0 {
        factors.push(ContributingFactor::new(
            FactorKind::LowPressure,
            p_points,
            format!("central pressure {:.1} hPa", inputs.min_pressure_hpa),
        ));
    }
    if w_points > 0.0 {
        factors.push(ContributingFactor::new(
            FactorKind::HighWind,
            w_points,
            format!("sustained wind {:.0} km/h", inputs.max_wind_speed_kmh),
        ));
    }

    let explanation = format!(
        "Cyclone risk {risk_level}: {raw:.0}/100 points (pressure {:.1} hPa → {p_points:.0}, \
         wind {:.0} km/h → {w_points:.0}), probability {probability:.2}",
        inputs.min_pressure_hpa, inputs.max_wind_speed_kmh,
    );

    Ok(RiskScore {
        domain: Domain::Cyclone,
        polarity: Domain::Cyclone.polarity(),
        scale: ScoreScale::Probability,
        raw_score: raw,
        probability_or_score: probability,
        risk_level,
        contributing_factors: factors,
        confidence: confidence.clamp(0.0, 1.0),
        explanation,
        location,
        observed_at,
    })
}

/// Scores an observation. Both `pressure` and `wind_speed` are required.
pub fn score_cyclone(obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
    let inputs = CycloneInputs {
        min_pressure_hpa: obs.require(Domain::Cyclone, ObservationField::Pressure)?,
        max_wind_speed_kmh: obs.require(Domain::Cyclone, ObservationField::WindSpeed)?,
    };
    let confidence =
        obs.confidence_for(&[ObservationField::Pressure, ObservationField::WindSpeed]);
    score_cyclone_inputs(inputs, obs.location(), obs.timestamp, confidence)
}
