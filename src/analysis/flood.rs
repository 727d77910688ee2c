//! Flood risk from rainfall accumulation and soil saturation, plus river
//! stage classification for flood depth estimates.
//!
//! Rainfall and soil bands are inclusive (`>=`): exactly 100 mm in 24 h
//! scores the top 24 h band, 99.99 mm scores the one below.

use serde::{Deserialize, Serialize};

use crate::model::{
    ContributingFactor, Domain, EnvironmentalObservation, FactorKind, ObservationField, RiskScore,
    ScoreScale, ScoringError,
};
use crate::regions::FloodStageThresholds;

use super::{points_to_probability, points_to_risk_level};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodInputs {
    pub precip_24h_mm: f64,
    pub precip_72h_mm: f64,
    pub soil_moisture: Option<f64>,
}

/// Up to 50 points.
pub fn rainfall_24h_points(mm: f64) -> f64 {
    if mm >= 100.0 {
        50.0
    } else if mm >= 50.0 {
        35.0
    } else if mm >= 25.0 {
        20.0
    } else if mm >= 10.0 {
        10.0
    } else {
        0.0
    }
}

/// Up to 30 points.
pub fn rainfall_72h_points(mm: f64) -> f64 {
    if mm >= 200.0 {
        30.0
    } else if mm >= 100.0 {
        20.0
    } else if mm >= 50.0 {
        10.0
    } else {
        0.0
    }
}

/// Up to 20 points.
pub fn soil_points(fraction: f64) -> f64 {
    if fraction >= 0.8 {
        20.0
    } else if fraction >= 0.6 {
        10.0
    } else {
        0.0
    }
}

/// Scores an observation. 24 h and 72 h rainfall are required; soil
/// saturation contributes only when present.
pub fn score_flood(obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
    let inputs = FloodInputs {
        precip_24h_mm: obs.require(Domain::Flood, ObservationField::Rainfall24h)?,
        precip_72h_mm: obs.require(Domain::Flood, ObservationField::Rainfall72h)?,
        soil_moisture: obs.optional(ObservationField::SoilSaturation)?,
    };

    let mut read = vec![ObservationField::Rainfall24h, ObservationField::Rainfall72h];
    if inputs.soil_moisture.is_some() {
        read.push(ObservationField::SoilSaturation);
    }
    let confidence = obs.confidence_for(&read);

    let r24 = rainfall_24h_points(inputs.precip_24h_mm);
    let r72 = rainfall_72h_points(inputs.precip_72h_mm);
    let soil = inputs.soil_moisture.map(soil_points).unwrap_or(0.0);
    let raw = (r24 + r72 + soil).clamp(0.0, 100.0);
    let probability = points_to_probability(raw);
    let risk_level = points_to_risk_level(raw);

    let mut factors = Vec::new();
    if r24 > 0.0 {
        factors.push(ContributingFactor::new(
            FactorKind::HeavyRainfall,
            r24,
            format!("{:.0} mm of rain in 24 h", inputs.precip_24h_mm),
        ));
    }
    if r72 > 0.0 {
        factors.push(ContributingFactor::new(
            FactorKind::RainfallAccumulation,
            r72,
            format!("{:.0} mm of rain in 72 h", inputs.precip_72h_mm),
        ));
    }
    if soil > 0.0 {
        factors.push(ContributingFactor::new(
            FactorKind::SoilSaturation,
            soil,
            format!(
                "soil {:.0}% saturated",
                inputs.soil_moisture.unwrap_or_default() * 100.0
            ),
        ));
    }

    let soil_note = match inputs.soil_moisture {
        Some(s) => format!("soil {:.2} → {soil:.0}", s),
        None => "soil saturation not reported".to_string(),
    };
    let explanation = format!(
        "Flood risk {risk_level}: {raw:.0}/100 points (24 h {:.1} mm → {r24:.0}, \
         72 h {:.1} mm → {r72:.0}, {soil_note}), probability {probability:.2}",
        inputs.precip_24h_mm, inputs.precip_72h_mm,
    );

    Ok(RiskScore {
        domain: Domain::Flood,
        polarity: Domain::Flood.polarity(),
        scale: ScoreScale::Probability,
        raw_score: raw,
        probability_or_score: probability,
        risk_level,
        contributing_factors: factors,
        confidence,
        explanation,
        location: obs.location(),
        observed_at: obs.timestamp,
    })
}

// ---------------------------------------------------------------------------
// River stage
// ---------------------------------------------------------------------------

/// River stage categories, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Action,
    Flood,
    Moderate,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodDepthEstimate {
    pub stage: StageCategory,
    pub river_level_m: f64,
    /// Water above flood stage; zero while only at action stage.
    pub depth_above_flood_stage_m: f64,
}

/// Classifies a river level against gauge thresholds.
///
/// Returns `None` below the action stage. Each threshold is inclusive.
pub fn check_river_stage(level_m: f64, thresholds: &FloodStageThresholds) -> Option<FloodDepthEstimate> {
    if !level_m.is_finite() {
        return None;
    }
    let stage = if level_m >= thresholds.major_m {
        StageCategory::Major
    } else if level_m >= thresholds.moderate_m {
        StageCategory::Moderate
    } else if level_m >= thresholds.flood_m {
        StageCategory::Flood
    } else if level_m >= thresholds.action_m {
        StageCategory::Action
    } else {
        return None;
    };
    Some(FloodDepthEstimate {
        stage,
        river_level_m: level_m,
        depth_above_flood_stage_m: (level_m - thresholds.flood_m).max(0.0),
    })
}
