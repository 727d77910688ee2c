//! Ocean and reef health.
//!
//! Unlike cyclone and flood scoring, these indices start at 100 and are
//! reduced by stress bands, so a higher value is healthier. The composite is
//! `0.25·water_quality + 0.20·(100 − pollution_index) + 0.20·biodiversity +
//! 0.35·reef_health`; the pollution index is the one sub-score where lower
//! is better, hence the inversion.

use serde::{Deserialize, Serialize};

use crate::climatology;
use crate::model::{
    ContributingFactor, Domain, EnvironmentalObservation, FactorKind, ObservationField, RiskScore,
    ScoreScale, ScoringError,
};

use super::health_index_to_risk_level;

const WEIGHT_WATER_QUALITY: f64 = 0.25;
const WEIGHT_POLLUTION: f64 = 0.20;
const WEIGHT_BIODIVERSITY: f64 = 0.20;
const WEIGHT_REEF: f64 = 0.35;

/// Confidence lost for each optional input that was not reported.
const MISSING_OPTIONAL_PENALTY: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OceanInputs {
    pub sst: f64,
    pub ph: f64,
    pub hotspot: Option<f64>,
    pub degree_heating_weeks: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub turbidity: Option<f64>,
    pub chlorophyll: Option<f64>,
    /// Live coral cover as a fraction.
    pub coral_coverage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OceanSubScores {
    pub water_quality: f64,
    /// Lower is healthier.
    pub pollution_index: f64,
    pub biodiversity: f64,
    pub reef_health: f64,
}

impl OceanSubScores {
    pub fn composite(&self) -> f64 {
        (WEIGHT_WATER_QUALITY * self.water_quality
            + WEIGHT_POLLUTION * (100.0 - self.pollution_index)
            + WEIGHT_BIODIVERSITY * self.biodiversity
            + WEIGHT_REEF * self.reef_health)
            .clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OceanHealthAssessment {
    pub sub_scores: OceanSubScores,
    /// Domain `ocean_health`, 0–100, higher is healthier.
    pub overall: RiskScore,
    /// Domain `reef`, 0–100, higher is healthier.
    pub reef: RiskScore,
}

fn penalty(factors: &mut Vec<ContributingFactor>, kind: FactorKind, points: f64, description: String) -> f64 {
    factors.push(ContributingFactor::new(kind, -points, description));
    -points
}

fn bonus(factors: &mut Vec<ContributingFactor>, kind: FactorKind, points: f64, description: String) -> f64 {
    factors.push(ContributingFactor::new(kind, points, description));
    points
}

/// Reef health sub-score and the factors that moved it.
pub fn reef_health(inputs: &OceanInputs, hotspot: f64) -> (f64, Vec<ContributingFactor>) {
    let mut f = Vec::new();
    let mut score = 100.0;

    let sst = inputs.sst;
    if sst >= 31.0 {
        score += penalty(&mut f, FactorKind::ThermalStress, 30.0, format!("SST {sst:.1}°C, severe thermal stress"));
    } else if sst >= 30.0 {
        score += penalty(&mut f, FactorKind::ThermalStress, 20.0, format!("SST {sst:.1}°C, high thermal stress"));
    } else if sst >= 29.5 {
        score += penalty(&mut f, FactorKind::ThermalStress, 10.0, format!("SST {sst:.1}°C, elevated"));
    } else if (26.0..=29.0).contains(&sst) {
        score += bonus(&mut f, FactorKind::OptimalTemperature, 5.0, format!("SST {sst:.1}°C within 26–29°C"));
    } else if sst < 20.0 {
        score += penalty(&mut f, FactorKind::ThermalStress, 15.0, format!("SST {sst:.1}°C, cold stress"));
    }

    if hotspot >= 2.0 {
        score += penalty(&mut f, FactorKind::TemperatureAnomaly, 20.0, format!("hotspot {hotspot:.1}°C above maximum monthly mean"));
    } else if hotspot >= 1.0 {
        score += penalty(&mut f, FactorKind::TemperatureAnomaly, 10.0, format!("hotspot {hotspot:.1}°C above maximum monthly mean"));
    }

    if let Some(dhw) = inputs.degree_heating_weeks {
        if dhw >= 8.0 {
            score += penalty(&mut f, FactorKind::HeatStress, 40.0, format!("{dhw:.1} DHW, bleaching and mortality likely"));
        } else if dhw >= 4.0 {
            score += penalty(&mut f, FactorKind::HeatStress, 25.0, format!("{dhw:.1} DHW, significant bleaching likely"));
        } else if dhw >= 2.0 {
            score += penalty(&mut f, FactorKind::HeatStress, 10.0, format!("{dhw:.1} DHW, bleaching watch"));
        }
    }

    let ph = inputs.ph;
    if ph < 7.8 {
        score += penalty(&mut f, FactorKind::Acidification, 25.0, format!("pH {ph:.2}, severe acidification"));
    } else if ph < 7.9 {
        score += penalty(&mut f, FactorKind::Acidification, 15.0, format!("pH {ph:.2}, acidification"));
    } else if ph < 8.0 {
        score += penalty(&mut f, FactorKind::Acidification, 5.0, format!("pH {ph:.2}, slightly low"));
    } else if ph <= 8.2 {
        score += bonus(&mut f, FactorKind::OptimalPh, 5.0, format!("pH {ph:.2} within 8.0–8.2"));
    }

    if let Some(o2) = inputs.dissolved_oxygen {
        if o2 < 2.0 {
            score += penalty(&mut f, FactorKind::Hypoxia, 30.0, format!("dissolved oxygen {o2:.1} mg/L, hypoxic"));
        } else if o2 < 4.0 {
            score += penalty(&mut f, FactorKind::Hypoxia, 15.0, format!("dissolved oxygen {o2:.1} mg/L, low"));
        } else if o2 < 5.0 {
            score += penalty(&mut f, FactorKind::Hypoxia, 5.0, format!("dissolved oxygen {o2:.1} mg/L, marginal"));
        }
    }

    let mut score = score.clamp(0.0, 100.0);
    if let Some(cover) = inputs.coral_coverage {
        let blended = 0.7 * score + 0.3 * cover * 100.0;
        f.push(ContributingFactor::new(
            FactorKind::CoralCover,
            blended - score,
            format!("live coral cover {:.0}%", cover * 100.0),
        ));
        score = blended;
    }

    (score.clamp(0.0, 100.0), f)
}

/// Water quality sub-score and the factors not already reported by the
/// reef sub-score.
pub fn water_quality(inputs: &OceanInputs) -> (f64, Vec<ContributingFactor>) {
    let mut f = Vec::new();
    let mut score: f64 = 100.0;

    let deviation = (inputs.ph - 8.1).abs();
    if deviation > 0.3 {
        score -= 25.0;
    } else if deviation > 0.2 {
        score -= 15.0;
    } else if deviation > 0.1 {
        score -= 5.0;
    }

    if let Some(o2) = inputs.dissolved_oxygen {
        if o2 < 4.0 {
            score -= 25.0;
        } else if o2 < 5.0 {
            score -= 10.0;
        }
    }

    if let Some(t) = inputs.turbidity {
        let points = if t > 10.0 {
            25.0
        } else if t > 5.0 {
            15.0
        } else if t > 2.0 {
            5.0
        } else {
            0.0
        };
        if points > 0.0 {
            score += penalty(&mut f, FactorKind::Turbidity, points, format!("turbidity {t:.1} NTU"));
        }
    }

    if let Some(c) = inputs.chlorophyll {
        let points = if c > 10.0 {
            25.0
        } else if c > 5.0 {
            15.0
        } else if c > 2.0 {
            5.0
        } else {
            0.0
        };
        if points > 0.0 {
            score += penalty(&mut f, FactorKind::Eutrophication, points, format!("chlorophyll-a {c:.1} mg/m³"));
        }
    }

    (score.clamp(0.0, 100.0), f)
}

/// 0–100, lower is healthier. Only reported inputs contribute.
pub fn pollution_index(inputs: &OceanInputs) -> f64 {
    let mut index = 0.0;
    if let Some(t) = inputs.turbidity {
        index += t.min(20.0) * 2.0;
    }
    if let Some(c) = inputs.chlorophyll {
        index += c.min(10.0) * 4.0;
    }
    if inputs.dissolved_oxygen.is_some_and(|o2| o2 < 4.0) {
        index += 20.0;
    }
    f64::clamp(index, 0.0, 100.0)
}

pub fn biodiversity(inputs: &OceanInputs, reef: f64) -> f64 {
    let cover = inputs.coral_coverage.map(|c| c * 100.0).unwrap_or(reef);
    let mut score = 0.6 * reef + 0.4 * cover;
    if inputs.degree_heating_weeks.is_some_and(|d| d >= 8.0) {
        score -= 15.0;
    }
    if inputs.dissolved_oxygen.is_some_and(|o2| o2 < 2.0) {
        score -= 20.0;
    }
    score.clamp(0.0, 100.0)
}

const OPTIONAL_FIELDS: [ObservationField; 6] = [
    ObservationField::Hotspot,
    ObservationField::DegreeHeatingWeeks,
    ObservationField::DissolvedOxygen,
    ObservationField::Turbidity,
    ObservationField::Chlorophyll,
    ObservationField::CoralCoverage,
];

/// Scores ocean and reef health. `sea_temp` and `ph` are required; the
/// remaining inputs are optional and lower confidence when absent. A missing
/// hotspot is derived from the climatological maximum monthly mean.
pub fn score_ocean_health(obs: &EnvironmentalObservation) -> Result<OceanHealthAssessment, ScoringError> {
    let inputs = OceanInputs {
        sst: obs.require(Domain::OceanHealth, ObservationField::SeaTemp)?,
        ph: obs.require(Domain::OceanHealth, ObservationField::Ph)?,
        hotspot: obs.optional(ObservationField::Hotspot)?,
        degree_heating_weeks: obs.optional(ObservationField::DegreeHeatingWeeks)?,
        dissolved_oxygen: obs.optional(ObservationField::DissolvedOxygen)?,
        turbidity: obs.optional(ObservationField::Turbidity)?,
        chlorophyll: obs.optional(ObservationField::Chlorophyll)?,
        coral_coverage: obs.optional(ObservationField::CoralCoverage)?,
    };

    let mut read = vec![ObservationField::SeaTemp, ObservationField::Ph];
    let mut missing = Vec::new();
    for field in OPTIONAL_FIELDS {
        if obs.get(field).is_some() {
            read.push(field);
        } else {
            missing.push(field);
        }
    }
    let confidence = (obs.confidence_for(&read)
        * (1.0 - MISSING_OPTIONAL_PENALTY * missing.len() as f64))
        .clamp(0.0, 1.0);

    let hotspot = inputs
        .hotspot
        .unwrap_or_else(|| (inputs.sst - climatology::max_monthly_mean_sst(obs.lat)).max(0.0));

    let (reef, reef_factors) = reef_health(&inputs, hotspot);
    let (wq, wq_factors) = water_quality(&inputs);
    let sub_scores = OceanSubScores {
        water_quality: wq,
        pollution_index: pollution_index(&inputs),
        biodiversity: biodiversity(&inputs, reef),
        reef_health: reef,
    };
    let composite = sub_scores.composite();

    let missing_note = if missing.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
        format!("; not reported: {}", names.join(", "))
    };

    let overall_level = health_index_to_risk_level(composite);
    let overall = RiskScore {
        domain: Domain::OceanHealth,
        polarity: Domain::OceanHealth.polarity(),
        scale: ScoreScale::Index100,
        raw_score: composite,
        probability_or_score: composite,
        risk_level: overall_level,
        contributing_factors: reef_factors.iter().cloned().chain(wq_factors).collect(),
        confidence,
        explanation: format!(
            "Ocean health {composite:.0}/100 (higher is healthier, risk {overall_level}): \
             water quality {wq:.0}, pollution index {:.0} (lower is better), \
             biodiversity {:.0}, reef health {reef:.0}{missing_note}",
            sub_scores.pollution_index, sub_scores.biodiversity,
        ),
        location: obs.location(),
        observed_at: obs.timestamp,
    };

    let reef_level = health_index_to_risk_level(reef);
    let reef_score = RiskScore {
        domain: Domain::Reef,
        polarity: Domain::Reef.polarity(),
        scale: ScoreScale::Index100,
        raw_score: reef,
        probability_or_score: reef,
        risk_level: reef_level,
        contributing_factors: reef_factors,
        confidence,
        explanation: format!(
            "Reef health {reef:.0}/100 (higher is healthier, risk {reef_level}), \
             SST {:.1}°C, hotspot {hotspot:.1}°C, pH {:.2}{missing_note}",
            inputs.sst, inputs.ph,
        ),
        location: obs.location(),
        observed_at: obs.timestamp,
    };

    Ok(OceanHealthAssessment { sub_scores, overall, reef: reef_score })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Polarity, RiskLevel};
    use chrono::{TimeZone, Utc};

    fn healthy_reef() -> EnvironmentalObservation {
        let mut o = EnvironmentalObservation::new(
            -18.3,
            147.7,
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        );
        o.sea_temp = Some(27.0);
        o.ph = Some(8.1);
        o.hotspot = Some(0.0);
        o.degree_heating_weeks = Some(0.0);
        o.dissolved_oxygen = Some(6.5);
        o.turbidity = Some(1.0);
        o.chlorophyll = Some(0.3);
        o.coral_coverage = Some(0.5);
        o
    }

    #[test]
    fn test_healthy_reef_scores_low_risk() {
        let a = score_ocean_health(&healthy_reef()).expect("complete inputs");
        assert!(a.overall.probability_or_score >= 80.0, "{}", a.overall.explanation);
        assert_eq!(a.overall.risk_level, RiskLevel::Low);
        assert_eq!(a.overall.polarity, Polarity::HigherIsBetter);
        assert_eq!(a.overall.confidence, 1.0);
        assert!(a.overall.has_factor(FactorKind::OptimalPh));
    }

    #[test]
    fn test_composite_uses_fixed_weights() {
        let s = OceanSubScores {
            water_quality: 80.0,
            pollution_index: 30.0,
            biodiversity: 60.0,
            reef_health: 50.0,
        };
        let expected = 0.25 * 80.0 + 0.20 * 70.0 + 0.20 * 60.0 + 0.35 * 50.0;
        assert!((s.composite() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_marine_heatwave_degrades_reef_to_severe() {
        let mut o = healthy_reef();
        o.sea_temp = Some(31.2);
        o.hotspot = Some(2.5);
        o.degree_heating_weeks = Some(9.0);
        o.ph = Some(7.85);
        o.dissolved_oxygen = Some(3.0);
        let a = score_ocean_health(&o).expect("complete inputs");
        assert_eq!(a.reef.risk_level, RiskLevel::Severe, "{}", a.reef.explanation);
        assert!(a.reef.has_factor(FactorKind::HeatStress));
        assert!(a.reef.has_factor(FactorKind::Acidification));
        assert!(a.overall.probability_or_score < 60.0);
    }

    #[test]
    fn test_low_ph_records_acidification_factor() {
        let mut o = healthy_reef();
        o.ph = Some(7.75);
        let a = score_ocean_health(&o).expect("complete inputs");
        assert!(a.overall.has_factor(FactorKind::Acidification));
    }

    #[test]
    fn test_missing_optional_inputs_lower_confidence_only() {
        let mut o = EnvironmentalObservation::new(
            -18.3,
            147.7,
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        );
        o.sea_temp = Some(27.0);
        o.ph = Some(8.1);
        let a = score_ocean_health(&o).expect("sst and ph are enough");
        assert!((a.overall.confidence - 0.7).abs() < 1e-9);
        assert!(a.overall.explanation.contains("not reported"));
    }

    #[test]
    fn test_missing_ph_is_an_error() {
        let mut o = healthy_reef();
        o.ph = None;
        assert!(matches!(
            score_ocean_health(&o),
            Err(ScoringError::MissingField { field: ObservationField::Ph, .. })
        ));
    }

    #[test]
    fn test_pollution_index_is_inverted_in_composite() {
        let mut clean = healthy_reef();
        clean.turbidity = Some(0.5);
        let mut murky = healthy_reef();
        murky.turbidity = Some(15.0);
        let a = score_ocean_health(&clean).unwrap();
        let b = score_ocean_health(&murky).unwrap();
        assert!(b.sub_scores.pollution_index > a.sub_scores.pollution_index);
        assert!(b.overall.probability_or_score < a.overall.probability_or_score);
    }

    #[test]
    fn test_scores_stay_in_range_under_extreme_stress() {
        let mut o = healthy_reef();
        o.sea_temp = Some(35.0);
        o.hotspot = Some(5.0);
        o.degree_heating_weeks = Some(20.0);
        o.ph = Some(7.5);
        o.dissolved_oxygen = Some(0.5);
        o.turbidity = Some(500.0);
        o.chlorophyll = Some(80.0);
        o.coral_coverage = Some(0.0);
        let a = score_ocean_health(&o).unwrap();
        for v in [
            a.sub_scores.water_quality,
            a.sub_scores.pollution_index,
            a.sub_scores.biodiversity,
            a.sub_scores.reef_health,
            a.overall.probability_or_score,
        ] {
            assert!((0.0..=100.0).contains(&v), "{v} out of range");
        }
    }
}
