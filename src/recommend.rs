/// Recommended actions for scores, candidates and alerts.
///
/// Pure functions: the same input always yields the same ordered list. Tier
/// actions come first, most urgent first; factor-specific actions follow.
/// An acidification action is appended whenever low pH contributed to a
/// score, whatever the overall tier.

use crate::model::{
    AlertType, Domain, FactorKind, FormationCandidate, IntensityBucket, RiskLevel, RiskScore, Severity,
};

pub const ACIDIFICATION_ACTION: &str =
    "Monitor carbonate chemistry and limit additional stressors on calcifying organisms";

fn push_unique(actions: &mut Vec<String>, action: &str) {
    if !actions.iter().any(|a| a == action) {
        actions.push(action.to_string());
    }
}

fn cyclone_tier(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::Severe => &[
            "Follow evacuation orders from local authorities immediately",
            "Move to a designated cyclone shelter or the strongest part of the building",
            "Secure emergency water, food, medication and a battery radio",
        ],
        RiskLevel::High => &[
            "Prepare to evacuate low-lying and coastal areas",
            "Secure loose outdoor items and board up windows",
            "Check emergency kit supplies",
        ],
        RiskLevel::Moderate => &[
            "Review your cyclone emergency plan",
            "Monitor official weather warnings",
        ],
        RiskLevel::Low => &["Stay informed through official forecasts"],
    }
}

fn flood_tier(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::Severe => &[
            "Move to higher ground immediately",
            "Never drive, walk or swim through floodwater",
            "Switch off electricity and gas if water is entering the building",
        ],
        RiskLevel::High => &[
            "Prepare to move to higher ground",
            "Move valuables and chemicals above expected flood level",
            "Avoid low-lying roads and causeways",
        ],
        RiskLevel::Moderate => &[
            "Monitor river levels and rainfall warnings",
            "Clear drains and gutters",
        ],
        RiskLevel::Low => &["No action required; continue routine monitoring"],
    }
}

fn ocean_tier(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::Severe => &[
            "Notify marine park managers and suspend reef-stressing activities",
            "Deploy rapid reef health surveys",
        ],
        RiskLevel::High => &[
            "Increase reef and water quality monitoring frequency",
            "Restrict anchoring and diving at stressed sites",
        ],
        RiskLevel::Moderate => &["Continue weekly monitoring and report bleaching sightings"],
        RiskLevel::Low => &["Conditions healthy; maintain routine monitoring"],
    }
}

fn factor_action(kind: FactorKind) -> Option<&'static str> {
    match kind {
        FactorKind::HeavyRainfall | FactorKind::RainfallAccumulation => {
            Some("Watch for flash flooding in creeks and urban catchments")
        }
        FactorKind::SoilSaturation => Some("Expect rapid runoff; saturated ground will not absorb more rain"),
        FactorKind::HeatStress | FactorKind::TemperatureAnomaly => {
            Some("Activate the coral bleaching response plan")
        }
        FactorKind::ThermalStress => Some("Track sea surface temperature daily at monitored reefs"),
        FactorKind::Hypoxia => Some("Sample for low-oxygen dead zones and check for fish kills"),
        FactorKind::Turbidity | FactorKind::Eutrophication => {
            Some("Trace upstream sediment and nutrient sources")
        }
        FactorKind::Acidification => Some(ACIDIFICATION_ACTION),
        _ => None,
    }
}

/// Actions for a domain score.
pub fn for_score(score: &RiskScore) -> Vec<String> {
    let tier = match score.domain {
        Domain::Cyclone => cyclone_tier(score.risk_level),
        Domain::Flood => flood_tier(score.risk_level),
        Domain::OceanHealth | Domain::Reef => ocean_tier(score.risk_level),
    };
    let mut actions = Vec::new();
    for action in tier {
        push_unique(&mut actions, action);
    }
    // Bonus factors (optimal pH, temperature) carry no action.
    for factor in &score.contributing_factors {
        if let Some(action) = factor_action(factor.kind) {
            push_unique(&mut actions, action);
        }
    }
    if score.has_factor(FactorKind::Acidification) {
        push_unique(&mut actions, ACIDIFICATION_ACTION);
    }
    actions
}

/// Actions for a formation candidate, keyed on probability, lead time and
/// expected intensity.
pub fn for_candidate(candidate: &FormationCandidate) -> Vec<String> {
    let mut actions = Vec::new();
    let p = candidate.formation_probability;
    let hours = candidate.time_to_formation_hours;

    if p > 0.7 && hours < 48.0 {
        push_unique(&mut actions, "Prepare for possible cyclone impacts within 48 hours");
        push_unique(&mut actions, "Secure property and check emergency supplies");
    } else if p > 0.4 {
        push_unique(&mut actions, "Monitor forecasts for cyclone development");
        push_unique(&mut actions, "Review your cyclone emergency plan");
    } else {
        push_unique(&mut actions, "Stay informed through official forecasts");
    }

    if candidate.expected_intensity_bucket >= IntensityBucket::Category3 {
        push_unique(&mut actions, "Identify evacuation routes and the nearest cyclone shelter");
    }
    if !candidate.environmental_factors.low_wind_shear {
        push_unique(&mut actions, "Development may be limited by wind shear; watch for forecast changes");
    }
    actions
}

/// Actions for tracking, landfall and intensification alerts that do not
/// originate from a single score.
pub fn for_alert(alert_type: AlertType, severity: Severity) -> Vec<String> {
    let level = match severity {
        Severity::Critical => RiskLevel::Severe,
        Severity::High => RiskLevel::High,
        Severity::Moderate => RiskLevel::Moderate,
        Severity::Low => RiskLevel::Low,
    };
    let mut actions: Vec<String> = match alert_type {
        AlertType::Flood => flood_tier(level),
        AlertType::OceanHealth | AlertType::Reef => ocean_tier(level),
        _ => cyclone_tier(level),
    }
    .iter()
    .map(|a| a.to_string())
    .collect();
    match alert_type {
        AlertType::Landfall => push_unique(&mut actions, "Coastal communities: expect storm surge and damaging winds"),
        AlertType::Intensification => push_unique(&mut actions, "System is strengthening; re-check warnings every few hours"),
        _ => {}
    }
    actions
}
