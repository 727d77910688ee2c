/// Risk scoring, grid interpolation and formation analysis.
///
/// Submodules:
/// - `cyclone`, `flood`, `ocean`: pure per-domain scoring functions.
/// - `strategy`: the `ScoringStrategy` seam the rest of the engine calls.
/// - `grid`: turns a handful of samples into a complete regional grid.
/// - `formation`: ranks formation candidates across a grid.

pub mod cyclone;
pub mod flood;
pub mod formation;
pub mod grid;
pub mod ocean;
pub mod strategy;

use crate::model::RiskLevel;

/// Maps additive points (0–100) to a probability with four linear segments:
/// [0,30) → 0–0.35, [30,60) → 0.35–0.65, [60,80) → 0.65–0.85,
/// [80,100] → 0.85–1.0. The mapping is continuous and non-decreasing.
pub fn points_to_probability(points: f64) -> f64 {
    let s = points.clamp(0.0, 100.0);
    let p = if s < 30.0 {
        s / 30.0 * 0.35
    } else if s < 60.0 {
        0.35 + (s - 30.0) / 30.0 * 0.30
    } else if s < 80.0 {
        0.65 + (s - 60.0) / 20.0 * 0.20
    } else {
        0.85 + (s - 80.0) / 20.0 * 0.15
    };
    p.clamp(0.0, 1.0)
}

/// Risk level for additive points, using the same bands as the probability
/// mapping.
pub fn points_to_risk_level(points: f64) -> RiskLevel {
    if points < 30.0 {
        RiskLevel::Low
    } else if points < 60.0 {
        RiskLevel::Moderate
    } else if points < 80.0 {
        RiskLevel::High
    } else {
        RiskLevel::Severe
    }
}

/// Risk level for a health index where higher is healthier.
pub fn health_index_to_risk_level(index: f64) -> RiskLevel {
    if index >= 80.0 {
        RiskLevel::Low
    } else if index >= 60.0 {
        RiskLevel::Moderate
    } else if index >= 40.0 {
        RiskLevel::High
    } else {
        RiskLevel::Severe
    }
}
