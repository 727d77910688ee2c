//! Pluggable scoring backends.
//!
//! Every consumer of point scores (the formation analyzer, the engine's
//! public scoring calls and point assessment) goes through
//! [`ScoringStrategy`], so a trained model can replace the weighted
//! heuristics without touching the alert pipeline.

use crate::model::{Domain, EnvironmentalObservation, RiskScore, ScoringError};

use super::{cyclone, flood, ocean};

pub trait ScoringStrategy: Send + Sync {
    /// Identifier used in logs and forecast explanations.
    fn name(&self) -> &str;

    /// Scores one observation for one domain.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError`] when a required input is missing or invalid,
    /// or when the backend itself cannot produce a score.
    fn predict(&self, domain: Domain, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError>;
}

/// Fixed-weight heuristic scoring, the default backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicStrategy;

impl ScoringStrategy for HeuristicStrategy {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn predict(&self, domain: Domain, obs: &EnvironmentalObservation) -> Result<RiskScore, ScoringError> {
        match domain {
            Domain::Cyclone => cyclone::score_cyclone(obs),
            Domain::Flood => flood::score_flood(obs),
            Domain::OceanHealth => ocean::score_ocean_health(obs).map(|a| a.overall),
            Domain::Reef => ocean::score_ocean_health(obs).map(|a| a.reef),
        }
    }
}
