//! Regional cyclone formation analysis.
//!
//! Every grid cell gets a favorability score from sea temperature, wind
//! shear, humidity and vorticity. The primary path blends favorability with
//! the active [`ScoringStrategy`]'s cyclone probability; if the strategy
//! fails, the whole run switches to the statistical fallback path, which
//! uses favorability alone with a lower cutoff and a longer candidate list.
//! Both paths scale by season and basin.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::climatology;
use crate::config::FormationSettings;
use crate::model::{
    Domain, EnvironmentalFactors, EnvironmentalObservation, FormationCandidate, IntensityBucket,
    ObservationField, ScoringError, random_id,
};
use crate::regions::{Region, geographic_multiplier};

use super::grid::Grid;
use super::strategy::ScoringStrategy;

/// Inputs favorability reads; used for forecast confidence.
pub const FORMATION_FIELDS: [ObservationField; 4] = [
    ObservationField::SeaTemp,
    ObservationField::WindShear,
    ObservationField::Humidity,
    ObservationField::Vorticity,
];

/// Favorability multiplier when SST is below the formation threshold.
const COOL_WATER_DAMPING: f64 = 0.3;
const MIN_TIME_TO_FORMATION_H: f64 = 6.0;
const TIME_JITTER_H: f64 = 6.0;
const WIND_JITTER_KT: f64 = 5.0;
/// Combined season × basin multiplier at which expected intensity peaks.
const INTENSITY_MULTIPLIER_CAP: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastPath {
    Primary,
    StatisticalFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActivityLevel {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

/// Buckets `average_probability × candidate_count` at 0.5 / 1 / 2 / 3.
pub fn activity_level(average_probability: f64, candidate_count: usize) -> ActivityLevel {
    let activity = average_probability * candidate_count as f64;
    if activity >= 3.0 {
        ActivityLevel::VeryHigh
    } else if activity >= 2.0 {
        ActivityLevel::High
    } else if activity >= 1.0 {
        ActivityLevel::Moderate
    } else if activity >= 0.5 {
        ActivityLevel::Low
    } else {
        ActivityLevel::VeryLow
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationForecast {
    pub region: String,
    pub generated_at: DateTime<Utc>,
    pub forecast_days: u32,
    pub path: ForecastPath,
    /// Probability-descending, truncated to the path's top K.
    pub candidates: Vec<FormationCandidate>,
    pub activity_level: ActivityLevel,
    pub average_probability: f64,
    pub cells_evaluated: usize,
    pub samples_used: usize,
    pub samples_failed: usize,
    pub confidence: f64,
    pub explanation: String,
}

/// Favorability in [0, 1] plus the four threshold checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Favorability {
    pub score: f64,
    pub factors: EnvironmentalFactors,
}

fn unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

pub fn favorability(obs: &EnvironmentalObservation, settings: &FormationSettings) -> Result<Favorability, ScoringError> {
    let sst = obs.require(Domain::Cyclone, ObservationField::SeaTemp)?;
    let shear = obs.require(Domain::Cyclone, ObservationField::WindShear)?;
    let humidity = obs.require(Domain::Cyclone, ObservationField::Humidity)?;
    let vorticity = obs.require(Domain::Cyclone, ObservationField::Vorticity)?;

    let t = unit((sst - 25.0) / 4.0);
    let s = unit((20.0 - shear) / 15.0);
    let h = unit((humidity - 50.0) / 35.0);
    let v = unit(vorticity / 5e-5);
    let mut score = 0.30 * t + 0.25 * s + 0.25 * h + 0.20 * v;

    let factors = EnvironmentalFactors {
        sea_temp_favorable: sst >= settings.sst_threshold_c,
        low_wind_shear: shear <= settings.max_wind_shear_ms,
        sufficient_moisture: humidity >= settings.min_humidity_pct,
        atmospheric_instability: vorticity >= settings.min_vorticity,
    };
    if !factors.sea_temp_favorable {
        score *= COOL_WATER_DAMPING;
    }
    Ok(Favorability { score: unit(score), factors })
}

pub struct FormationAnalyzer {
    settings: FormationSettings,
    strategy: Arc<dyn ScoringStrategy>,
}

impl FormationAnalyzer {
    pub fn new(settings: FormationSettings, strategy: Arc<dyn ScoringStrategy>) -> Self {
        Self { settings, strategy }
    }

    /// Ranks formation candidates across `grid`.
    ///
    /// `samples_failed` is carried into the forecast for reporting only.
    pub fn analyze<R: Rng>(
        &self,
        region: &Region,
        grid: &Grid,
        forecast_days: u32,
        samples_failed: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> FormationForecast {
        let horizon_hours = f64::from(forecast_days) * 24.0;

        // Primary path needs a cyclone probability for every cell.
        let cyclone_probabilities: Result<Vec<f64>, ScoringError> = grid
            .cells
            .iter()
            .map(|c| {
                self.strategy
                    .predict(Domain::Cyclone, &c.observation)
                    .map(|s| s.probability_or_score)
            })
            .collect();
        let (path, cyclone_probabilities) = match cyclone_probabilities {
            Ok(p) => (ForecastPath::Primary, Some(p)),
            Err(e) => {
                log::warn!(
                    "[{}] strategy '{}' failed ({e}), using statistical fallback",
                    region.name,
                    self.strategy.name()
                );
                (ForecastPath::StatisticalFallback, None)
            }
        };

        let mut candidates = Vec::new();
        for (i, cell) in grid.cells.iter().enumerate() {
            let p_cyclone = cyclone_probabilities.as_ref().map(|p| p[i]);
            match self.evaluate_cell(&cell.observation, p_cyclone, &region.name, horizon_hours, now, rng) {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(e) => log::debug!("[{}] cell {},{} skipped: {e}", region.name, cell.row, cell.col),
            }
        }

        let top_k = match path {
            ForecastPath::Primary => self.settings.primary_top_k,
            ForecastPath::StatisticalFallback => self.settings.fallback_top_k,
        };
        candidates.sort_by(|a, b| b.formation_probability.total_cmp(&a.formation_probability));
        candidates.truncate(top_k);

        let average_probability = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|c| c.formation_probability).sum::<f64>() / candidates.len() as f64
        };
        let activity = activity_level(average_probability, candidates.len());

        let input_confidence = if grid.is_empty() {
            0.0
        } else {
            grid.cells
                .iter()
                .map(|c| c.observation.confidence_for(&FORMATION_FIELDS))
                .sum::<f64>()
                / grid.len() as f64
        };
        let confidence = match path {
            ForecastPath::Primary => input_confidence,
            ForecastPath::StatisticalFallback => input_confidence * 0.8,
        };

        let mut explanation = format!(
            "{} candidate(s) across {} cells over {} day(s) via {} path (strategy '{}'); \
             activity {activity}, mean probability {average_probability:.2}; \
             {} live sample(s), {samples_failed} failed",
            candidates.len(),
            grid.len(),
            forecast_days,
            path,
            self.strategy.name(),
            grid.samples_used,
        );
        if grid.samples_used == 0 {
            explanation.push_str("; conditions from climatology only");
        }

        FormationForecast {
            region: region.name.clone(),
            generated_at: now,
            forecast_days,
            path,
            candidates,
            activity_level: activity,
            average_probability,
            cells_evaluated: grid.len(),
            samples_used: grid.samples_used,
            samples_failed,
            confidence: confidence.clamp(0.0, 1.0),
            explanation,
        }
    }

    /// Scores one cell. `p_cyclone` is `Some` on the primary path.
    ///
    /// Returns `Ok(None)` when the cell is at or below the path's cutoff or
    /// is not expected to form within `horizon_hours`.
    pub fn evaluate_cell<R: Rng>(
        &self,
        obs: &EnvironmentalObservation,
        p_cyclone: Option<f64>,
        region: &str,
        horizon_hours: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Option<FormationCandidate>, ScoringError> {
        let fav = favorability(obs, &self.settings)?;
        let location = obs.location();
        let season = climatology::seasonal_multiplier(climatology::season_at(location.lat, now));
        let geo = geographic_multiplier(location);
        let multiplier = season * geo;

        let (blended, cutoff) = match p_cyclone {
            Some(p) => (0.7 * fav.score + 0.3 * p, self.settings.primary_cutoff),
            None => (fav.score, self.settings.fallback_cutoff),
        };
        let probability = (blended * multiplier).clamp(0.0, self.settings.probability_cap);
        if probability <= cutoff {
            return Ok(None);
        }

        let base_hours = (12.0 + 120.0 * (1.0 - fav.score)) / multiplier;
        let hours = (base_hours + rng.gen_range(-TIME_JITTER_H..=TIME_JITTER_H)).max(MIN_TIME_TO_FORMATION_H);
        if hours > horizon_hours {
            return Ok(None);
        }

        let intensity = multiplier.min(INTENSITY_MULTIPLIER_CAP) / INTENSITY_MULTIPLIER_CAP;
        let wind_kt = (25.0 + 95.0 * fav.score * intensity + rng.gen_range(-WIND_JITTER_KT..=WIND_JITTER_KT)).max(20.0);

        Ok(Some(FormationCandidate {
            id: random_id(rng),
            location,
            formation_probability: probability,
            time_to_formation_hours: hours,
            expected_formation_timestamp: now + Duration::seconds((hours * 3600.0).round() as i64),
            expected_intensity_bucket: IntensityBucket::from_wind_kt(wind_kt),
            expected_max_wind_kt: wind_kt,
            environmental_factors: fav.factors,
            region: region.to_string(),
            created_at: now,
        }))
    }
}
