/// Core data types for the environmental risk monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// observations, risk scores, formation candidates and alerts. It contains no
/// I/O; the only logic here is field access and range metadata that every
/// scorer and the normalizer rely on.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2},{:.2}", self.lat, self.lng)
    }
}

// ---------------------------------------------------------------------------
// Observation fields
// ---------------------------------------------------------------------------

/// Every optional measurement an observation can carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObservationField {
    SeaTemp,
    Pressure,
    WindSpeed,
    WindShear,
    Humidity,
    Vorticity,
    Divergence,
    Rainfall24h,
    Rainfall72h,
    SoilSaturation,
    RiverLevel,
    Ph,
    DissolvedOxygen,
    Turbidity,
    Chlorophyll,
    DegreeHeatingWeeks,
    Hotspot,
    CoralCoverage,
}

impl ObservationField {
    /// Inclusive physical range accepted for this field, in canonical units.
    ///
    /// Units: °C, hPa, km/h, m/s, %, s⁻¹, mm, fraction, m, pH, mg/L, NTU,
    /// mg/m³, °C-weeks, °C, fraction.
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            ObservationField::SeaTemp => (-2.0, 40.0),
            ObservationField::Pressure => (850.0, 1090.0),
            ObservationField::WindSpeed => (0.0, 400.0),
            ObservationField::WindShear => (0.0, 80.0),
            ObservationField::Humidity => (0.0, 100.0),
            ObservationField::Vorticity => (-1e-3, 1e-3),
            ObservationField::Divergence => (-1e-3, 1e-3),
            ObservationField::Rainfall24h => (0.0, 2000.0),
            ObservationField::Rainfall72h => (0.0, 5000.0),
            ObservationField::SoilSaturation => (0.0, 1.0),
            ObservationField::RiverLevel => (-10.0, 100.0),
            ObservationField::Ph => (6.5, 9.0),
            ObservationField::DissolvedOxygen => (0.0, 20.0),
            ObservationField::Turbidity => (0.0, 1000.0),
            ObservationField::Chlorophyll => (0.0, 100.0),
            ObservationField::DegreeHeatingWeeks => (0.0, 40.0),
            ObservationField::Hotspot => (-10.0, 10.0),
            ObservationField::CoralCoverage => (0.0, 1.0),
        }
    }

    pub fn in_range(self, value: f64) -> bool {
        let (lo, hi) = self.valid_range();
        value.is_finite() && value >= lo && value <= hi
    }
}

/// Where a field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldSource {
    /// Read directly from an instrument or upstream provider.
    Measured,
    /// Climatological baseline shifted by a bias from a nearby real sample.
    Calibrated,
    /// Pure climatological default.
    Climatology,
}

impl FieldSource {
    /// Contribution of one input with this provenance to a score's confidence.
    pub fn confidence_weight(self) -> f64 {
        match self {
            FieldSource::Measured => 1.0,
            FieldSource::Calibrated => 0.8,
            FieldSource::Climatology => 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A point-in-time, point-in-space environmental reading in canonical units.
///
/// Only `lat`, `lng` and `timestamp` are mandatory. Scorers never substitute
/// missing inputs; the grid interpolator does, and records each substitution
/// in `provenance` so it shows up in the resulting confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalObservation {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sea_temp: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_shear: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub vorticity: Option<f64>,
    #[serde(default)]
    pub divergence: Option<f64>,
    #[serde(default)]
    pub rainfall_24h: Option<f64>,
    #[serde(default)]
    pub rainfall_72h: Option<f64>,
    #[serde(default)]
    pub soil_saturation: Option<f64>,
    #[serde(default)]
    pub river_level: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub dissolved_oxygen: Option<f64>,
    #[serde(default)]
    pub turbidity: Option<f64>,
    #[serde(default)]
    pub chlorophyll: Option<f64>,
    #[serde(default)]
    pub degree_heating_weeks: Option<f64>,
    #[serde(default)]
    pub hotspot: Option<f64>,
    #[serde(default)]
    pub coral_coverage: Option<f64>,
    /// Non-measured fields only; a field absent from this map is `Measured`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provenance: BTreeMap<ObservationField, FieldSource>,
}

impl EnvironmentalObservation {
    /// An observation with only its position and time set.
    pub fn new(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat,
            lng,
            timestamp,
            sea_temp: None,
            pressure: None,
            wind_speed: None,
            wind_shear: None,
            humidity: None,
            vorticity: None,
            divergence: None,
            rainfall_24h: None,
            rainfall_72h: None,
            soil_saturation: None,
            river_level: None,
            ph: None,
            dissolved_oxygen: None,
            turbidity: None,
            chlorophyll: None,
            degree_heating_weeks: None,
            hotspot: None,
            coral_coverage: None,
            provenance: BTreeMap::new(),
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn get(&self, field: ObservationField) -> Option<f64> {
        match field {
            ObservationField::SeaTemp => self.sea_temp,
            ObservationField::Pressure => self.pressure,
            ObservationField::WindSpeed => self.wind_speed,
            ObservationField::WindShear => self.wind_shear,
            ObservationField::Humidity => self.humidity,
            ObservationField::Vorticity => self.vorticity,
            ObservationField::Divergence => self.divergence,
            ObservationField::Rainfall24h => self.rainfall_24h,
            ObservationField::Rainfall72h => self.rainfall_72h,
            ObservationField::SoilSaturation => self.soil_saturation,
            ObservationField::RiverLevel => self.river_level,
            ObservationField::Ph => self.ph,
            ObservationField::DissolvedOxygen => self.dissolved_oxygen,
            ObservationField::Turbidity => self.turbidity,
            ObservationField::Chlorophyll => self.chlorophyll,
            ObservationField::DegreeHeatingWeeks => self.degree_heating_weeks,
            ObservationField::Hotspot => self.hotspot,
            ObservationField::CoralCoverage => self.coral_coverage,
        }
    }

    fn slot(&mut self, field: ObservationField) -> &mut Option<f64> {
        match field {
            ObservationField::SeaTemp => &mut self.sea_temp,
            ObservationField::Pressure => &mut self.pressure,
            ObservationField::WindSpeed => &mut self.wind_speed,
            ObservationField::WindShear => &mut self.wind_shear,
            ObservationField::Humidity => &mut self.humidity,
            ObservationField::Vorticity => &mut self.vorticity,
            ObservationField::Divergence => &mut self.divergence,
            ObservationField::Rainfall24h => &mut self.rainfall_24h,
            ObservationField::Rainfall72h => &mut self.rainfall_72h,
            ObservationField::SoilSaturation => &mut self.soil_saturation,
            ObservationField::RiverLevel => &mut self.river_level,
            ObservationField::Ph => &mut self.ph,
            ObservationField::DissolvedOxygen => &mut self.dissolved_oxygen,
            ObservationField::Turbidity => &mut self.turbidity,
            ObservationField::Chlorophyll => &mut self.chlorophyll,
            ObservationField::DegreeHeatingWeeks => &mut self.degree_heating_weeks,
            ObservationField::Hotspot => &mut self.hotspot,
            ObservationField::CoralCoverage => &mut self.coral_coverage,
        }
    }

    /// Sets a field and records where the value came from.
    pub fn set(&mut self, field: ObservationField, value: Option<f64>, source: FieldSource) {
        *self.slot(field) = value;
        match source {
            FieldSource::Measured => {
                self.provenance.remove(&field);
            }
            other => {
                self.provenance.insert(field, other);
            }
        }
    }

    pub fn source_of(&self, field: ObservationField) -> FieldSource {
        self.provenance
            .get(&field)
            .copied()
            .unwrap_or(FieldSource::Measured)
    }

    /// Returns a required scoring input, failing loudly when it is absent,
    /// non-finite or outside its physical range.
    pub fn require(&self, domain: Domain, field: ObservationField) -> Result<f64, ScoringError> {
        let value = self
            .get(field)
            .ok_or(ScoringError::MissingField { domain, field })?;
        check_value(field, value)?;
        Ok(value)
    }

    /// Returns an optional scoring input, validating it when present.
    pub fn optional(&self, field: ObservationField) -> Result<Option<f64>, ScoringError> {
        match self.get(field) {
            Some(value) => {
                check_value(field, value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Mean provenance weight over the fields a scorer actually read.
    pub fn confidence_for(&self, fields: &[ObservationField]) -> f64 {
        if fields.is_empty() {
            return 0.0;
        }
        let total: f64 = fields
            .iter()
            .map(|f| self.source_of(*f).confidence_weight())
            .sum();
        (total / fields.len() as f64).clamp(0.0, 1.0)
    }

    /// Number of fields that were not measured directly.
    pub fn substituted_count(&self) -> usize {
        self.provenance.len()
    }
}

fn check_value(field: ObservationField, value: f64) -> Result<(), ScoringError> {
    if !value.is_finite() {
        return Err(ScoringError::InvalidField {
            field,
            value,
            reason: "value is not finite".to_string(),
        });
    }
    if !field.in_range(value) {
        let (lo, hi) = field.valid_range();
        return Err(ScoringError::InvalidField {
            field,
            value,
            reason: format!("outside valid range [{lo}, {hi}]"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Risk scores
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Cyclone,
    Flood,
    OceanHealth,
    Reef,
}

impl Domain {
    /// Which direction of `probability_or_score` means more danger.
    pub fn polarity(self) -> Polarity {
        match self {
            Domain::Cyclone | Domain::Flood => Polarity::HigherIsWorse,
            Domain::OceanHealth | Domain::Reef => Polarity::HigherIsBetter,
        }
    }
}

/// Cyclone and flood probabilities rise with danger; ocean and reef health
/// indices fall with it. `risk_level` is always expressed as danger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Polarity {
    HigherIsWorse,
    HigherIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreScale {
    /// `probability_or_score` in [0, 1].
    Probability,
    /// `probability_or_score` in [0, 100].
    Index100,
}

impl ScoreScale {
    pub fn max(self) -> f64 {
        match self {
            ScoreScale::Probability => 1.0,
            ScoreScale::Index100 => 100.0,
        }
    }
}

/// Risk levels in ascending order of danger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Severe,
}

/// Named drivers a scorer can report. Recommendations key off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactorKind {
    LowPressure,
    HighWind,
    HeavyRainfall,
    RainfallAccumulation,
    SoilSaturation,
    ThermalStress,
    HeatStress,
    TemperatureAnomaly,
    Acidification,
    Hypoxia,
    Turbidity,
    Eutrophication,
    OptimalPh,
    OptimalTemperature,
    CoralCover,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub kind: FactorKind,
    pub name: String,
    /// Points added (positive) or removed (negative) by this factor.
    pub weight_contribution: f64,
    pub description: String,
}

impl ContributingFactor {
    pub fn new(kind: FactorKind, weight_contribution: f64, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.to_string(),
            weight_contribution,
            description: description.into(),
        }
    }
}

/// Domain-tagged scoring result. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub domain: Domain,
    pub polarity: Polarity,
    pub scale: ScoreScale,
    /// Additive points before the probability mapping (0–100).
    pub raw_score: f64,
    pub probability_or_score: f64,
    pub risk_level: RiskLevel,
    pub contributing_factors: Vec<ContributingFactor>,
    pub confidence: f64,
    pub explanation: String,
    pub location: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

impl RiskScore {
    pub fn has_factor(&self, kind: FactorKind) -> bool {
        self.contributing_factors.iter().any(|f| f.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Formation candidates
// ---------------------------------------------------------------------------

/// Expected peak intensity on the Saffir–Simpson scale, in ascending order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntensityBucket {
    TropicalDepression,
    TropicalStorm,
    Category1,
    Category2,
    Category3,
    Category4,
    Category5,
}

impl IntensityBucket {
    /// Buckets a 1-minute sustained wind speed in knots.
    pub fn from_wind_kt(wind_kt: f64) -> Self {
        if wind_kt >= 137.0 {
            IntensityBucket::Category5
        } else if wind_kt >= 113.0 {
            IntensityBucket::Category4
        } else if wind_kt >= 96.0 {
            IntensityBucket::Category3
        } else if wind_kt >= 83.0 {
            IntensityBucket::Category2
        } else if wind_kt >= 64.0 {
            IntensityBucket::Category1
        } else if wind_kt >= 34.0 {
            IntensityBucket::TropicalStorm
        } else {
            IntensityBucket::TropicalDepression
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentalFactors {
    pub sea_temp_favorable: bool,
    pub low_wind_shear: bool,
    pub sufficient_moisture: bool,
    pub atmospheric_instability: bool,
}

impl EnvironmentalFactors {
    pub fn favorable_count(&self) -> usize {
        [
            self.sea_temp_favorable,
            self.low_wind_shear,
            self.sufficient_moisture,
            self.atmospheric_instability,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// A scored location where conditions favour cyclogenesis. Produced fresh per
/// forecast run and only ever superseded, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationCandidate {
    pub id: Uuid,
    pub location: GeoPoint,
    pub formation_probability: f64,
    pub time_to_formation_hours: f64,
    pub expected_formation_timestamp: DateTime<Utc>,
    pub expected_intensity_bucket: IntensityBucket,
    pub expected_max_wind_kt: f64,
    pub environmental_factors: EnvironmentalFactors,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    Formation,
    Tracking,
    Landfall,
    Intensification,
    Flood,
    OceanHealth,
    Reef,
}

/// Alert severity levels, in ascending order of severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl From<RiskLevel> for Severity {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Severity::Low,
            RiskLevel::Moderate => Severity::Moderate,
            RiskLevel::High => Severity::High,
            RiskLevel::Severe => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
    pub source_data: serde_json::Value,
    pub recommended_actions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Identifiers and randomness
// ---------------------------------------------------------------------------

/// The engine's single source of randomness, shared by the interpolator,
/// the formation analyzer and id generation.
pub type SharedRng = Arc<Mutex<StdRng>>;

pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

/// A v4 UUID drawn from `rng`, so ids are reproducible under a fixed seed.
pub fn random_id<R: RngCore + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the scoring functions and strategies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    /// A required input for the domain was absent.
    #[error("{domain} scoring requires {field}, which is missing")]
    MissingField {
        domain: Domain,
        field: ObservationField,
    },
    /// An input was present but unusable.
    #[error("invalid {field} value {value}: {reason}")]
    InvalidField {
        field: ObservationField,
        value: f64,
        reason: String,
    },
    /// A scoring strategy could not produce a result (e.g. no trained model).
    #[error("scoring strategy '{strategy}' unavailable: {reason}")]
    StrategyUnavailable { strategy: String, reason: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
