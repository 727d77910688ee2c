/// Observation normalizer.
///
/// Converts the upstream payload shapes the service understands into a
/// canonical `EnvironmentalObservation`:
///
/// - `asos`: surface station reports in the Iowa Environmental Mesonet
///   style (knots, millibars, inches, °F).
/// - `marine`: buoy and reef-monitoring reports (SST, carbonate chemistry,
///   water quality, bleaching indices).
/// - `canonical`: payloads already in canonical units, which are only
///   range-checked.
///
/// Upstream sentinels (`-999999`) and non-finite numbers are treated as
/// absent. A present value outside its physical range is an error.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::model::{EnvironmentalObservation, ObservationField};

/// Missing-value sentinel used by several upstream providers.
pub const SENTINEL: f64 = -999_999.0;

const KNOTS_TO_KMH: f64 = 1.852;
const INCHES_TO_MM: f64 = 25.4;
const INHG_TO_HPA: f64 = 33.8639;

// ============================================================================
// Payload Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawPayload {
    Asos(AsosPayload),
    Marine(MarinePayload),
    Canonical(EnvironmentalObservation),
}

/// Surface station observation.
#[derive(Debug, Clone, Deserialize)]
pub struct AsosPayload {
    pub station: String,
    pub valid: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "tmpf")]
    pub temp_f: Option<f64>,
    #[serde(rename = "relh")]
    pub relative_humidity: Option<f64>,
    pub sknt: Option<f64>, // Wind speed (knots)
    #[serde(rename = "mslp")]
    pub sea_level_pressure_mb: Option<f64>,
    pub alti: Option<f64>, // Altimeter setting (inches Hg)
    #[serde(rename = "p24i")]
    pub precip_24hr_in: Option<f64>,
    #[serde(rename = "p72i")]
    pub precip_72hr_in: Option<f64>,
    #[serde(default)]
    pub soil_saturation: Option<f64>,
    #[serde(default)]
    pub river_level_m: Option<f64>,
}

/// Buoy or reef sensor observation.
#[derive(Debug, Clone, Deserialize)]
pub struct MarinePayload {
    pub station: String,
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub sst_c: Option<f64>,
    pub sst_f: Option<f64>,
    pub ph: Option<f64>,
    #[serde(rename = "do_mg_l")]
    pub dissolved_oxygen: Option<f64>,
    #[serde(rename = "turbidity_ntu")]
    pub turbidity: Option<f64>,
    #[serde(rename = "chl_mg_m3")]
    pub chlorophyll: Option<f64>,
    pub dhw: Option<f64>,
    #[serde(rename = "hotspot_c")]
    pub hotspot: Option<f64>,
    /// Percent, 0–100.
    pub coral_cover_pct: Option<f64>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unparseable timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("Invalid coordinate {lat},{lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("{field} value {value} outside valid range [{min}, {max}]")]
    OutOfRange {
        field: ObservationField,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ============================================================================
// Normalization
// ============================================================================

/// Parses a JSON body into a payload.
pub fn parse_payload(body: &str) -> Result<RawPayload, NormalizeError> {
    Ok(serde_json::from_str(body)?)
}

/// Accepts RFC 3339, or the bare `%Y-%m-%d %H:%M` format taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .map_err(|_| NormalizeError::InvalidTimestamp(s.to_string()))
}

/// Drops sentinels and non-finite values.
fn clean(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != SENTINEL)
}

fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn normalize(payload: RawPayload) -> Result<EnvironmentalObservation, NormalizeError> {
    let obs = match payload {
        RawPayload::Asos(p) => from_asos(p)?,
        RawPayload::Marine(p) => from_marine(p)?,
        RawPayload::Canonical(mut obs) => {
            for field in ObservationField::iter() {
                let value = clean(obs.get(field));
                let source = obs.source_of(field);
                obs.set(field, value, source);
            }
            obs
        }
    };
    validate(&obs)?;
    Ok(obs)
}

fn from_asos(p: AsosPayload) -> Result<EnvironmentalObservation, NormalizeError> {
    let mut obs = EnvironmentalObservation::new(p.lat, p.lon, parse_timestamp(&p.valid)?);
    obs.wind_speed = clean(p.sknt).map(|kt| kt * KNOTS_TO_KMH);
    obs.pressure = clean(p.sea_level_pressure_mb).or(clean(p.alti).map(|inhg| inhg * INHG_TO_HPA));
    obs.humidity = clean(p.relative_humidity);
    obs.rainfall_24h = clean(p.precip_24hr_in).map(|i| i * INCHES_TO_MM);
    obs.rainfall_72h = clean(p.precip_72hr_in).map(|i| i * INCHES_TO_MM);
    obs.soil_saturation = clean(p.soil_saturation);
    obs.river_level = clean(p.river_level_m);
    log::debug!("normalized ASOS report from {}", p.station);
    Ok(obs)
}

fn from_marine(p: MarinePayload) -> Result<EnvironmentalObservation, NormalizeError> {
    let mut obs = EnvironmentalObservation::new(p.lat, p.lon, parse_timestamp(&p.time)?);
    obs.sea_temp = clean(p.sst_c).or(clean(p.sst_f).map(f_to_c));
    obs.ph = clean(p.ph);
    obs.dissolved_oxygen = clean(p.dissolved_oxygen);
    obs.turbidity = clean(p.turbidity);
    obs.chlorophyll = clean(p.chlorophyll);
    obs.degree_heating_weeks = clean(p.dhw);
    obs.hotspot = clean(p.hotspot);
    obs.coral_coverage = clean(p.coral_cover_pct).map(|pct| pct / 100.0);
    log::debug!("normalized marine report from {}", p.station);
    Ok(obs)
}

/// Range-checks position and every present field.
pub fn validate(obs: &EnvironmentalObservation) -> Result<(), NormalizeError> {
    let coord_ok = obs.lat.is_finite()
        && obs.lng.is_finite()
        && (-90.0..=90.0).contains(&obs.lat)
        && (-180.0..=180.0).contains(&obs.lng);
    if !coord_ok {
        return Err(NormalizeError::InvalidCoordinate { lat: obs.lat, lng: obs.lng });
    }
    for field in ObservationField::iter() {
        if let Some(value) = obs.get(field) {
            if !field.in_range(value) {
                let (min, max) = field.valid_range();
                return Err(NormalizeError::OutOfRange { field, value, min, max });
            }
        }
    }
    Ok(())
}

/// Fills absent fields of `primary` from `secondary`, e.g. a station report
/// merged with a nearby buoy.
pub fn merge(primary: &EnvironmentalObservation, secondary: &EnvironmentalObservation) -> EnvironmentalObservation {
    let mut merged = primary.clone();
    for field in ObservationField::iter() {
        if merged.get(field).is_none() {
            if let Some(value) = secondary.get(field) {
                merged.set(field, Some(value), secondary.source_of(field));
            }
        }
    }
    merged
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldSource;

    const ASOS_JSON: &str = r#"{
        "kind": "asos",
        "station": "YBCS",
        "valid": "2025-02-01T06:00:00Z",
        "lat": -16.88, "lon": 145.75,
        "tmpf": 86.0, "relh": 82.0, "sknt": 50.0,
        "mslp": 992.0, "alti": null,
        "p24i": 4.0, "p72i": -999999
    }"#;

    const MARINE_JSON: &str = r#"{
        "kind": "marine",
        "station": "DAVIES-REEF",
        "time": "2025-02-01 06:00",
        "lat": -18.83, "lon": 147.63,
        "sst_c": null, "sst_f": 84.2,
        "ph": 8.05, "do_mg_l": 6.1, "turbidity_ntu": 0.8,
        "chl_mg_m3": 0.25, "dhw": 3.5, "hotspot_c": 1.2,
        "coral_cover_pct": 35.0
    }"#;

    #[test]
    fn test_asos_units_are_converted() {
        let obs = normalize(parse_payload(ASOS_JSON).unwrap()).expect("valid ASOS payload");
        assert!((obs.wind_speed.unwrap() - 92.6).abs() < 1e-9);
        assert!((obs.rainfall_24h.unwrap() - 101.6).abs() < 1e-9);
        assert_eq!(obs.pressure, Some(992.0));
        assert_eq!(obs.humidity, Some(82.0));
    }

    #[test]
    fn test_sentinel_becomes_absent() {
        let obs = normalize(parse_payload(ASOS_JSON).unwrap()).unwrap();
        assert_eq!(obs.rainfall_72h, None);
    }

    #[test]
    fn test_altimeter_used_when_mslp_missing() {
        let json = ASOS_JSON.replace("\"mslp\": 992.0, \"alti\": null", "\"mslp\": null, \"alti\": 29.92");
        let obs = normalize(parse_payload(&json).unwrap()).unwrap();
        assert!((obs.pressure.unwrap() - 1013.21).abs() < 0.01);
    }

    #[test]
    fn test_marine_payload_converts_fahrenheit_and_percent() {
        let obs = normalize(parse_payload(MARINE_JSON).unwrap()).expect("valid marine payload");
        assert!((obs.sea_temp.unwrap() - 29.0).abs() < 1e-9);
        assert!((obs.coral_coverage.unwrap() - 0.35).abs() < 1e-9);
        assert_eq!(obs.degree_heating_weeks, Some(3.5));
        assert_eq!(obs.timestamp.to_rfc3339(), "2025-02-01T06:00:00+00:00");
    }

    #[test]
    fn test_out_of_range_value_is_rejected() {
        let json = ASOS_JSON.replace("\"relh\": 82.0", "\"relh\": 140.0");
        let err = normalize(parse_payload(&json).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::OutOfRange { field: ObservationField::Humidity, .. }
        ));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let json = ASOS_JSON.replace("2025-02-01T06:00:00Z", "yesterday");
        assert!(matches!(
            normalize(parse_payload(&json).unwrap()),
            Err(NormalizeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_invalid_coordinate_is_rejected() {
        let json = ASOS_JSON.replace("\"lat\": -16.88", "\"lat\": -96.0");
        assert!(matches!(
            normalize(parse_payload(&json).unwrap()),
            Err(NormalizeError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_canonical_payload_passes_through() {
        let json = r#"{"kind":"canonical","lat":-16.0,"lng":150.0,
            "timestamp":"2025-02-01T00:00:00Z","sea_temp":29.5,"wind_shear":4.0}"#;
        let obs = normalize(parse_payload(json).unwrap()).unwrap();
        assert_eq!(obs.sea_temp, Some(29.5));
        assert_eq!(obs.wind_shear, Some(4.0));
        assert_eq!(obs.pressure, None);
    }

    #[test]
    fn test_merge_fills_only_absent_fields() {
        let station = normalize(parse_payload(ASOS_JSON).unwrap()).unwrap();
        let mut buoy = normalize(parse_payload(MARINE_JSON).unwrap()).unwrap();
        buoy.pressure = Some(1005.0);
        buoy.provenance.insert(ObservationField::Ph, FieldSource::Calibrated);
        let merged = merge(&station, &buoy);
        assert_eq!(merged.pressure, Some(992.0), "primary value wins");
        assert_eq!(merged.ph, Some(8.05));
        assert_eq!(merged.source_of(ObservationField::Ph), FieldSource::Calibrated);
        assert_eq!(merged.lat, station.lat);
    }
}
