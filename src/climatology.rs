//! Climatological defaults.
//!
//! Only the grid interpolator and the point-assessment fallback may substitute
//! these values for real data, and every substituted field is tagged
//! [`FieldSource::Climatology`] so downstream confidence drops accordingly.
//!
//! Vorticity is expressed relative to the local cyclonic sense, so positive
//! values favour cyclogenesis in both hemispheres.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::{EnvironmentalObservation, FieldSource, ObservationField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Season {
    Peak,
    Shoulder,
    Off,
}

/// Tropical cyclone season for a latitude and calendar month (1–12).
pub fn season_for(lat: f64, month: u32) -> Season {
    if lat >= 0.0 {
        match month {
            8..=10 => Season::Peak,
            6 | 7 | 11 => Season::Shoulder,
            _ => Season::Off,
        }
    } else {
        match month {
            1..=3 => Season::Peak,
            12 | 4 => Season::Shoulder,
            _ => Season::Off,
        }
    }
}

pub fn season_at(lat: f64, timestamp: DateTime<Utc>) -> Season {
    season_for(lat, timestamp.month())
}

/// Scales formation probability and intensity by season.
pub fn seasonal_multiplier(season: Season) -> f64 {
    match season {
        Season::Peak => 1.2,
        Season::Shoulder => 0.8,
        Season::Off => 0.3,
    }
}

/// Degrees of latitude poleward of the deep tropics.
fn extratropical_excess(lat: f64) -> f64 {
    (lat.abs() - 10.0).max(0.0)
}

/// Western-boundary warm pools run a little hotter than the open ocean.
fn warm_pool_bonus(lng: f64) -> f64 {
    if (100.0..=180.0).contains(&lng) || (-100.0..=-60.0).contains(&lng) {
        0.4
    } else {
        0.0
    }
}

/// Warmest monthly-mean SST expected at this latitude, used to derive a
/// coral bleaching hotspot when an observation does not carry one.
pub fn max_monthly_mean_sst(lat: f64) -> f64 {
    (29.5 - 0.25 * extratropical_excess(lat)).max(0.0)
}

/// A complete observation built entirely from climatology.
pub fn baseline(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> EnvironmentalObservation {
    let season = season_at(lat, timestamp);
    let excess = extratropical_excess(lat);

    let sst_adjust = match season {
        Season::Peak => 0.5,
        Season::Shoulder => 0.0,
        Season::Off => -0.8,
    };
    let sea_temp = (29.0 - 0.25 * excess + sst_adjust + warm_pool_bonus(lng)).clamp(-1.8, 31.5);

    let pressure = 1012.0 + 0.1 * excess
        - match season {
            Season::Peak => 4.0,
            Season::Shoulder => 2.0,
            Season::Off => 0.0,
        };

    let wind_shear = match season {
        Season::Peak => 9.0,
        Season::Shoulder => 12.0,
        Season::Off => 16.0,
    } + 0.3 * excess;

    let humidity = (match season {
        Season::Peak => 78.0,
        Season::Shoulder => 72.0,
        Season::Off => 65.0,
    } - 0.5 * excess)
        .clamp(20.0, 100.0);

    let (vorticity, divergence) = match season {
        Season::Peak => (2.0e-5, 1.0e-6),
        Season::Shoulder => (1.2e-5, 0.0),
        Season::Off => (0.5e-5, 0.0),
    };

    let (rain_24h, rain_72h, soil) = match season {
        Season::Peak => (12.0, 32.0, 0.55),
        Season::Shoulder => (7.0, 18.0, 0.45),
        Season::Off => (3.0, 8.0, 0.35),
    };

    let values = [
        (ObservationField::SeaTemp, sea_temp),
        (ObservationField::Pressure, pressure),
        (ObservationField::WindSpeed, 20.0 + 0.4 * excess),
        (ObservationField::WindShear, wind_shear),
        (ObservationField::Humidity, humidity),
        (ObservationField::Vorticity, vorticity),
        (ObservationField::Divergence, divergence),
        (ObservationField::Rainfall24h, rain_24h),
        (ObservationField::Rainfall72h, rain_72h),
        (ObservationField::SoilSaturation, soil),
        (ObservationField::RiverLevel, 1.5),
        (ObservationField::Ph, 8.05),
        (ObservationField::DissolvedOxygen, 6.4),
        (ObservationField::Turbidity, 1.5),
        (ObservationField::Chlorophyll, 0.3),
        (ObservationField::DegreeHeatingWeeks, 0.0),
        (ObservationField::Hotspot, 0.0),
        (ObservationField::CoralCoverage, 0.3),
    ];

    let mut obs = EnvironmentalObservation::new(lat, lng, timestamp);
    for (field, value) in values {
        obs.set(field, Some(value), FieldSource::Climatology);
    }
    obs
}
