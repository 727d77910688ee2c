/// Region and basin registry for the risk monitoring service.
///
/// Defines the bounding-box type used for monitored regions, the static
/// table of known high-activity cyclone basins that drives the geographic
/// multiplier, and river gauge stage thresholds for flood depth estimates.
/// All other modules should look basins up from here rather than
/// hardcoding coordinates.

use serde::{Deserialize, Serialize};

use crate::model::GeoPoint;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic multiplier applied outside every registered basin.
pub const OUTSIDE_BASIN_MULTIPLIER: f64 = 0.7;

// ---------------------------------------------------------------------------
// Bounding boxes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self { min_lat, max_lat, min_lng, max_lng }
    }

    /// Rejects boxes that cannot describe a region on the globe.
    ///
    /// Boxes crossing the antimeridian are not supported; split them into
    /// two regions instead.
    pub fn validate(&self) -> Result<(), String> {
        let values = [self.min_lat, self.max_lat, self.min_lng, self.max_lng];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("bounds must be finite numbers".to_string());
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(format!(
                "latitude must lie in [-90, 90], got [{}, {}]",
                self.min_lat, self.max_lat
            ));
        }
        if self.min_lng < -180.0 || self.max_lng > 180.0 {
            return Err(format!(
                "longitude must lie in [-180, 180], got [{}, {}]",
                self.min_lng, self.max_lng
            ));
        }
        if self.min_lat >= self.max_lat {
            return Err(format!(
                "min_lat ({}) must be below max_lat ({})",
                self.min_lat, self.max_lat
            ));
        }
        if self.min_lng >= self.max_lng {
            return Err(format!(
                "min_lng ({}) must be below max_lng ({})",
                self.min_lng, self.max_lng
            ));
        }
        Ok(())
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// The centre plus the centre of each quadrant: the points sampled to
    /// calibrate a regional grid.
    pub fn sample_points(&self) -> Vec<GeoPoint> {
        let c = self.center();
        let q_lat = (self.max_lat - self.min_lat) / 4.0;
        let q_lng = (self.max_lng - self.min_lng) / 4.0;
        vec![
            c,
            GeoPoint::new(c.lat + q_lat, c.lng - q_lng),
            GeoPoint::new(c.lat + q_lat, c.lng + q_lng),
            GeoPoint::new(c.lat - q_lat, c.lng - q_lng),
            GeoPoint::new(c.lat - q_lat, c.lng + q_lng),
        ]
    }
}

/// A named monitored sub-region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    #[serde(flatten)]
    pub bounds: BoundingBox,
}

// ---------------------------------------------------------------------------
// Cyclone basins
// ---------------------------------------------------------------------------

/// A known high-activity tropical cyclone basin.
pub struct Basin {
    pub name: &'static str,
    pub bounds: BoundingBox,
    /// Geographic multiplier for candidates inside this basin (1.1–1.3).
    pub activity_multiplier: f64,
}

/// Core genesis areas of the world's cyclone basins. Boxes are kept inside
/// [-180, 180] so none crosses the antimeridian.
pub static BASIN_REGISTRY: &[Basin] = &[
    Basin {
        name: "Western North Pacific",
        bounds: BoundingBox::new(5.0, 30.0, 120.0, 180.0),
        activity_multiplier: 1.3,
    },
    Basin {
        name: "Eastern North Pacific",
        bounds: BoundingBox::new(8.0, 20.0, -125.0, -90.0),
        activity_multiplier: 1.2,
    },
    Basin {
        name: "North Atlantic Main Development Region",
        bounds: BoundingBox::new(8.0, 22.0, -65.0, -18.0),
        activity_multiplier: 1.2,
    },
    Basin {
        name: "Gulf of Mexico and Caribbean",
        bounds: BoundingBox::new(10.0, 30.0, -98.0, -65.0),
        activity_multiplier: 1.15,
    },
    Basin {
        name: "Bay of Bengal",
        bounds: BoundingBox::new(5.0, 22.0, 80.0, 95.0),
        activity_multiplier: 1.15,
    },
    Basin {
        name: "Arabian Sea",
        bounds: BoundingBox::new(8.0, 22.0, 60.0, 75.0),
        activity_multiplier: 1.1,
    },
    Basin {
        name: "South-West Indian Ocean",
        bounds: BoundingBox::new(-25.0, -5.0, 40.0, 90.0),
        activity_multiplier: 1.15,
    },
    Basin {
        name: "Australian Region and Coral Sea",
        bounds: BoundingBox::new(-25.0, -8.0, 105.0, 160.0),
        activity_multiplier: 1.2,
    },
    Basin {
        name: "South Pacific",
        bounds: BoundingBox::new(-25.0, -5.0, 160.0, 180.0),
        activity_multiplier: 1.1,
    },
];

/// Returns the first registered basin containing `point`.
pub fn find_basin(point: GeoPoint) -> Option<&'static Basin> {
    BASIN_REGISTRY.iter().find(|b| b.bounds.contains(point))
}

/// Geographic multiplier for formation probability and intensity.
pub fn geographic_multiplier(point: GeoPoint) -> f64 {
    find_basin(point)
        .map(|b| b.activity_multiplier)
        .unwrap_or(OUTSIDE_BASIN_MULTIPLIER)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

// ---------------------------------------------------------------------------
// Monitored locations and river stages
// ---------------------------------------------------------------------------

/// River gauge stage thresholds in metres.
///
/// Stage levels in ascending order:
///   action < flood < moderate < major
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodStageThresholds {
    pub action_m: f64,
    pub flood_m: f64,
    pub moderate_m: f64,
    pub major_m: f64,
}

impl FloodStageThresholds {
    pub fn is_ordered(&self) -> bool {
        self.action_m < self.flood_m && self.flood_m < self.moderate_m && self.moderate_m < self.major_m
    }
}

/// A named place watched for landfall proximity and river stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub river_stages: Option<FloodStageThresholds>,
}

impl MonitoredLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Returns the closest monitored location within `max_km` of `point`.
pub fn nearest_location<'a>(
    locations: &'a [MonitoredLocation],
    point: GeoPoint,
    max_km: f64,
) -> Option<(&'a MonitoredLocation, f64)> {
    locations
        .iter()
        .map(|loc| (loc, haversine_km(loc.point(), point)))
        .filter(|(_, d)| *d <= max_km)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
