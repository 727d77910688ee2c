//! Spatial grid interpolation.
//!
//! Turns a handful of real samples into a complete grid of observations over
//! a bounding box. Every cell starts from the climatological baseline for its
//! position and date, so no cell is ever left empty. With samples present the
//! baseline is shifted toward current conditions, and every substituted
//! field is tagged in the observation's provenance.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{AbortRegistration, Abortable, join_all};
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoEnumIterator};

use crate::climatology;
use crate::config::GridSettings;
use crate::ingest::normalize;
use crate::ingest::source::{FetchError, ObservationSource, fetch_with_timeout};
use crate::logging;
use crate::model::{EnvironmentalObservation, FieldSource, GeoPoint, ObservationField};
use crate::regions::{BoundingBox, haversine_km};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterpolationMethod {
    /// Shift every cell's baseline by the damped bias of one reference sample.
    Calibrated,
    /// Copy the nearest sample's fields into each cell.
    NearestSample,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub observation: EnvironmentalObservation,
}

#[derive(Debug, Clone)]
pub struct Grid {
    pub bounds: BoundingBox,
    pub resolution_deg: f64,
    pub rows: usize,
    pub cols: usize,
    /// Row-major, south-west first.
    pub cells: Vec<GridCell>,
    pub samples_used: usize,
}

impl Grid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }
}

/// Half-width of the uniform perturbation applied to non-measured values.
fn jitter_scale(field: ObservationField) -> f64 {
    match field {
        ObservationField::SeaTemp => 0.3,
        ObservationField::Pressure => 1.0,
        ObservationField::WindSpeed => 3.0,
        ObservationField::WindShear => 1.0,
        ObservationField::Humidity => 2.0,
        ObservationField::Vorticity => 2e-6,
        ObservationField::Divergence => 1e-6,
        ObservationField::Rainfall24h => 2.0,
        ObservationField::Rainfall72h => 4.0,
        ObservationField::SoilSaturation => 0.02,
        ObservationField::RiverLevel => 0.05,
        ObservationField::Ph => 0.01,
        ObservationField::DissolvedOxygen => 0.1,
        ObservationField::Turbidity => 0.1,
        ObservationField::Chlorophyll => 0.02,
        ObservationField::DegreeHeatingWeeks => 0.1,
        ObservationField::Hotspot => 0.05,
        ObservationField::CoralCoverage => 0.01,
    }
}

fn clamp_to_range(field: ObservationField, value: f64) -> f64 {
    let (lo, hi) = field.valid_range();
    value.clamp(lo, hi)
}

/// Number of cells along one axis; a span smaller than a cell still gets one.
fn cells_along(span: f64, resolution: f64) -> usize {
    ((span / resolution) - 1e-9).ceil().max(1.0) as usize
}

/// Clipped extent of cell `index` along one axis.
fn cell_extent(min: f64, max: f64, resolution: f64, index: usize) -> (f64, f64) {
    let lo = min + resolution * index as f64;
    (lo, (lo + resolution).min(max))
}

pub struct GridInterpolator {
    settings: GridSettings,
}

impl GridInterpolator {
    pub fn new(settings: GridSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// Builds the grid for `bounds` at time `at`.
    ///
    /// Deterministic for a given seed: cells are visited row-major and fields
    /// in declaration order, so the RNG draws happen in a fixed sequence.
    pub fn interpolate<R: Rng>(
        &self,
        bounds: &BoundingBox,
        samples: &[EnvironmentalObservation],
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> Grid {
        let res = self.settings.resolution_deg;
        let rows = cells_along(bounds.max_lat - bounds.min_lat, res);
        let cols = cells_along(bounds.max_lng - bounds.min_lng, res);

        let bias = match (self.settings.method, samples.is_empty()) {
            (InterpolationMethod::Calibrated, false) => self.reference_bias(bounds, samples, at),
            _ => Vec::new(),
        };

        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let (lat_lo, lat_hi) = cell_extent(bounds.min_lat, bounds.max_lat, res, row);
            for col in 0..cols {
                let (lng_lo, lng_hi) = cell_extent(bounds.min_lng, bounds.max_lng, res, col);
                let centre = GeoPoint::new((lat_lo + lat_hi) / 2.0, (lng_lo + lng_hi) / 2.0);

                let mut obs = climatology::baseline(centre.lat, centre.lng, at);
                match self.settings.method {
                    InterpolationMethod::Calibrated => apply_bias(&mut obs, &bias, self.settings.calibration_weight),
                    InterpolationMethod::NearestSample => {
                        if let Some(nearest) = nearest_sample(samples, centre) {
                            copy_fields(&mut obs, nearest, FieldSource::Calibrated);
                        }
                    }
                }

                if self.settings.jitter {
                    jitter(&mut obs, rng);
                }

                // A sample inside the cell overrides everything it measured.
                let inside = samples
                    .iter()
                    .filter(|s| {
                        s.lat >= lat_lo
                            && (s.lat < lat_hi || (row + 1 == rows && s.lat <= lat_hi))
                            && s.lng >= lng_lo
                            && (s.lng < lng_hi || (col + 1 == cols && s.lng <= lng_hi))
                    })
                    .min_by(|a, b| {
                        haversine_km(a.location(), centre).total_cmp(&haversine_km(b.location(), centre))
                    });
                if let Some(sample) = inside {
                    copy_fields(&mut obs, sample, FieldSource::Measured);
                }

                cells.push(GridCell { row, col, observation: obs });
            }
        }

        Grid {
            bounds: *bounds,
            resolution_deg: res,
            rows,
            cols,
            cells,
            samples_used: samples.len(),
        }
    }

    /// Per-field difference between the reference sample and the baseline
    /// at its location. The reference is the sample closest to the centre.
    fn reference_bias(
        &self,
        bounds: &BoundingBox,
        samples: &[EnvironmentalObservation],
        at: DateTime<Utc>,
    ) -> Vec<(ObservationField, f64)> {
        let Some(reference) = nearest_sample(samples, bounds.center()) else {
            return Vec::new();
        };
        let expected = climatology::baseline(reference.lat, reference.lng, at);
        ObservationField::iter()
            .filter(|f| reference.source_of(*f) == FieldSource::Measured)
            .filter_map(|f| Some((f, reference.get(f)? - expected.get(f)?)))
            .collect()
    }
}

fn nearest_sample(samples: &[EnvironmentalObservation], point: GeoPoint) -> Option<&EnvironmentalObservation> {
    samples
        .iter()
        .min_by(|a, b| haversine_km(a.location(), point).total_cmp(&haversine_km(b.location(), point)))
}

fn apply_bias(obs: &mut EnvironmentalObservation, bias: &[(ObservationField, f64)], weight: f64) {
    for (field, delta) in bias {
        if let Some(base) = obs.get(*field) {
            let value = clamp_to_range(*field, base + weight * delta);
            obs.set(*field, Some(value), FieldSource::Calibrated);
        }
    }
}

/// Copies every measured field of `sample` into `obs` under `source`.
fn copy_fields(obs: &mut EnvironmentalObservation, sample: &EnvironmentalObservation, source: FieldSource) {
    for field in ObservationField::iter() {
        if sample.source_of(field) != FieldSource::Measured {
            continue;
        }
        if let Some(value) = sample.get(field) {
            obs.set(field, Some(value), source);
        }
    }
}

fn jitter<R: Rng>(obs: &mut EnvironmentalObservation, rng: &mut R) {
    for field in ObservationField::iter() {
        if obs.source_of(field) == FieldSource::Measured {
            continue;
        }
        if let Some(value) = obs.get(field) {
            let scale = jitter_scale(field);
            let perturbed = clamp_to_range(field, value + rng.gen_range(-scale..=scale));
            let source = obs.source_of(field);
            obs.set(field, Some(perturbed), source);
        }
    }
}

// ---------------------------------------------------------------------------
// Sample collection
// ---------------------------------------------------------------------------

/// Samples gathered for one grid run.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pub samples: Vec<EnvironmentalObservation>,
    pub failed: usize,
    /// The whole fan-out was cancelled.
    pub aborted: bool,
}

/// Fetches every point concurrently, each bounded by `timeout`.
///
/// Failures are logged and counted, never returned: the grid falls back to
/// climatology for whatever could not be fetched. Aborting through the
/// registration's handle drops every in-flight request.
pub async fn collect_samples(
    source: Option<&dyn ObservationSource>,
    points: &[GeoPoint],
    timeout: Duration,
    abort: Option<AbortRegistration>,
) -> SampleSet {
    let Some(source) = source else {
        return SampleSet::default();
    };

    let fetches = join_all(points.iter().map(|p| async move {
        (*p, fetch_with_timeout(source, *p, timeout).await)
    }));

    let results = match abort {
        Some(registration) => match Abortable::new(fetches, registration).await {
            Ok(results) => results,
            Err(_) => {
                logging::warn(
                    logging::Component::Grid,
                    None,
                    "sample fetch aborted, using climatology",
                );
                return SampleSet { samples: Vec::new(), failed: points.len(), aborted: true };
            }
        },
        None => fetches.await,
    };

    let mut set = SampleSet::default();
    for (point, result) in results {
        let result = result.and_then(|obs| {
            normalize::validate(&obs).map_err(FetchError::from)?;
            Ok(obs)
        });
        match result {
            Ok(obs) => {
                let duplicate = set
                    .samples
                    .iter()
                    .any(|s| s.lat == obs.lat && s.lng == obs.lng);
                if !duplicate {
                    set.samples.push(obs);
                }
            }
            Err(e) => {
                logging::log_fetch_failure(source.name(), &point.to_string(), &e);
                set.failed += 1;
            }
        }
    }
    set
}
