/// Replay of recorded observations for development and testing.
///
/// When no live source is reachable, point the service at a JSON file of
/// recorded payloads. Each fetch returns the recorded observation nearest to
/// the requested point, with its timestamp shifted forward by `day_offset`
/// days so that last season's data reads as current.

use std::path::Path;

use async_trait::async_trait;
use chrono::Duration;

use crate::ingest::normalize::{self, NormalizeError, RawPayload};
use crate::ingest::source::{FetchError, ObservationSource};
use crate::model::{EnvironmentalObservation, GeoPoint};
use crate::regions::haversine_km;

/// Default search radius around a requested point.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 250.0;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot read replay file: {0}")]
    Io(#[from] std::io::Error),
    #[error("replay file is not a JSON array of payloads: {0}")]
    Json(#[from] serde_json::Error),
    #[error("replay record {index} rejected: {source}")]
    Record {
        index: usize,
        #[source]
        source: NormalizeError,
    },
}

pub struct ReplaySource {
    records: Vec<EnvironmentalObservation>,
    max_distance_km: f64,
    day_offset: i64,
}

impl ReplaySource {
    pub fn new(records: Vec<EnvironmentalObservation>) -> Self {
        Self {
            records,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            day_offset: 0,
        }
    }

    pub fn with_max_distance_km(mut self, km: f64) -> Self {
        self.max_distance_km = km;
        self
    }

    /// Shift every served timestamp forward by `days`.
    pub fn with_day_offset(mut self, days: i64) -> Self {
        self.day_offset = days;
        self
    }

    /// Parses a JSON array of tagged payloads (`asos`, `marine`, `canonical`).
    pub fn from_json_str(body: &str) -> Result<Self, ReplayError> {
        let payloads: Vec<RawPayload> = serde_json::from_str(body)?;
        let records = payloads
            .into_iter()
            .enumerate()
            .map(|(index, p)| normalize::normalize(p).map_err(|source| ReplayError::Record { index, source }))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("loaded {} replay records", records.len());
        Ok(Self::new(records))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let body = std::fs::read_to_string(path)?;
        Self::from_json_str(&body)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn nearest(&self, point: GeoPoint) -> Option<&EnvironmentalObservation> {
        self.records
            .iter()
            .map(|r| (r, haversine_km(r.location(), point)))
            .filter(|(_, d)| *d <= self.max_distance_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(r, _)| r)
    }
}

#[async_trait]
impl ObservationSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn fetch(&self, point: GeoPoint) -> Result<EnvironmentalObservation, FetchError> {
        let record = self.nearest(point).ok_or(FetchError::NoData(point))?;
        let mut obs = record.clone();
        obs.timestamp += Duration::days(self.day_offset);
        Ok(obs)
    }
}
