/// Observation sources.
///
/// The engine consumes observations through [`ObservationSource`], one point
/// at a time. Every call site wraps the fetch in [`fetch_with_timeout`]; a
/// failed or timed-out fetch means "no data for this point" and is never
/// fatal to the request that asked for it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::ingest::normalize::{self, NormalizeError};
use crate::ingest::staleness;
use crate::model::{EnvironmentalObservation, GeoPoint};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP error: upstream returned status {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Decode(#[from] NormalizeError),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("No data available at {0}")]
    NoData(GeoPoint),
    #[error("fetch aborted")]
    Aborted,
}

// ============================================================================
// Source trait
// ============================================================================

#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self, point: GeoPoint) -> Result<EnvironmentalObservation, FetchError>;
}

/// Bounds a single fetch by `timeout`.
pub async fn fetch_with_timeout(
    source: &dyn ObservationSource,
    point: GeoPoint,
    timeout: Duration,
) -> Result<EnvironmentalObservation, FetchError> {
    match tokio::time::timeout(timeout, source.fetch(point)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

// ============================================================================
// HTTP source
// ============================================================================

/// Fetches one JSON payload per point from a templated URL.
///
/// The template must contain `{lat}` and `{lng}`, e.g.
/// `https://obs.example.org/point?lat={lat}&lon={lng}`.
pub struct HttpObservationSource {
    client: reqwest::Client,
    url_template: String,
}

impl HttpObservationSource {
    pub fn new(url_template: impl Into<String>, request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("riskmon_service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url_template: url_template.into() })
    }

    pub fn url_for(&self, point: GeoPoint) -> String {
        self.url_template
            .replace("{lat}", &format!("{:.4}", point.lat))
            .replace("{lng}", &format!("{:.4}", point.lng))
    }
}

#[async_trait]
impl ObservationSource for HttpObservationSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, point: GeoPoint) -> Result<EnvironmentalObservation, FetchError> {
        let response = self
            .client
            .get(self.url_for(point))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Err(FetchError::NoData(point));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let payload = normalize::parse_payload(&body)?;
        Ok(normalize::normalize(payload)?)
    }
}

// ============================================================================
// Last-known cache
// ============================================================================

/// Cache key: location rounded to 0.1°.
type CacheKey = (i64, i64);

fn cache_key(point: GeoPoint) -> CacheKey {
    ((point.lat * 10.0).round() as i64, (point.lng * 10.0).round() as i64)
}

/// Last successful observation per rounded location, used by point scoring
/// when a live fetch fails.
#[derive(Default)]
pub struct LastKnownCache {
    entries: RwLock<HashMap<CacheKey, EnvironmentalObservation>>,
}

impl LastKnownCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `obs`, keeping whichever of old and new is more recent.
    pub fn record(&self, obs: &EnvironmentalObservation) {
        let mut entries = self.entries.write();
        let key = cache_key(obs.location());
        let newer = entries
            .get(&key)
            .is_none_or(|existing| existing.timestamp <= obs.timestamp);
        if newer {
            entries.insert(key, obs.clone());
        }
    }

    /// The cached observation for `point`, unless it is stale at `now`.
    pub fn lookup_at(
        &self,
        point: GeoPoint,
        max_age: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Option<EnvironmentalObservation> {
        let entries = self.entries.read();
        entries
            .get(&cache_key(point))
            .filter(|obs| !staleness::observation_is_stale_at(obs, max_age, now))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
