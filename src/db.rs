/// Optional persistence for alerts and point risk scores.
///
/// The engine never reads control state back from storage; the store is a
/// write-only sink. Calls are blocking (`postgres` crate) and must run on
/// `tokio::task::spawn_blocking` when made from async code.

use parking_lot::Mutex;
use postgres::{Client, NoTls};

use crate::model::{Alert, RiskScore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait AlertStore: Send + Sync {
    fn save_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    fn save_score(&self, score: &RiskScore) -> Result<(), StoreError>;
}

pub const SCHEMA: &str = "
    CREATE SCHEMA IF NOT EXISTS riskmon;

    CREATE TABLE IF NOT EXISTS riskmon.alerts (
        id              UUID PRIMARY KEY,
        alert_type      TEXT NOT NULL,
        severity        TEXT NOT NULL,
        title           TEXT NOT NULL,
        message         TEXT NOT NULL,
        latitude        DOUBLE PRECISION NOT NULL,
        longitude       DOUBLE PRECISION NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL,
        source_data     TEXT NOT NULL,
        recommended_actions TEXT[] NOT NULL
    );

    CREATE INDEX IF NOT EXISTS alerts_created_at_idx ON riskmon.alerts (created_at);

    CREATE TABLE IF NOT EXISTS riskmon.risk_scores (
        id              BIGSERIAL PRIMARY KEY,
        domain          TEXT NOT NULL,
        risk_level      TEXT NOT NULL,
        raw_score       DOUBLE PRECISION NOT NULL,
        probability_or_score DOUBLE PRECISION NOT NULL,
        confidence      DOUBLE PRECISION NOT NULL,
        latitude        DOUBLE PRECISION NOT NULL,
        longitude       DOUBLE PRECISION NOT NULL,
        observed_at     TIMESTAMPTZ NOT NULL,
        explanation     TEXT NOT NULL,
        factors         TEXT NOT NULL
    );
";

pub struct PostgresAlertStore {
    client: Mutex<Client>,
}

impl PostgresAlertStore {
    /// Connects and creates the schema if needed.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut client = Client::connect(database_url, NoTls)?;
        client.batch_execute(SCHEMA)?;
        Ok(Self { client: Mutex::new(client) })
    }
}

impl AlertStore for PostgresAlertStore {
    fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let source_data = serde_json::to_string(&alert.source_data)?;
        let id = alert.id.to_string();
        self.client.lock().execute(
            "INSERT INTO riskmon.alerts
             (id, alert_type, severity, title, message, latitude, longitude,
              created_at, source_data, recommended_actions)
             VALUES ($1::TEXT::UUID, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO NOTHING",
            &[
                &id,
                &alert.alert_type.as_ref(),
                &alert.severity.as_ref(),
                &alert.title,
                &alert.message,
                &alert.location.lat,
                &alert.location.lng,
                &alert.timestamp,
                &source_data,
                &alert.recommended_actions,
            ],
        )?;
        Ok(())
    }

    fn save_score(&self, score: &RiskScore) -> Result<(), StoreError> {
        let factors = serde_json::to_string(&score.contributing_factors)?;
        self.client.lock().execute(
            "INSERT INTO riskmon.risk_scores
             (domain, risk_level, raw_score, probability_or_score, confidence,
              latitude, longitude, observed_at, explanation, factors)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &score.domain.as_ref(),
                &score.risk_level.as_ref(),
                &score.raw_score,
                &score.probability_or_score,
                &score.confidence,
                &score.location.lat,
                &score.location.lng,
                &score.observed_at,
                &score.explanation,
                &factors,
            ],
        )?;
        Ok(())
    }
}
