//! Notification channels.
//!
//! Delivery mechanics stay behind [`NotificationSink`]. `dispatch` calls every
//! sink concurrently, each under its own timeout, and reports per-channel
//! failures instead of failing the whole alert.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::logging;
use crate::model::{Alert, Severity};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("channel rejected alert with status {status}")]
    Rejected { status: u16 },
    #[error("{0}")]
    Channel(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// POSTs the alert as JSON.
pub struct WebhookSink {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("riskmon_service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { name: name.into(), url: url.into(), client })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}

/// Writes alerts to the service log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        let line = format!("[{}] {}: {}", alert.severity, alert.title, alert.message);
        match alert.severity {
            Severity::Critical | Severity::High => {
                logging::warn(logging::Component::Alert, Some(alert.alert_type.as_ref()), &line)
            }
            _ => logging::info(logging::Component::Alert, Some(alert.alert_type.as_ref()), &line),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    pub channel: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub alert_id: Uuid,
    pub delivered: Vec<String>,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sends `alert` to every sink. Never fails as a whole.
pub async fn dispatch(sinks: &[Arc<dyn NotificationSink>], alert: &Alert, timeout: Duration) -> DispatchReport {
    let attempts = sinks.iter().map(|sink| async move {
        let result = match tokio::time::timeout(timeout, sink.send(alert)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(timeout)),
        };
        (sink.name().to_string(), result)
    });

    let mut report = DispatchReport {
        alert_id: alert.id,
        delivered: Vec::new(),
        failures: Vec::new(),
    };
    for (channel, result) in join_all(attempts).await {
        match result {
            Ok(()) => report.delivered.push(channel),
            Err(e) => {
                logging::log_dispatch_failure(&channel, &alert.id.to_string(), &e);
                report.failures.push(DispatchFailure { channel, error: e.to_string() });
            }
        }
    }
    report
}
