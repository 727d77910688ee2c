//! Alert lifecycle: classify, append, persist, dispatch.
//!
//! Alerts are appended in the order their inputs were given, then each newly
//! appended alert is dispatched once to every sink. Dispatch and storage
//! failures are logged and reported but never remove an alert from the log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::AlertStore;
use crate::logging::{self, Component};
use crate::model::{Alert, FormationCandidate, RiskScore, Severity, SharedRng};

use super::log::{AlertLog, AppendOutcome};
use super::sink::{DispatchReport, NotificationSink, dispatch};
use super::thresholds::{AlertClassifier, TrackingUpdate};

/// Result of one processing call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessOutcome {
    /// Newly logged alerts, in append order.
    pub appended: Vec<Alert>,
    /// Alerts dropped because an equivalent one was already logged.
    pub suppressed: usize,
    pub dispatch: Vec<DispatchReport>,
}

impl ProcessOutcome {
    pub fn merge(&mut self, other: ProcessOutcome) {
        self.appended.extend(other.appended);
        self.suppressed += other.suppressed;
        self.dispatch.extend(other.dispatch);
    }
}

pub struct AlertManager {
    classifier: AlertClassifier,
    log: AlertLog,
    sinks: Vec<Arc<dyn NotificationSink>>,
    store: Option<Arc<dyn AlertStore>>,
    rng: SharedRng,
    dispatch_timeout: Duration,
}

impl AlertManager {
    pub fn new(
        classifier: AlertClassifier,
        log: AlertLog,
        sinks: Vec<Arc<dyn NotificationSink>>,
        store: Option<Arc<dyn AlertStore>>,
        rng: SharedRng,
        dispatch_timeout: Duration,
    ) -> Self {
        Self { classifier, log, sinks, store, rng, dispatch_timeout }
    }

    pub fn log(&self) -> &AlertLog {
        &self.log
    }

    pub fn classifier(&self) -> &AlertClassifier {
        &self.classifier
    }

    pub async fn process_formation_predictions_at(
        &self,
        candidates: &[FormationCandidate],
        now: DateTime<Utc>,
    ) -> ProcessOutcome {
        let alerts: Vec<Alert> = {
            let mut rng = self.rng.lock();
            candidates
                .iter()
                .flat_map(|c| self.classifier.for_candidate(c, now, &mut *rng))
                .collect()
        };
        self.record_all(alerts).await
    }

    pub async fn process_formation_predictions(&self, candidates: &[FormationCandidate]) -> ProcessOutcome {
        self.process_formation_predictions_at(candidates, Utc::now()).await
    }

    pub async fn process_risk_score_at(&self, score: &RiskScore, now: DateTime<Utc>) -> ProcessOutcome {
        let alert = {
            let mut rng = self.rng.lock();
            self.classifier.for_score(score, now, &mut *rng)
        };
        self.record_all(alert.into_iter().collect()).await
    }

    pub async fn process_tracking_update_at(&self, update: &TrackingUpdate, now: DateTime<Utc>) -> ProcessOutcome {
        let alerts = {
            let mut rng = self.rng.lock();
            self.classifier.for_tracking(update, now, &mut *rng)
        };
        self.record_all(alerts).await
    }

    /// Logs `alert` if it is new, then dispatches it unless it already was.
    pub async fn send_alert(&self, alert: Alert) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        match self.log.append(alert.clone()) {
            AppendOutcome::Appended => {
                self.persist(&alert).await;
                outcome.appended.push(alert.clone());
            }
            AppendOutcome::Duplicate => {
                logging::debug(Component::Alert, Some(&alert.id.to_string()), "duplicate suppressed");
                outcome.suppressed += 1;
                return outcome;
            }
            AppendOutcome::AlreadyLogged => {}
        }
        if let Some(report) = self.dispatch_once(&alert).await {
            outcome.dispatch.push(report);
        }
        outcome
    }

    pub fn active_alerts_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        self.log.active_at(now)
    }

    pub fn alerts_by_severity_at(&self, severity: Severity, now: DateTime<Utc>) -> Vec<Alert> {
        self.log.by_severity_at(severity, now)
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let purged = self.log.purge_expired(now);
        if purged > 0 {
            logging::info(Component::Alert, None, &format!("purged {purged} alert(s) past retention"));
        }
        purged
    }

    async fn record_all(&self, alerts: Vec<Alert>) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        let mut fresh = Vec::new();
        for alert in alerts {
            match self.log.append(alert.clone()) {
                AppendOutcome::Appended => fresh.push(alert),
                AppendOutcome::Duplicate | AppendOutcome::AlreadyLogged => outcome.suppressed += 1,
            }
        }
        if outcome.suppressed > 0 {
            logging::debug(
                Component::Alert,
                None,
                &format!("{} duplicate alert(s) suppressed", outcome.suppressed),
            );
        }
        for alert in fresh {
            self.persist(&alert).await;
            let mut single = ProcessOutcome::default();
            if let Some(report) = self.dispatch_once(&alert).await {
                single.dispatch.push(report);
            }
            single.appended.push(alert);
            outcome.merge(single);
        }
        outcome
    }

    async fn dispatch_once(&self, alert: &Alert) -> Option<DispatchReport> {
        if !self.log.mark_dispatched(alert.id) {
            return None;
        }
        Some(dispatch(&self.sinks, alert, self.dispatch_timeout).await)
    }

    async fn persist(&self, alert: &Alert) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let row = alert.clone();
        let result = tokio::task::spawn_blocking(move || store.save_alert(&row)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => logging::error(Component::Store, Some(&alert.id.to_string()), &format!("save failed: {e}")),
            Err(e) => logging::error(Component::Store, Some(&alert.id.to_string()), &format!("save task failed: {e}")),
        }
    }

    /// Stores a point score. Failures are logged only.
    pub async fn persist_score(&self, score: &RiskScore) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let row = score.clone();
        match tokio::task::spawn_blocking(move || store.save_score(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => logging::error(Component::Store, Some(score.domain.as_ref()), &format!("save failed: {e}")),
            Err(e) => logging::error(Component::Store, Some(score.domain.as_ref()), &format!("save task failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::sink::DispatchError;
    use crate::config::AlertThresholds;
    use crate::db::StoreError;
    use crate::model::{AlertType, EnvironmentalFactors, GeoPoint, IntensityBucket, shared_rng};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
            self.sent.lock().push(alert.id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        alerts: Mutex<Vec<Uuid>>,
    }

    impl AlertStore for MemoryStore {
        fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
            self.alerts.lock().push(alert.id);
            Ok(())
        }

        fn save_score(&self, _: &RiskScore) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 6, 0, 0).unwrap()
    }

    fn candidate(lat: f64, p: f64, hours: f64) -> FormationCandidate {
        FormationCandidate {
            id: Uuid::nil(),
            location: GeoPoint::new(lat, 158.0),
            formation_probability: p,
            time_to_formation_hours: hours,
            expected_formation_timestamp: now(),
            expected_intensity_bucket: IntensityBucket::TropicalStorm,
            expected_max_wind_kt: 45.0,
            environmental_factors: EnvironmentalFactors {
                sea_temp_favorable: true,
                low_wind_shear: true,
                sufficient_moisture: true,
                atmospheric_instability: true,
            },
            region: "coral_sea".to_string(),
            created_at: now(),
        }
    }

    fn manager(sink: Arc<RecordingSink>, store: Option<Arc<dyn AlertStore>>) -> AlertManager {
        AlertManager::new(
            AlertClassifier::new(AlertThresholds::default(), Vec::new()),
            AlertLog::new(ChronoDuration::hours(24), ChronoDuration::days(7), true),
            vec![sink as Arc<dyn NotificationSink>],
            store,
            shared_rng(Some(1)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_alerts_appended_in_candidate_order() {
        let sink = Arc::new(RecordingSink::default());
        let m = manager(sink.clone(), None);
        let outcome = m
            .process_formation_predictions_at(&[candidate(-14.0, 0.9, 12.0), candidate(-12.0, 0.7, 30.0)], now())
            .await;
        assert_eq!(outcome.appended.len(), 2);
        let logged = m.active_alerts_at(now());
        assert_eq!(logged[0].severity, Severity::Critical);
        assert_eq!(logged[1].severity, Severity::High);
        assert_eq!(*sink.sent.lock(), vec![logged[0].id, logged[1].id]);
    }

    #[tokio::test]
    async fn test_resubmission_is_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let m = manager(sink.clone(), None);
        let batch = [candidate(-14.0, 0.9, 12.0)];
        m.process_formation_predictions_at(&batch, now()).await;
        let again = m.process_formation_predictions_at(&batch, now()).await;
        assert!(again.appended.is_empty());
        assert_eq!(again.suppressed, 1);
        assert_eq!(m.log().len(), 1);
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_send_alert_dispatches_once() {
        let sink = Arc::new(RecordingSink::default());
        let m = manager(sink.clone(), None);
        let alert = Alert {
            id: Uuid::new_v4(),
            alert_type: AlertType::Landfall,
            severity: Severity::High,
            title: "Possible cyclone impact near Cairns".to_string(),
            message: String::new(),
            location: GeoPoint::new(-16.92, 145.77),
            timestamp: now(),
            source_data: serde_json::Value::Null,
            recommended_actions: Vec::new(),
        };
        let first = m.send_alert(alert.clone()).await;
        assert_eq!(first.dispatch.len(), 1);
        let second = m.send_alert(alert).await;
        assert!(second.dispatch.is_empty());
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_appended_alerts_are_persisted() {
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryStore::default());
        let m = manager(sink, Some(store.clone() as Arc<dyn AlertStore>));
        m.process_formation_predictions_at(&[candidate(-14.0, 0.9, 12.0)], now()).await;
        assert_eq!(store.alerts.lock().len(), 1);
    }
}
