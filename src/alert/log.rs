//! Append-only, in-memory alert log.
//!
//! The log is the only mutable state shared between callers. Appends take
//! a single write lock, so an entry and its idempotency key become visible
//! together, and reads clone a snapshot under the read lock. The active
//! view is derived on every read from `now - timestamp <= active_window`;
//! nothing marks an alert expired.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::model::{Alert, AlertType, Severity};

const DEDUP_BUCKET_HOURS: i64 = 6;

/// `(type, location rounded to 0.5°, severity, 6 h bucket)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub alert_type: AlertType,
    pub lat_half_deg: i64,
    pub lng_half_deg: i64,
    pub severity: Severity,
    pub time_bucket: i64,
}

impl IdempotencyKey {
    pub fn for_alert(alert: &Alert) -> Self {
        Self {
            alert_type: alert.alert_type,
            lat_half_deg: (alert.location.lat * 2.0).round() as i64,
            lng_half_deg: (alert.location.lng * 2.0).round() as i64,
            severity: alert.severity,
            time_bucket: alert.timestamp.timestamp().div_euclid(DEDUP_BUCKET_HOURS * 3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An alert with the same idempotency key is already logged.
    Duplicate,
    /// An alert with the same id is already logged.
    AlreadyLogged,
}

#[derive(Default)]
struct LogState {
    entries: Vec<Alert>,
    keys: HashSet<IdempotencyKey>,
    ids: HashSet<Uuid>,
    dispatched: HashSet<Uuid>,
}

pub struct AlertLog {
    state: RwLock<LogState>,
    active_window: Duration,
    retention: Duration,
    dedup_enabled: bool,
}

impl AlertLog {
    pub fn new(active_window: Duration, retention: Duration, dedup_enabled: bool) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            active_window,
            retention,
            dedup_enabled,
        }
    }

    pub fn active_window(&self) -> Duration {
        self.active_window
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn append(&self, alert: Alert) -> AppendOutcome {
        let key = IdempotencyKey::for_alert(&alert);
        let mut state = self.state.write();
        if state.ids.contains(&alert.id) {
            return AppendOutcome::AlreadyLogged;
        }
        if self.dedup_enabled && state.keys.contains(&key) {
            return AppendOutcome::Duplicate;
        }
        state.keys.insert(key);
        state.ids.insert(alert.id);
        state.entries.push(alert);
        AppendOutcome::Appended
    }

    /// Records that `id` has been dispatched. Returns `false` if it already
    /// was, so each alert is dispatched at most once.
    pub fn mark_dispatched(&self, id: Uuid) -> bool {
        self.state.write().dispatched.insert(id)
    }

    pub fn is_dispatched(&self, id: Uuid) -> bool {
        self.state.read().dispatched.contains(&id)
    }

    /// Alerts with `now - timestamp <= active_window`, in log order.
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|a| now.signed_duration_since(a.timestamp) <= self.active_window)
            .cloned()
            .collect()
    }

    /// Active alerts with exactly `severity`.
    pub fn by_severity_at(&self, severity: Severity, now: DateTime<Utc>) -> Vec<Alert> {
        self.active_at(now)
            .into_iter()
            .filter(|a| a.severity == severity)
            .collect()
    }

    /// Every retained alert, active or not.
    pub fn all(&self) -> Vec<Alert> {
        self.state.read().entries.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Alert> {
        self.state.read().entries.iter().find(|a| a.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Drops alerts older than the retention window. Returns how many went.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        let retention = self.retention;
        state
            .entries
            .retain(|a| now.signed_duration_since(a.timestamp) <= retention);
        let purged = before - state.entries.len();
        if purged > 0 {
            let keys: HashSet<IdempotencyKey> = state.entries.iter().map(IdempotencyKey::for_alert).collect();
            let ids: HashSet<Uuid> = state.entries.iter().map(|a| a.id).collect();
            state.dispatched.retain(|id| ids.contains(id));
            state.keys = keys;
            state.ids = ids;
        }
        purged
    }
}
