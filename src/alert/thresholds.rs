//! Threshold checks that turn scores, formation candidates and tracking
//! updates into alerts.
//!
//! Classification is pure apart from drawing alert ids from the supplied
//! RNG. Appending, deduplication and dispatch live in the manager.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::AlertThresholds;
use crate::logging::{self, Component};
use crate::model::{
    Alert, AlertType, Domain, FormationCandidate, GeoPoint, RiskScore, Severity, random_id,
};
use crate::recommend;
use crate::regions::{MonitoredLocation, nearest_location};

/// Serializes the record an alert was raised from. An encoding failure
/// leaves `source_data` null and is logged; the alert itself still goes out.
fn source_data<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        logging::warn(Component::Alert, None, &format!("cannot encode alert source data: {e}"));
        serde_json::Value::Null
    })
}

/// Severity from event probability and hours until the event.
///
/// | probability | time to event | severity |
/// |-------------|---------------|----------|
/// | > 0.8       | < 24 h        | critical |
/// | > 0.6       | < 48 h        | high     |
/// | > 0.4       | < 72 h        | moderate |
/// | otherwise   |               | low      |
pub fn classify_severity(probability: f64, time_to_event_hours: f64) -> Severity {
    if probability > 0.8 && time_to_event_hours < 24.0 {
        Severity::Critical
    } else if probability > 0.6 && time_to_event_hours < 48.0 {
        Severity::High
    } else if probability > 0.4 && time_to_event_hours < 72.0 {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

/// Severity of an existing system from its sustained wind (kt).
pub fn wind_severity(wind_kt: f64) -> Severity {
    if wind_kt >= 113.0 {
        Severity::Critical
    } else if wind_kt >= 83.0 {
        Severity::High
    } else if wind_kt >= 64.0 {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

/// A position report for a system that has already formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub system_name: String,
    pub location: GeoPoint,
    pub current_wind_kt: f64,
    pub forecast_wind_kt: f64,
    pub observed_at: DateTime<Utc>,
}

pub struct AlertClassifier {
    thresholds: AlertThresholds,
    locations: Vec<MonitoredLocation>,
}

impl AlertClassifier {
    pub fn new(thresholds: AlertThresholds, locations: Vec<MonitoredLocation>) -> Self {
        Self { thresholds, locations }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Formation, landfall and intensification alerts for one candidate.
    ///
    /// Candidates below the formation probability threshold raise nothing.
    pub fn for_candidate<R: RngCore>(
        &self,
        candidate: &FormationCandidate,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<Alert> {
        let t = &self.thresholds;
        let p = candidate.formation_probability;
        let hours = candidate.time_to_formation_hours;
        if p < t.formation_probability {
            return Vec::new();
        }

        let data = source_data(candidate);
        let severity = classify_severity(p, hours);
        let mut alerts = Vec::new();

        let imminent = hours <= t.time_to_formation_hours;
        let title = if imminent {
            format!("Imminent cyclone formation in {}", candidate.region)
        } else {
            format!("Possible cyclone formation in {}", candidate.region)
        };
        alerts.push(Alert {
            id: random_id(rng),
            alert_type: AlertType::Formation,
            severity,
            title,
            message: format!(
                "{:.0}% chance of formation near {} within {:.0} h; expected {} ({:.0} kt)",
                p * 100.0,
                candidate.location,
                hours,
                candidate.expected_intensity_bucket,
                candidate.expected_max_wind_kt,
            ),
            location: candidate.location,
            timestamp: now,
            source_data: data.clone(),
            recommended_actions: recommend::for_candidate(candidate),
        });

        if let Some((place, km)) = nearest_location(&self.locations, candidate.location, t.nearby_distance_km) {
            let landfall_severity = severity.max(Severity::Moderate);
            alerts.push(Alert {
                id: random_id(rng),
                alert_type: AlertType::Landfall,
                severity: landfall_severity,
                title: format!("Possible cyclone impact near {}", place.name),
                message: format!(
                    "Formation candidate {km:.0} km from {} ({:.0}% chance within {hours:.0} h)",
                    place.name,
                    p * 100.0,
                ),
                location: place.point(),
                timestamp: now,
                source_data: data.clone(),
                recommended_actions: recommend::for_alert(AlertType::Landfall, landfall_severity),
            });
        }

        if candidate.expected_max_wind_kt >= t.wind_speed_kt {
            let wind_sev = wind_severity(candidate.expected_max_wind_kt);
            alerts.push(Alert {
                id: random_id(rng),
                alert_type: AlertType::Intensification,
                severity: wind_sev,
                title: format!("Rapid development expected in {}", candidate.region),
                message: format!(
                    "Candidate near {} expected to reach {:.0} kt ({})",
                    candidate.location, candidate.expected_max_wind_kt, candidate.expected_intensity_bucket,
                ),
                location: candidate.location,
                timestamp: now,
                source_data: data,
                recommended_actions: recommend::for_alert(AlertType::Intensification, wind_sev),
            });
        }
        alerts
    }

    /// An alert for a domain score at or above `min_risk_level`.
    pub fn for_score<R: RngCore>(&self, score: &RiskScore, now: DateTime<Utc>, rng: &mut R) -> Option<Alert> {
        if score.risk_level < self.thresholds.min_risk_level {
            return None;
        }
        let (alert_type, title) = match score.domain {
            Domain::Cyclone => (AlertType::Tracking, "Cyclone conditions"),
            Domain::Flood => (AlertType::Flood, "Flood risk"),
            Domain::OceanHealth => (AlertType::OceanHealth, "Ocean health stress"),
            Domain::Reef => (AlertType::Reef, "Reef health stress"),
        };
        Some(Alert {
            id: random_id(rng),
            alert_type,
            severity: Severity::from(score.risk_level),
            title: format!("{title} at {}", score.location),
            message: score.explanation.clone(),
            location: score.location,
            timestamp: now,
            source_data: source_data(score),
            recommended_actions: recommend::for_score(score),
        })
    }

    /// Tracking and intensification alerts for a formed system.
    pub fn for_tracking<R: RngCore>(&self, update: &TrackingUpdate, now: DateTime<Utc>, rng: &mut R) -> Vec<Alert> {
        let t = &self.thresholds;
        let data = source_data(update);
        let mut alerts = Vec::new();

        if update.current_wind_kt >= t.wind_speed_kt {
            let severity = wind_severity(update.current_wind_kt);
            alerts.push(Alert {
                id: random_id(rng),
                alert_type: AlertType::Tracking,
                severity,
                title: format!("{} tracking at {:.0} kt", update.system_name, update.current_wind_kt),
                message: format!(
                    "{} near {} with sustained winds of {:.0} kt",
                    update.system_name, update.location, update.current_wind_kt,
                ),
                location: update.location,
                timestamp: now,
                source_data: data.clone(),
                recommended_actions: recommend::for_alert(AlertType::Tracking, severity),
            });
        }

        if update.current_wind_kt > 0.0
            && update.forecast_wind_kt / update.current_wind_kt >= t.intensification_ratio
        {
            let severity = wind_severity(update.forecast_wind_kt).max(Severity::Moderate);
            alerts.push(Alert {
                id: random_id(rng),
                alert_type: AlertType::Intensification,
                severity,
                title: format!("{} intensifying", update.system_name),
                message: format!(
                    "{} forecast to strengthen from {:.0} kt to {:.0} kt",
                    update.system_name, update.current_wind_kt, update.forecast_wind_kt,
                ),
                location: update.location,
                timestamp: now,
                source_data: data,
                recommended_actions: recommend::for_alert(AlertType::Intensification, severity),
            });
        }
        alerts
    }
}
