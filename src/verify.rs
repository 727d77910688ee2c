//! Observation Source Verification
//!
//! Probes the configured observation source at every region's sample points
//! to find out which regions would forecast on live data and which would
//! silently fall back to climatology.
//!
//! Run this before pointing the service at a new source.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::analysis::formation::FORMATION_FIELDS;
use crate::ingest::normalize;
use crate::ingest::source::{ObservationSource, fetch_with_timeout};
use crate::model::{GeoPoint, ObservationField};
use crate::regions::Region;
use strum::IntoEnumIterator;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub regions: Vec<RegionVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub regions_total: usize,
    pub regions_working: usize,
    pub regions_partial: usize,
    pub regions_failed: usize,
    pub points_total: usize,
    pub points_working: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionVerification {
    pub name: String,
    pub status: VerificationStatus,
    pub points: Vec<PointVerification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointVerification {
    pub point: GeoPoint,
    pub status: VerificationStatus,
    pub fields_available: Vec<String>,
    /// Formation inputs the source did not report.
    pub formation_fields_missing: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Probes
// ============================================================================

pub async fn verify_point(source: &dyn ObservationSource, point: GeoPoint, timeout: Duration) -> PointVerification {
    let mut result = PointVerification {
        point,
        status: VerificationStatus::Failed,
        fields_available: Vec::new(),
        formation_fields_missing: Vec::new(),
        error_message: None,
    };

    let obs = match fetch_with_timeout(source, point, timeout).await {
        Ok(obs) => obs,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };
    if let Err(e) = normalize::validate(&obs) {
        result.error_message = Some(format!("Parse error: {e}"));
        return result;
    }

    result.fields_available = ObservationField::iter()
        .filter(|f| obs.get(*f).is_some())
        .map(|f| f.to_string())
        .collect();
    result.formation_fields_missing = FORMATION_FIELDS
        .iter()
        .filter(|f| obs.get(**f).is_none())
        .map(|f| f.to_string())
        .collect();

    result.status = if result.fields_available.is_empty() {
        result.error_message = Some("no usable fields".to_string());
        VerificationStatus::Failed
    } else if result.formation_fields_missing.is_empty() {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    };
    result
}

/// Probes every sample point of `region` concurrently.
pub async fn verify_region(source: &dyn ObservationSource, region: &Region, timeout: Duration) -> RegionVerification {
    let points = region.bounds.sample_points();
    let points = join_all(points.into_iter().map(|p| verify_point(source, p, timeout))).await;

    let working = points.iter().filter(|p| p.status == VerificationStatus::Success).count();
    let failed = points.iter().filter(|p| p.status == VerificationStatus::Failed).count();
    let status = if working == points.len() {
        VerificationStatus::Success
    } else if failed == points.len() {
        VerificationStatus::Failed
    } else {
        VerificationStatus::PartialSuccess
    };

    RegionVerification { name: region.name.clone(), status, points }
}

pub async fn run_verification(
    source: &dyn ObservationSource,
    regions: &[Region],
    timeout: Duration,
) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: Utc::now(),
        source: source.name().to_string(),
        regions: Vec::with_capacity(regions.len()),
        summary: VerificationSummary::default(),
    };

    for region in regions {
        log::info!("verifying region {}", region.name);
        let result = verify_region(source, region, timeout).await;
        report.summary.regions_total += 1;
        match result.status {
            VerificationStatus::Success => report.summary.regions_working += 1,
            VerificationStatus::PartialSuccess => report.summary.regions_partial += 1,
            VerificationStatus::Failed => report.summary.regions_failed += 1,
        }
        report.summary.points_total += result.points.len();
        report.summary.points_working += result
            .points
            .iter()
            .filter(|p| p.status != VerificationStatus::Failed)
            .count();
        report.regions.push(result);
    }
    report
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n===========================================================");
    println!("SOURCE VERIFICATION: {}", report.source);
    println!("===========================================================");
    for region in &report.regions {
        let ok = region.points.iter().filter(|p| p.status != VerificationStatus::Failed).count();
        match region.status {
            VerificationStatus::Success => println!("  {:<24} OK ({}/{} points)", region.name, ok, region.points.len()),
            VerificationStatus::PartialSuccess => {
                println!("  {:<24} PARTIAL ({}/{} points)", region.name, ok, region.points.len())
            }
            VerificationStatus::Failed => println!("  {:<24} FAILED", region.name),
        }
        for point in region.points.iter().filter(|p| p.error_message.is_some()) {
            println!("      {} ... {}", point.point, point.error_message.as_deref().unwrap_or("unknown"));
        }
    }
    let s = &report.summary;
    println!();
    println!(
        "Regions: {} working, {} partial, {} failed (of {})",
        s.regions_working, s.regions_partial, s.regions_failed, s.regions_total
    );
    let rate = if s.points_total > 0 {
        (s.points_working as f64 / s.points_total as f64) * 100.0
    } else {
        0.0
    };
    println!("Point success rate: {:.1}% ({}/{})", rate, s.points_working, s.points_total);
    println!("===========================================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::replay::ReplaySource;
    use crate::model::EnvironmentalObservation;
    use crate::regions::BoundingBox;
    use chrono::TimeZone;

    fn region(name: &str, bounds: BoundingBox) -> Region {
        Region { name: name.to_string(), bounds }
    }

    fn full_record(lat: f64, lng: f64) -> EnvironmentalObservation {
        let mut obs = EnvironmentalObservation::new(lat, lng, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        obs.sea_temp = Some(29.0);
        obs.wind_shear = Some(6.0);
        obs.humidity = Some(80.0);
        obs.vorticity = Some(3e-5);
        obs
    }

    #[tokio::test]
    async fn test_region_statuses() {
        let mut sparse = EnvironmentalObservation::new(-10.0, 100.0, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        sparse.pressure = Some(1004.0);
        let source = ReplaySource::new(vec![full_record(-16.0, 152.0), sparse]).with_max_distance_km(600.0);
        let regions = [
            region("coral_sea", BoundingBox::new(-18.0, -14.0, 150.0, 154.0)),
            region("timor", BoundingBox::new(-11.0, -9.0, 99.0, 101.0)),
            region("atlantic", BoundingBox::new(10.0, 20.0, -50.0, -40.0)),
        ];
        let report = run_verification(&source, &regions, Duration::from_secs(1)).await;
        assert_eq!(report.regions[0].status, VerificationStatus::Success);
        assert_eq!(report.regions[1].status, VerificationStatus::PartialSuccess);
        assert_eq!(report.regions[1].points[0].formation_fields_missing.len(), 4);
        assert_eq!(report.regions[2].status, VerificationStatus::Failed);
        assert_eq!(report.summary.regions_total, 3);
        assert_eq!(report.summary.regions_failed, 1);
    }
}
