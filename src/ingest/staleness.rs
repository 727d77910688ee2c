/// Observation staleness detection.
///
/// A cached observation is only a valid stand-in for a failed fetch while it
/// is recent. All functions take `now` explicitly so tests stay deterministic.

use chrono::{DateTime, Duration, Utc};

use crate::model::EnvironmentalObservation;

/// Returns `true` if `observed_at` is older than `max_age` relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age  →  stale
///   age == max_age →  not stale
///
/// A timestamp in the future is never stale.
pub fn is_stale_at(observed_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(observed_at) > max_age
}

/// Convenience for observations.
pub fn observation_is_stale_at(
    obs: &EnvironmentalObservation,
    max_age: Duration,
    now: DateTime<Utc>,
) -> bool {
    is_stale_at(obs.timestamp, max_age, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// 2025-02-01 12:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_observation_is_not_stale() {
        let ts = fixed_now() - Duration::minutes(30);
        assert!(!is_stale_at(ts, Duration::hours(6), fixed_now()));
    }

    #[test]
    fn test_observation_exactly_at_threshold_is_not_stale() {
        let ts = fixed_now() - Duration::hours(6);
        assert!(
            !is_stale_at(ts, Duration::hours(6), fixed_now()),
            "staleness is strictly greater than, not >="
        );
    }

    #[test]
    fn test_one_second_past_threshold_is_stale() {
        let ts = fixed_now() - Duration::hours(6) - Duration::seconds(1);
        assert!(is_stale_at(ts, Duration::hours(6), fixed_now()));
    }

    #[test]
    fn test_future_timestamp_is_not_stale() {
        let ts = fixed_now() + Duration::minutes(10);
        assert!(!is_stale_at(ts, Duration::hours(1), fixed_now()));
    }

    #[test]
    fn test_same_observation_stale_under_tight_threshold_only() {
        let obs = EnvironmentalObservation::new(-19.0, 147.0, fixed_now() - Duration::hours(3));
        assert!(observation_is_stale_at(&obs, Duration::hours(1), fixed_now()));
        assert!(!observation_is_stale_at(&obs, Duration::hours(6), fixed_now()));
    }
}
