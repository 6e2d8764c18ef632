use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived fill state of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    Full,
    Medium,
    Low,
    /// No detection events in the window
    Unknown,
}

impl FillStatus {
    /// Sort rank: full > medium > low > unknown
    pub fn rank(&self) -> u8 {
        match self {
            FillStatus::Full => 3,
            FillStatus::Medium => 2,
            FillStatus::Low => 1,
            FillStatus::Unknown => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillStatus::Full => "full",
            FillStatus::Medium => "medium",
            FillStatus::Low => "low",
            FillStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count thresholds for fill classification.
///
/// Both must be at least 1. Their relative order is not checked: with
/// `full <= medium` the full branch still wins because it is tested first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillThresholds {
    pub full: i64,
    pub medium: i64,
}

impl FillThresholds {
    pub fn new(full: i64, medium: i64) -> Result<Self> {
        if full < 1 || medium < 1 {
            return Err(Error::InvalidThreshold(format!(
                "thresholds must be at least 1 (full={}, medium={})",
                full, medium
            ))
            .into());
        }
        Ok(Self { full, medium })
    }
}

/// Classify a window count. Checked in order: full, medium, low.
pub fn classify_fill(count: i64, thresholds: &FillThresholds) -> FillStatus {
    if count >= thresholds.full {
        FillStatus::Full
    } else if count >= thresholds.medium {
        FillStatus::Medium
    } else {
        FillStatus::Low
    }
}

/// Classify a container's window. Without any events it is `Unknown`, never `Low`.
pub fn classify_window(
    events_in_window: i64,
    objects_in_window: i64,
    thresholds: &FillThresholds,
) -> FillStatus {
    if events_in_window <= 0 {
        return FillStatus::Unknown;
    }
    classify_fill(objects_in_window, thresholds)
}

/// Connectivity derived from how long ago a container last connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Largest accepted staleness threshold (one week)
pub const MAX_STALE_HOURS: i64 = 168;

/// Staleness threshold as a duration; `stale_hours` must be within
/// `1..=MAX_STALE_HOURS`.
pub fn stale_threshold(stale_hours: i64) -> Result<Duration> {
    if !(1..=MAX_STALE_HOURS).contains(&stale_hours) {
        return Err(Error::InvalidRange(format!(
            "stale_hours must be within 1..={}, got {}",
            MAX_STALE_HOURS, stale_hours
        ))
        .into());
    }
    Duration::try_hours(stale_hours).ok_or_else(|| {
        Error::InvalidRange(format!("stale_hours out of range: {}", stale_hours)).into()
    })
}

/// Offline when never connected or when more than `stale_hours` have passed.
/// Exactly `stale_hours` ago is still online.
pub fn classify_connectivity(
    last_connected: Option<DateTime<Utc>>,
    stale_hours: i64,
    now: DateTime<Utc>,
) -> Result<Connectivity> {
    let threshold = stale_threshold(stale_hours)?;
    let Some(last_connected) = last_connected else {
        return Ok(Connectivity::Offline);
    };
    if now - last_connected > threshold {
        Ok(Connectivity::Offline)
    } else {
        Ok(Connectivity::Online)
    }
}

/// Remaining headroom, floored at zero
pub fn remaining(capacity: i64, current_window_count: i64) -> i64 {
    capacity.saturating_sub(current_window_count).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn thresholds(full: i64, medium: i64) -> FillThresholds {
        FillThresholds::new(full, medium).unwrap()
    }

    #[test]
    fn fill_boundaries_are_inclusive() {
        let t = thresholds(50, 20);
        assert_eq!(classify_fill(50, &t), FillStatus::Full);
        assert_eq!(classify_fill(49, &t), FillStatus::Medium);
        assert_eq!(classify_fill(20, &t), FillStatus::Medium);
        assert_eq!(classify_fill(19, &t), FillStatus::Low);
        assert_eq!(classify_fill(0, &t), FillStatus::Low);
    }

    #[test]
    fn misconfigured_thresholds_still_check_full_first() {
        let t = thresholds(20, 50);
        assert_eq!(classify_fill(30, &t), FillStatus::Full);
        assert_eq!(classify_fill(10, &t), FillStatus::Low);
    }

    #[test]
    fn no_events_is_unknown_not_low() {
        let t = thresholds(50, 20);
        assert_eq!(classify_window(0, 0, &t), FillStatus::Unknown);
        assert_eq!(classify_window(1, 1, &t), FillStatus::Low);
        // an image with no objects is still a report
        assert_eq!(classify_window(1, 0, &t), FillStatus::Low);
    }

    #[test]
    fn thresholds_below_one_are_rejected() {
        for (full, medium) in [(0, 20), (50, 0), (-1, -1)] {
            let err = FillThresholds::new(full, medium).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn status_rank_orders_full_first() {
        let mut statuses = vec![
            FillStatus::Unknown,
            FillStatus::Low,
            FillStatus::Full,
            FillStatus::Medium,
        ];
        statuses.sort_by_key(|s| std::cmp::Reverse(s.rank()));
        assert_eq!(
            statuses,
            vec![
                FillStatus::Full,
                FillStatus::Medium,
                FillStatus::Low,
                FillStatus::Unknown
            ]
        );
    }

    #[test]
    fn staleness_boundary_is_online() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let boundary = now - Duration::hours(24);

        assert_eq!(
            classify_connectivity(Some(boundary), 24, now)?,
            Connectivity::Online
        );
        assert_eq!(
            classify_connectivity(Some(boundary + Duration::seconds(1)), 24, now)?,
            Connectivity::Online
        );
        assert_eq!(
            classify_connectivity(Some(boundary - Duration::seconds(1)), 24, now)?,
            Connectivity::Offline
        );
        Ok(())
    }

    #[test]
    fn never_connected_is_offline() -> Result<()> {
        assert_eq!(
            classify_connectivity(None, 24, Utc::now())?,
            Connectivity::Offline
        );
        Ok(())
    }

    #[test]
    fn non_positive_stale_hours_fail_fast() {
        let err = classify_connectivity(None, 0, Utc::now()).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRange(_))));
    }

    #[test]
    fn oversized_stale_hours_are_rejected_not_panicking() {
        let now = Utc::now();
        let recent = Some(now - Duration::hours(1));
        for stale in [MAX_STALE_HOURS + 1, 10_000_000_000_000, i64::MAX] {
            for last in [None, recent] {
                let err = classify_connectivity(last, stale, now).unwrap_err();
                assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRange(_))));
            }
        }
        assert_eq!(
            classify_connectivity(recent, MAX_STALE_HOURS, now).unwrap(),
            Connectivity::Online
        );
    }

    #[test]
    fn remaining_is_floored_at_zero() {
        assert_eq!(remaining(10, 25), 0);
        assert_eq!(remaining(10, 4), 6);
        assert_eq!(remaining(10, 10), 0);
    }
}
