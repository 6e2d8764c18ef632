use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// Longest trailing window a caller may ask for
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Half-open time range: `start <= t < end`. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Every event ever recorded
    pub fn all_time() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(
                Error::InvalidRange(format!("window end {} is before start {}", end, start)).into(),
            );
        }
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    /// Calendar days `start..=end` in UTC, covering all of the end day
    pub fn days(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRange(format!(
                "end_date {} is before start_date {}",
                end, start
            ))
            .into());
        }
        let after_end = end
            .succ_opt()
            .ok_or_else(|| Error::InvalidRange(format!("end_date {} is out of range", end)))?;
        Self::between(start_of_day(start), start_of_day(after_end))
    }

    /// A single calendar day
    pub fn day(date: NaiveDate) -> Result<Self> {
        Self::days(date, date)
    }

    /// `window_days` days ending at `now` (exclusive)
    pub fn trailing(now: DateTime<Utc>, window_days: i64) -> Result<Self> {
        if window_days <= 0 || window_days > MAX_WINDOW_DAYS {
            return Err(Error::InvalidRange(format!(
                "window_days must be within 1..={}, got {}",
                MAX_WINDOW_DAYS, window_days
            ))
            .into());
        }
        Self::between(now - Duration::days(window_days), now)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Every date in `start..=end`
pub fn dates_in(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if end < start {
        return Err(Error::InvalidRange(format!(
            "end_date {} is before start_date {}",
            end, start
        ))
        .into());
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}
