use crate::db::models::{CityKey, DailyStat};
use crate::stats::counter::{CountScope, GroupBy, GroupMode, WindowCounter};
use crate::stats::window::{dates_in, TimeWindow};
use crate::store::{DailyStatStore, Stores};
use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a rebuild over a date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RebuildReport {
    pub dates_processed: u32,
    pub rows_written: u64,
    pub rows_removed: u64,
}

/// Recomputes daily (date, city, waste type) counts from the event log.
///
/// Every date is recomputed in full and written with per-key overwrites, so a
/// rebuild can be rerun, or run concurrently with itself, without drifting.
#[derive(Clone)]
pub struct DailyAggregator {
    counter: WindowCounter,
    stats: Arc<dyn DailyStatStore>,
}

impl DailyAggregator {
    pub fn new(stores: &Stores) -> Self {
        Self {
            counter: WindowCounter::new(stores),
            stats: stores.stats.clone(),
        }
    }

    /// Rebuild every date in `start..=end`. Earlier dates stay committed if a
    /// later one fails.
    pub async fn rebuild(&self, start: NaiveDate, end: NaiveDate) -> Result<RebuildReport> {
        let dates = dates_in(start, end)?;
        let mut report = RebuildReport::default();

        for date in dates {
            let (written, removed) = self.rebuild_day(date).await?;
            report.dates_processed += 1;
            report.rows_written += written;
            report.rows_removed += removed;
        }

        info!(
            "Rebuilt daily stats {}..={}: {} dates, {} rows written, {} stale rows removed",
            start, end, report.dates_processed, report.rows_written, report.rows_removed
        );
        Ok(report)
    }

    async fn rebuild_day(&self, date: NaiveDate) -> Result<(u64, u64)> {
        let window = TimeWindow::day(date)?;
        let counts = self
            .counter
            .count(
                CountScope::Everything,
                &window,
                GroupBy::CITY_AND_WASTE_TYPE,
                GroupMode::Present,
            )
            .await?;

        let mut keep: Vec<(CityKey, String)> = Vec::with_capacity(counts.len());
        for (key, count) in counts.iter() {
            let (Some(city), Some(waste_type)) = (key.city.clone(), key.waste_type.clone()) else {
                continue;
            };
            self.stats
                .upsert(&DailyStat {
                    stats_date: date,
                    city: city.clone(),
                    waste_type: waste_type.clone(),
                    detection_count: *count,
                })
                .await?;
            keep.push((city, waste_type));
        }

        // groups that vanished since the last run (e.g. after a purge)
        let removed = self.stats.retain(date, &keep).await?;

        debug!(
            "Daily stats for {}: {} groups, {} stale rows removed",
            date,
            keep.len(),
            removed
        );
        Ok((keep.len() as u64, removed))
    }

    /// Drop aggregated rows for `start..=end`
    pub async fn purge(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        dates_in(start, end)?;
        let removed = self.stats.purge(start, end).await?;
        info!("Purged {} daily stat rows for {}..={}", removed, start, end);
        Ok(removed)
    }

    /// Aggregated rows for `start..=end`
    pub async fn daily_series(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyStat>> {
        dates_in(start, end)?;
        self.stats.range(start, end).await
    }
}
