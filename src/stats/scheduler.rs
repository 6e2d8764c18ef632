use crate::config::StatsConfig;
use crate::error::Error;
use crate::stats::aggregator::{DailyAggregator, RebuildReport};
use anyhow::Result;
use chrono::{Duration as DateDuration, NaiveDate, Utc};
use log::{error, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Largest accepted `lag_days`
pub const MAX_LAG_DAYS: u32 = 365;
/// Largest accepted `interval_minutes` (one week)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Periodically rebuilds daily statistics for `today - lag_days`.
///
/// Scheduled ticks and on-demand rebuilds both go through the same
/// `DailyAggregator`.
pub struct AggregationScheduler {
    aggregator: DailyAggregator,
    config: StatsConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationScheduler {
    /// Create a new aggregation scheduler
    pub fn new(aggregator: DailyAggregator, config: StatsConfig) -> Self {
        Self {
            aggregator,
            config,
            task: Mutex::new(None),
        }
    }

    /// Date a scheduled tick on `today` rebuilds
    pub fn target_date(&self, today: NaiveDate) -> Result<NaiveDate> {
        let lag_days = self.config.lag_days;
        if lag_days > MAX_LAG_DAYS {
            return Err(Error::Config(format!(
                "stats.lag_days must be at most {}, got {}",
                MAX_LAG_DAYS, lag_days
            ))
            .into());
        }
        today
            .checked_sub_signed(DateDuration::days(i64::from(lag_days)))
            .ok_or_else(|| {
                Error::InvalidRange(format!("{} minus {} days is out of range", today, lag_days))
                    .into()
            })
    }

    /// One scheduled tick
    pub async fn run_once(&self, today: NaiveDate) -> Result<RebuildReport> {
        let target = self.target_date(today)?;
        self.aggregator.rebuild(target, target).await
    }

    /// On-demand rebuild of an arbitrary range
    pub async fn rebuild_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RebuildReport> {
        self.aggregator.rebuild(start, end).await
    }

    pub fn aggregator(&self) -> &DailyAggregator {
        &self.aggregator
    }

    /// Start the recurring rebuild in the background
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            info!("Daily stats scheduler is disabled");
            return Ok(());
        }

        let minutes = self.config.interval_minutes;
        if !(1..=MAX_INTERVAL_MINUTES).contains(&minutes) {
            return Err(Error::Config(format!(
                "stats.interval_minutes must be within 1..={}, got {}",
                MAX_INTERVAL_MINUTES, minutes
            ))
            .into());
        }
        // surface a bad lag before spawning
        self.target_date(Utc::now().date_naive())?;

        info!(
            "Starting daily stats scheduler: every {} minutes, lag {} days",
            minutes, self.config.lag_days
        );

        let period = Duration::from_secs(minutes * 60);
        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                interval.tick().await;

                let today = Utc::now().date_naive();
                if let Err(e) = scheduler.run_once(today).await {
                    error!("Error rebuilding daily stats on {}: {}", today, e);
                }
            }
        });

        let mut task = self.task.lock().await;
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop the background task
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down daily stats scheduler");
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
