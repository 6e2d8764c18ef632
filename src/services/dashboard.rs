use crate::db::models::DailyStat;
use crate::error::Error;
use crate::stats::aggregator::DailyAggregator;
use crate::stats::classifier::{classify_connectivity, stale_threshold, Connectivity};
use crate::stats::counter::{CountScope, GroupBy, GroupMode, WindowCounter};
use crate::stats::window::TimeWindow;
use crate::store::Stores;
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Preset reporting periods, each ending today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Today and the six days before it
    Week,
    /// Since the first of the month
    Month,
    /// Since January 1st
    Year,
}

impl Period {
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = match self {
            Period::Week => today - Duration::days(6),
            Period::Month => today.with_day(1).unwrap_or(today),
            Period::Year => today.with_ordinal(1).unwrap_or(today),
        };
        (start, today)
    }
}

/// Either a preset period or an explicit inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRange {
    Period(Period),
    Dates(NaiveDate, NaiveDate),
}

impl StatsRange {
    /// An explicit range wins over the period; giving only one bound is an error
    pub fn from_parts(
        period: Option<Period>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(StatsRange::Dates(start, end)),
            (None, None) => Ok(StatsRange::Period(period.unwrap_or(Period::Week))),
            _ => Err(Error::InvalidRange(
                "start_date and end_date must be given together".into(),
            )
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_events: i64,
    pub total_objects: i64,
    pub by_type: BTreeMap<String, i64>,
    pub total_containers: usize,
    pub offline_containers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub period: Option<Period>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_events: i64,
    pub total_objects: i64,
    /// Every catalog type, zero when absent
    pub by_type: BTreeMap<String, i64>,
    /// Every city of an active container, zero when absent
    pub by_city: BTreeMap<String, i64>,
}

/// Read-only dashboard aggregates over active containers
#[derive(Clone)]
pub struct DashboardService {
    stores: Stores,
    counter: WindowCounter,
    aggregator: DailyAggregator,
}

impl DashboardService {
    pub fn new(stores: Stores, aggregator: DailyAggregator) -> Self {
        let counter = WindowCounter::new(&stores);
        Self {
            stores,
            counter,
            aggregator,
        }
    }

    pub async fn summary(&self, stale_hours: i64, now: DateTime<Utc>) -> Result<DashboardSummary> {
        stale_threshold(stale_hours)?;
        let all_time = TimeWindow::all_time();
        let (by_type, events, containers) = futures::try_join!(
            self.counter
                .count(CountScope::Active, &all_time, GroupBy::WASTE_TYPE, GroupMode::Present),
            self.counter.events_by_container(CountScope::Active, &all_time),
            self.stores.containers.list(false),
        )?;

        let mut offline_containers = 0;
        for container in &containers {
            if classify_connectivity(container.last_connected_at, stale_hours, now)?
                == Connectivity::Offline
            {
                offline_containers += 1;
            }
        }

        Ok(DashboardSummary {
            total_events: events.values().sum(),
            total_objects: by_type.total(),
            by_type: by_type.by_waste_type(),
            total_containers: containers.len(),
            offline_containers,
        })
    }

    pub async fn period_stats(&self, range: StatsRange, today: NaiveDate) -> Result<PeriodStats> {
        let (period, (start, end)) = match range {
            StatsRange::Period(period) => (Some(period), period.range(today)),
            StatsRange::Dates(start, end) => (None, (start, end)),
        };
        let window = TimeWindow::days(start, end)?;

        let (by_type, by_city, events) = futures::try_join!(
            self.counter
                .count(CountScope::Active, &window, GroupBy::WASTE_TYPE, GroupMode::AllKnown),
            self.counter
                .count(CountScope::Active, &window, GroupBy::CITY, GroupMode::AllKnown),
            self.counter.events_by_container(CountScope::Active, &window),
        )?;

        Ok(PeriodStats {
            period,
            start_date: start,
            end_date: end,
            total_events: events.values().sum(),
            total_objects: by_type.total(),
            by_type: by_type.by_waste_type(),
            by_city: by_city.by_city(),
        })
    }

    /// Pre-aggregated daily rows; dates not rebuilt yet are simply absent
    pub async fn daily_series(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyStat>> {
        self.aggregator.daily_series(start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BoundingBox, ContainerRef, DetectedObject, NewContainer, NewDetection};
    use chrono::TimeZone;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn noon(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap()
    }

    async fn detect(
        stores: &Stores,
        container: ContainerRef,
        when: DateTime<Utc>,
        types: &[&str],
    ) -> Result<()> {
        stores
            .events
            .insert(NewDetection {
                container,
                image_name: None,
                image_path: None,
                detected_at: when,
                objects: types
                    .iter()
                    .map(|t| DetectedObject {
                        waste_type: t.to_string(),
                        confidence: 0.5,
                        bbox: BoundingBox::default(),
                    })
                    .collect(),
            })
            .await?;
        Ok(())
    }

    fn service(stores: &Stores) -> DashboardService {
        DashboardService::new(stores.clone(), DailyAggregator::new(stores))
    }

    #[test]
    fn period_ranges_end_today() {
        let today = date(5, 15);
        assert_eq!(Period::Week.range(today), (date(5, 9), today));
        assert_eq!(Period::Month.range(today), (date(5, 1), today));
        assert_eq!(Period::Year.range(today), (date(1, 1), today));
    }

    #[test]
    fn one_sided_range_is_rejected() {
        let err = StatsRange::from_parts(None, Some(date(5, 1)), None).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRange(_))));
        assert_eq!(
            StatsRange::from_parts(Some(Period::Year), Some(date(5, 1)), Some(date(5, 2))).ok(),
            Some(StatsRange::Dates(date(5, 1), date(5, 2)))
        );
    }

    #[tokio::test]
    async fn summary_counts_events_objects_and_offline_containers() -> Result<()> {
        let stores = Stores::in_memory();
        let bin = stores
            .containers
            .create(NewContainer {
                name: "Bin".into(),
                last_connected_at: Some(noon(5, 15)),
                ..NewContainer::default()
            })
            .await?;
        stores
            .containers
            .create(NewContainer {
                name: "Never".into(),
                ..NewContainer::default()
            })
            .await?;
        detect(&stores, ContainerRef::Known(bin.id), noon(5, 1), &["Can", "Can", "Glass"]).await?;
        detect(&stores, ContainerRef::Unknown, noon(5, 2), &[]).await?;

        let summary = service(&stores).summary(24, noon(5, 15)).await?;
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.total_objects, 3);
        assert_eq!(summary.by_type.get("Can"), Some(&2));
        assert_eq!(summary.total_containers, 2);
        assert_eq!(summary.offline_containers, 1);
        Ok(())
    }

    #[tokio::test]
    async fn period_stats_zero_fill_types_and_cities() -> Result<()> {
        let stores = Stores::in_memory();
        let seoul = stores
            .containers
            .create(NewContainer {
                name: "Seoul 1".into(),
                city: Some("Seoul".into()),
                ..NewContainer::default()
            })
            .await?;
        stores
            .containers
            .create(NewContainer {
                name: "Busan 1".into(),
                city: Some("Busan".into()),
                ..NewContainer::default()
            })
            .await?;
        detect(&stores, ContainerRef::Known(seoul.id), noon(5, 14), &["Plastic"]).await?;
        detect(&stores, ContainerRef::Unknown, noon(3, 1), &["Glass"]).await?;

        let stats = service(&stores)
            .period_stats(StatsRange::Period(Period::Week), date(5, 15))
            .await?;
        assert_eq!(stats.start_date, date(5, 9));
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.total_objects, 1);
        assert_eq!(stats.by_type.get("Plastic"), Some(&1));
        assert_eq!(stats.by_type.get("Glass"), Some(&0));
        assert_eq!(stats.by_city.get("Seoul"), Some(&1));
        assert_eq!(stats.by_city.get("Busan"), Some(&0));

        let year = service(&stores)
            .period_stats(StatsRange::Period(Period::Year), date(5, 15))
            .await?;
        assert_eq!(year.total_objects, 2);
        assert_eq!(year.by_city.get("UNKNOWN"), Some(&1));
        Ok(())
    }

    #[tokio::test]
    async fn daily_series_reads_rebuilt_rows() -> Result<()> {
        let stores = Stores::in_memory();
        detect(&stores, ContainerRef::Unknown, noon(5, 14), &["Plastic", "Plastic"]).await?;
        let aggregator = DailyAggregator::new(&stores);
        let dashboard = DashboardService::new(stores.clone(), aggregator.clone());

        assert!(dashboard.daily_series(date(5, 14), date(5, 14)).await?.is_empty());
        aggregator.rebuild(date(5, 14), date(5, 14)).await?;
        let series = dashboard.daily_series(date(5, 14), date(5, 14)).await?;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].detection_count, 2);

        let err = dashboard.daily_series(date(5, 15), date(5, 14)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidRange(_))));
        Ok(())
    }
}
