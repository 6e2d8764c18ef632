use crate::db::models::{Container, ContainerId, ContainerRef, NewContainer};
use crate::error::Error;
use crate::query::{run_query, ContainerFilter, Page, PageRequest, Queryable, SortKey, SortSpec};
use crate::stats::classifier::{
    classify_connectivity, classify_window, remaining, stale_threshold, Connectivity, FillStatus,
    FillThresholds,
};
use crate::stats::counter::{CountScope, Counts, GroupBy, GroupMode, WindowCounter};
use crate::stats::window::TimeWindow;
use crate::store::Stores;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-request derivation parameters, validated on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewParams {
    pub window_days: i64,
    pub thresholds: FillThresholds,
    pub stale_hours: i64,
    pub now: DateTime<Utc>,
}

impl ViewParams {
    pub fn new(
        window_days: i64,
        full_threshold: i64,
        medium_threshold: i64,
        stale_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        // fail fast on any bad input before touching the stores
        TimeWindow::trailing(now, window_days)?;
        let thresholds = FillThresholds::new(full_threshold, medium_threshold)?;
        stale_threshold(stale_hours)?;
        Ok(Self {
            window_days,
            thresholds,
            stale_hours,
            now,
        })
    }

    pub fn window(&self) -> Result<TimeWindow> {
        TimeWindow::trailing(self.now, self.window_days)
    }
}

/// A container with its derived counts and statuses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerView {
    pub container_id: ContainerId,
    pub name: String,
    pub city: Option<String>,
    pub capacity: Option<i64>,
    /// Flag as stored in the registry
    pub is_online: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Derived from `last_connected_at`; may disagree with `is_online`
    pub connectivity: Connectivity,
    pub window_days: i64,
    pub thresholds: FillThresholds,
    /// Detection events in the window
    pub event_count: i64,
    /// Detail rows in the window
    pub current_count: i64,
    /// Detail rows ever recorded
    pub total_count: i64,
    pub capacity_remaining: Option<i64>,
    pub fill_status: FillStatus,
    pub by_waste_type: BTreeMap<String, i64>,
}

impl Queryable for ContainerView {
    fn row_id(&self) -> i64 {
        self.container_id
    }

    fn sort_value(&self, key: SortKey) -> Option<i64> {
        match key {
            SortKey::TotalCount => Some(self.total_count),
            SortKey::CurrentCount => Some(self.current_count),
            SortKey::CapacityRemaining => self.capacity_remaining,
            SortKey::Status => Some(i64::from(self.fill_status.rank())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineReason {
    /// Never connected, or not within `stale_hours`
    StaleConnection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineEntry {
    pub container_id: ContainerId,
    pub name: String,
    pub city: Option<String>,
    pub is_online: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub reason: OfflineReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTest {
    pub container_id: ContainerId,
    pub last_connected_at: DateTime<Utc>,
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    AlreadyActive,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContainerQuery {
    #[serde(default)]
    pub filter: ContainerFilter,
    #[serde(default)]
    pub sort: SortSpec,
}

/// Container registry operations and the derived container views
#[derive(Clone)]
pub struct ContainerService {
    stores: Stores,
    counter: WindowCounter,
}

impl ContainerService {
    pub fn new(stores: Stores) -> Self {
        let counter = WindowCounter::new(&stores);
        Self { stores, counter }
    }

    pub async fn register(&self, container: NewContainer) -> Result<Container> {
        if container.name.trim().is_empty() {
            return Err(Error::InvalidArgument("container name is empty".into()).into());
        }
        if container.capacity.map_or(false, |c| c <= 0) {
            return Err(Error::InvalidArgument("capacity must be positive".into()).into());
        }
        let created = self.stores.containers.create(container).await?;
        info!("Registered container {} ({})", created.id, created.name);
        Ok(created)
    }

    /// Derived view of one registered container
    pub async fn view(&self, id: ContainerId, params: &ViewParams) -> Result<ContainerView> {
        let container = self.require(id).await?;
        let scope = CountScope::Container(id);
        let window = params.window()?;
        let all_time = TimeWindow::all_time();

        let (current, events, total) = futures::try_join!(
            self.counter
                .count(scope, &window, GroupBy::CONTAINER_AND_WASTE_TYPE, GroupMode::Present),
            self.counter.events_by_container(scope, &window),
            self.counter.total(scope, &all_time),
        )?;
        let key = ContainerRef::Known(id);
        let event_count = events.get(&key).copied().unwrap_or(0);

        build_view(container, params, &current, event_count, total)
    }

    /// Filtered, sorted page of active containers. Sort fields are derived
    /// from `params`, so the same data can rank differently per request.
    pub async fn list(
        &self,
        query: &ContainerQuery,
        params: &ViewParams,
        page: PageRequest,
    ) -> Result<Page<ContainerView>> {
        let window = params.window()?;
        let all_time = TimeWindow::all_time();
        let scope = CountScope::Active;

        let (containers, current, events, totals) = futures::try_join!(
            self.stores.containers.list(false),
            self.counter
                .count(scope, &window, GroupBy::CONTAINER_AND_WASTE_TYPE, GroupMode::Present),
            self.counter.events_by_container(scope, &window),
            self.counter
                .count(scope, &all_time, GroupBy::CONTAINER, GroupMode::Present),
        )?;
        let totals = totals.by_container();

        let mut views = Vec::with_capacity(containers.len());
        for container in containers {
            let key = ContainerRef::Known(container.id);
            let event_count = events.get(&key).copied().unwrap_or(0);
            let total = totals.get(&key).copied().unwrap_or(0);
            views.push(build_view(container, params, &current, event_count, total)?);
        }

        debug!("Listing {} containers with {:?}", views.len(), query);
        let filter = &query.filter;
        Ok(run_query(
            views,
            |v| filter.matches(&v.name, v.city.as_deref(), v.is_online, v.fill_status),
            query.sort,
            page,
        ))
    }

    /// Active containers classified offline by staleness, ordered by id
    pub async fn offline_set(
        &self,
        stale_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<OfflineEntry>> {
        stale_threshold(stale_hours)?;
        let mut entries = Vec::new();
        for container in self.stores.containers.list(false).await? {
            if classify_connectivity(container.last_connected_at, stale_hours, now)?
                == Connectivity::Online
            {
                continue;
            }
            entries.push(OfflineEntry {
                container_id: container.id,
                name: container.name,
                city: container.city,
                is_online: container.is_online,
                last_connected_at: container.last_connected_at,
                reason: OfflineReason::StaleConnection,
            });
        }
        Ok(entries)
    }

    /// Record a successful connection at `now`
    pub async fn test_connection(
        &self,
        id: ContainerId,
        stale_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<ConnectionTest> {
        stale_threshold(stale_hours)?;
        let container = self.require(id).await?;
        let updated = self.stores.containers.touch_connection(container.id, now).await?;
        let connectivity = classify_connectivity(updated.last_connected_at, stale_hours, now)?;
        info!("Connection test for container {} at {}", id, now);
        Ok(ConnectionTest {
            container_id: id,
            last_connected_at: now,
            connectivity,
        })
    }

    pub async fn delete(&self, id: ContainerId) -> Result<DeleteOutcome> {
        if self.stores.containers.set_deleted(id, true).await? {
            info!("Soft-deleted container {}", id);
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyDeleted)
        }
    }

    pub async fn restore(&self, id: ContainerId) -> Result<RestoreOutcome> {
        if self.stores.containers.set_deleted(id, false).await? {
            info!("Restored container {}", id);
            Ok(RestoreOutcome::Restored)
        } else {
            Ok(RestoreOutcome::AlreadyActive)
        }
    }

    async fn require(&self, id: ContainerId) -> Result<Container> {
        match self.stores.containers.get(id).await? {
            Some(container) if !container.is_deleted => Ok(container),
            _ => Err(Error::NotFound(format!("container {}", id)).into()),
        }
    }
}

fn build_view(
    container: Container,
    params: &ViewParams,
    current: &Counts,
    event_count: i64,
    total_count: i64,
) -> Result<ContainerView> {
    let key = ContainerRef::Known(container.id);
    let by_waste_type = current.waste_types_of(key);
    let current_count: i64 = by_waste_type.values().sum();
    let connectivity =
        classify_connectivity(container.last_connected_at, params.stale_hours, params.now)?;

    Ok(ContainerView {
        container_id: container.id,
        capacity_remaining: container.capacity.map(|c| remaining(c, current_count)),
        fill_status: classify_window(event_count, current_count, &params.thresholds),
        name: container.name,
        city: container.city,
        capacity: container.capacity,
        is_online: container.is_online,
        last_connected_at: container.last_connected_at,
        connectivity,
        window_days: params.window_days,
        thresholds: params.thresholds,
        event_count,
        current_count,
        total_count,
        by_waste_type,
    })
}
