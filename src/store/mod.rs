//! Storage seams the statistics core reads from and writes into.
//!
//! The event log, container registry and waste-type catalog are owned by the
//! surrounding system; the daily stat store holds rows derived by the
//! aggregator. `memory` implements all four in process, `db::repositories`
//! implements them on PostgreSQL.

use crate::db::models::{
    CityKey, Container, ContainerId, ContainerRef, DailyStat, Detection, EventCount,
    NewContainer, NewDetection, ObjectCount, PurgeReport, WasteType, WasteTypeId,
};
use crate::stats::window::TimeWindow;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

pub mod memory;

pub use memory::MemoryStore;

/// Append-only log of detection events and their detail rows
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist an event with its detail rows, resolving waste types by name
    async fn insert(&self, detection: NewDetection) -> Result<Detection>;

    /// Detail rows inside `window`, grouped by container and waste type name.
    /// `container = None` means every container including the unknown bucket.
    async fn object_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<ObjectCount>>;

    /// Detection events inside `window`, grouped by container
    async fn event_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<EventCount>>;

    /// Remove every event (and its detail rows) inside `window`
    async fn purge(&self, window: &TimeWindow) -> Result<PurgeReport>;
}

/// Container records
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    async fn create(&self, container: NewContainer) -> Result<Container>;

    async fn get(&self, id: ContainerId) -> Result<Option<Container>>;

    /// All containers ordered by id
    async fn list(&self, include_deleted: bool) -> Result<Vec<Container>>;

    /// Get a container, registering a placeholder when the id is new
    async fn ensure(&self, id: ContainerId) -> Result<Container>;

    /// Set `last_connected_at`; the only field the core writes
    async fn touch_connection(&self, id: ContainerId, at: DateTime<Utc>) -> Result<Container>;

    /// Flip the soft-delete flag. Returns `false` when it already had that value.
    async fn set_deleted(&self, id: ContainerId, deleted: bool) -> Result<bool>;
}

/// Waste type catalog
#[async_trait]
pub trait WasteTypeCatalog: Send + Sync {
    /// Look up a waste type by name, creating it if needed
    async fn resolve(&self, name: &str) -> Result<WasteType>;

    async fn list(&self) -> Result<Vec<WasteType>>;

    /// Fails with `Conflict` while detail rows still reference the type
    async fn delete(&self, id: WasteTypeId) -> Result<()>;
}

/// Pre-aggregated daily statistics
#[async_trait]
pub trait DailyStatStore: Send + Sync {
    /// Atomic insert-or-replace keyed by (date, city, waste type)
    async fn upsert(&self, stat: &DailyStat) -> Result<()>;

    /// Delete rows for `date` whose key is not in `keep`. Returns rows removed.
    async fn retain(&self, date: NaiveDate, keep: &[(CityKey, String)]) -> Result<u64>;

    /// Rows for `start..=end` ordered by key
    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyStat>>;

    async fn purge(&self, start: NaiveDate, end: NaiveDate) -> Result<u64>;
}

/// Handles to every store the services need
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventLog>,
    pub containers: Arc<dyn ContainerRegistry>,
    pub catalog: Arc<dyn WasteTypeCatalog>,
    pub stats: Arc<dyn DailyStatStore>,
}

impl Stores {
    /// All four stores backed by one in-process `MemoryStore`
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            events: store.clone(),
            containers: store.clone(),
            catalog: store.clone(),
            stats: store,
        }
    }
}
