use crate::db::models::{CityKey, Container, ContainerId, ContainerRef};
use crate::error::Error;
use crate::stats::window::TimeWindow;
use crate::store::{ContainerRegistry, EventLog, Stores, WasteTypeCatalog};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Which containers a count covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountScope {
    /// One registered container
    Container(ContainerId),
    /// Every container that isn't soft-deleted, plus the unknown bucket
    Active,
    /// Soft-deleted containers too. Daily statistics use this.
    Everything,
}

impl CountScope {
    fn includes(&self, container: &Container) -> bool {
        match self {
            CountScope::Container(id) => container.id == *id,
            CountScope::Active => !container.is_deleted,
            CountScope::Everything => true,
        }
    }
}

/// Dimensions to group detail rows by. No dimension yields one total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupBy {
    pub container: bool,
    pub city: bool,
    pub waste_type: bool,
}

impl GroupBy {
    pub const NONE: GroupBy = GroupBy {
        container: false,
        city: false,
        waste_type: false,
    };
    pub const CONTAINER: GroupBy = GroupBy {
        container: true,
        city: false,
        waste_type: false,
    };
    pub const CITY: GroupBy = GroupBy {
        container: false,
        city: true,
        waste_type: false,
    };
    pub const WASTE_TYPE: GroupBy = GroupBy {
        container: false,
        city: false,
        waste_type: true,
    };
    pub const CITY_AND_WASTE_TYPE: GroupBy = GroupBy {
        container: false,
        city: true,
        waste_type: true,
    };
    pub const CONTAINER_AND_WASTE_TYPE: GroupBy = GroupBy {
        container: true,
        city: false,
        waste_type: true,
    };
}

/// Whether groups without rows show up as zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// Only groups with at least one detail row
    Present,
    /// Every group known to the registry and catalog, zero-filled
    AllKnown,
}

/// Bucket a detail row was counted in. Dimensions not grouped on are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GroupKey {
    pub container: Option<ContainerRef>,
    pub city: Option<CityKey>,
    pub waste_type: Option<String>,
}

/// Grouped detail-row counts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Counts {
    groups: BTreeMap<GroupKey, i64>,
}

impl Counts {
    pub fn total(&self) -> i64 {
        self.groups.values().sum()
    }

    pub fn get(&self, key: &GroupKey) -> i64 {
        self.groups.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &i64)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn by_city(&self) -> BTreeMap<String, i64> {
        self.fold(|key| key.city.as_ref().map(|c| c.to_string()))
    }

    pub fn by_waste_type(&self) -> BTreeMap<String, i64> {
        self.fold(|key| key.waste_type.clone())
    }

    pub fn by_container(&self) -> BTreeMap<ContainerRef, i64> {
        self.fold(|key| key.container)
    }

    /// Waste-type breakdown of one container's rows
    pub fn waste_types_of(&self, container: ContainerRef) -> BTreeMap<String, i64> {
        self.groups
            .iter()
            .filter(|(key, _)| key.container == Some(container))
            .filter_map(|(key, count)| key.waste_type.clone().map(|w| (w, *count)))
            .fold(BTreeMap::new(), |mut acc, (waste_type, count)| {
                *acc.entry(waste_type).or_insert(0) += count;
                acc
            })
    }

    fn fold<K: Ord>(&self, project: impl Fn(&GroupKey) -> Option<K>) -> BTreeMap<K, i64> {
        let mut out = BTreeMap::new();
        for (key, count) in &self.groups {
            if let Some(k) = project(key) {
                *out.entry(k).or_insert(0) += count;
            }
        }
        out
    }
}

/// Counts detail rows over a time window. Reads the event log on every call.
#[derive(Clone)]
pub struct WindowCounter {
    events: Arc<dyn EventLog>,
    containers: Arc<dyn ContainerRegistry>,
    catalog: Arc<dyn WasteTypeCatalog>,
}

impl WindowCounter {
    pub fn new(stores: &Stores) -> Self {
        Self {
            events: stores.events.clone(),
            containers: stores.containers.clone(),
            catalog: stores.catalog.clone(),
        }
    }

    /// Grouped detail-row counts for `scope` inside `window`.
    ///
    /// Each detail row adds one to exactly one bucket. The city of a row is
    /// its container's city; rows from the unknown bucket, from containers
    /// missing in the registry or with a blank city count under `UNKNOWN`.
    pub async fn count(
        &self,
        scope: CountScope,
        window: &TimeWindow,
        group_by: GroupBy,
        mode: GroupMode,
    ) -> Result<Counts> {
        let filter = self.filter_for(scope).await?;
        let registry = self.registry().await?;
        let rows = self.events.object_counts(window, filter).await?;

        let mut groups = BTreeMap::new();
        if mode == GroupMode::AllKnown {
            for key in self.known_keys(scope, group_by, &registry).await? {
                groups.insert(key, 0);
            }
        }

        for row in rows {
            let container = row.container.id().and_then(|id| registry.get(&id));
            if scope == CountScope::Active && container.map_or(false, |c| c.is_deleted) {
                continue;
            }
            let key = GroupKey {
                container: group_by.container.then_some(row.container),
                city: group_by.city.then(|| {
                    container
                        .map(Container::city_key)
                        .unwrap_or(CityKey::Unknown)
                }),
                waste_type: group_by.waste_type.then(|| row.waste_type.clone()),
            };
            *groups.entry(key).or_insert(0) += row.count;
        }

        Ok(Counts { groups })
    }

    /// Calendar-day form: `start..=end`, one container or all active ones
    pub async fn count_days(
        &self,
        container: Option<ContainerId>,
        start: NaiveDate,
        end: NaiveDate,
        group_by: GroupBy,
        mode: GroupMode,
    ) -> Result<Counts> {
        let window = TimeWindow::days(start, end)?;
        let scope = container.map_or(CountScope::Active, CountScope::Container);
        self.count(scope, &window, group_by, mode).await
    }

    /// Ungrouped detail-row total
    pub async fn total(&self, scope: CountScope, window: &TimeWindow) -> Result<i64> {
        Ok(self
            .count(scope, window, GroupBy::NONE, GroupMode::Present)
            .await?
            .total())
    }

    /// Detection events (not detail rows) per container inside `window`
    pub async fn events_by_container(
        &self,
        scope: CountScope,
        window: &TimeWindow,
    ) -> Result<BTreeMap<ContainerRef, i64>> {
        let filter = self.filter_for(scope).await?;
        let registry = self.registry().await?;
        let rows = self.events.event_counts(window, filter).await?;

        Ok(rows
            .into_iter()
            .filter(|row| {
                scope != CountScope::Active
                    || !row
                        .container
                        .id()
                        .and_then(|id| registry.get(&id))
                        .map_or(false, |c| c.is_deleted)
            })
            .map(|row| (row.container, row.events))
            .collect())
    }

    async fn filter_for(&self, scope: CountScope) -> Result<Option<ContainerRef>> {
        match scope {
            CountScope::Container(id) => {
                if self.containers.get(id).await?.is_none() {
                    return Err(Error::NotFound(format!("container {}", id)).into());
                }
                Ok(Some(ContainerRef::Known(id)))
            }
            CountScope::Active | CountScope::Everything => Ok(None),
        }
    }

    async fn registry(&self) -> Result<HashMap<ContainerId, Container>> {
        Ok(self
            .containers
            .list(true)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect())
    }

    async fn known_keys(
        &self,
        scope: CountScope,
        group_by: GroupBy,
        registry: &HashMap<ContainerId, Container>,
    ) -> Result<Vec<GroupKey>> {
        let in_scope: Vec<&Container> = registry.values().filter(|c| scope.includes(c)).collect();
        let mut keys = vec![GroupKey::default()];

        if group_by.container {
            let ids: BTreeSet<ContainerId> = in_scope.iter().map(|c| c.id).collect();
            keys = expand(keys, ids, |key, id| key.container = Some(ContainerRef::Known(id)));
        }
        if group_by.city {
            let cities: BTreeSet<CityKey> = in_scope.iter().map(|c| c.city_key()).collect();
            keys = expand(keys, cities, |key, city| key.city = Some(city));
        }
        if group_by.waste_type {
            let names: BTreeSet<String> =
                self.catalog.list().await?.into_iter().map(|w| w.name).collect();
            keys = expand(keys, names, |key, name| key.waste_type = Some(name));
        }
        Ok(keys)
    }
}

/// Cartesian product of `keys` with `values` along one dimension
fn expand<T: Clone>(
    keys: Vec<GroupKey>,
    values: BTreeSet<T>,
    set: impl Fn(&mut GroupKey, T),
) -> Vec<GroupKey> {
    let mut out = Vec::with_capacity(keys.len() * values.len());
    for key in keys {
        for value in &values {
            let mut next = key.clone();
            set(&mut next, value.clone());
            out.push(next);
        }
    }
    out
}
