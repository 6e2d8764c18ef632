use super::{ContainerRegistry, DailyStatStore, EventLog, WasteTypeCatalog};
use crate::db::models::{
    CityKey, Container, ContainerId, ContainerRef, DailyStat, Detection, DetectionDetail,
    DetectionId, EventCount, NewContainer, NewDetection, ObjectCount, PurgeReport, WasteType,
    WasteTypeId,
};
use crate::error::Error;
use crate::stats::window::TimeWindow;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

type StatKey = (NaiveDate, CityKey, String);

#[derive(Default)]
struct Inner {
    containers: BTreeMap<ContainerId, Container>,
    waste_types: BTreeMap<WasteTypeId, WasteType>,
    detections: BTreeMap<DetectionId, Detection>,
    details: BTreeMap<i64, DetectionDetail>,
    daily_stats: BTreeMap<StatKey, i64>,
    last_container_id: ContainerId,
    last_waste_type_id: WasteTypeId,
    last_detection_id: DetectionId,
    last_detail_id: i64,
}

impl Inner {
    fn resolve_waste_type(&mut self, name: &str) -> WasteType {
        if let Some(existing) = self.waste_types.values().find(|w| w.name == name) {
            return existing.clone();
        }
        self.last_waste_type_id += 1;
        let waste_type = WasteType {
            id: self.last_waste_type_id,
            name: name.to_string(),
        };
        self.waste_types.insert(waste_type.id, waste_type.clone());
        waste_type
    }

    fn matches(
        detection: &Detection,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> bool {
        window.contains(detection.detected_at)
            && container.map_or(true, |c| detection.container == c)
    }
}

/// In-process implementation of every store trait.
///
/// All state sits behind one lock, so each write (including a daily stat
/// upsert) is atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn insert(&self, detection: NewDetection) -> Result<Detection> {
        let mut inner = self.inner.write().await;

        inner.last_detection_id += 1;
        let record = Detection {
            id: inner.last_detection_id,
            container: detection.container,
            image_name: detection.image_name,
            image_path: detection.image_path,
            detected_at: detection.detected_at,
            object_count: detection.objects.len() as i32,
        };

        for object in detection.objects {
            let waste_type = inner.resolve_waste_type(&object.waste_type);
            inner.last_detail_id += 1;
            let detail = DetectionDetail {
                id: inner.last_detail_id,
                detection_id: record.id,
                waste_type_id: waste_type.id,
                confidence: object.confidence,
                bbox: object.bbox,
            };
            inner.details.insert(detail.id, detail);
        }

        inner.detections.insert(record.id, record.clone());
        Ok(record)
    }

    async fn object_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<ObjectCount>> {
        let inner = self.inner.read().await;
        let mut grouped: BTreeMap<(ContainerRef, String), i64> = BTreeMap::new();

        for detail in inner.details.values() {
            let Some(detection) = inner.detections.get(&detail.detection_id) else {
                continue;
            };
            if !Inner::matches(detection, window, container) {
                continue;
            }
            let Some(waste_type) = inner.waste_types.get(&detail.waste_type_id) else {
                continue;
            };
            *grouped
                .entry((detection.container, waste_type.name.clone()))
                .or_insert(0) += 1;
        }

        Ok(grouped
            .into_iter()
            .map(|((container, waste_type), count)| ObjectCount {
                container,
                waste_type,
                count,
            })
            .collect())
    }

    async fn event_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<EventCount>> {
        let inner = self.inner.read().await;
        let mut grouped: BTreeMap<ContainerRef, i64> = BTreeMap::new();

        for detection in inner.detections.values() {
            if Inner::matches(detection, window, container) {
                *grouped.entry(detection.container).or_insert(0) += 1;
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(container, events)| EventCount { container, events })
            .collect())
    }

    async fn purge(&self, window: &TimeWindow) -> Result<PurgeReport> {
        let mut inner = self.inner.write().await;

        let doomed: BTreeSet<DetectionId> = inner
            .detections
            .values()
            .filter(|d| Inner::matches(d, window, None))
            .map(|d| d.id)
            .collect();

        let details_before = inner.details.len();
        inner
            .details
            .retain(|_, detail| !doomed.contains(&detail.detection_id));
        let objects_removed = (details_before - inner.details.len()) as u64;

        inner.detections.retain(|id, _| !doomed.contains(id));

        Ok(PurgeReport {
            rows_removed: doomed.len() as u64,
            objects_removed,
        })
    }
}

#[async_trait]
impl ContainerRegistry for MemoryStore {
    async fn create(&self, container: NewContainer) -> Result<Container> {
        let mut inner = self.inner.write().await;
        inner.last_container_id += 1;
        let record = Container {
            id: inner.last_container_id,
            name: container.name,
            city: container.city,
            address_detail: container.address_detail,
            latitude: container.latitude,
            longitude: container.longitude,
            capacity: container.capacity,
            is_online: container.is_online,
            last_connected_at: container.last_connected_at,
            is_deleted: false,
        };
        inner.containers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: ContainerId) -> Result<Option<Container>> {
        Ok(self.inner.read().await.containers.get(&id).cloned())
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Container>> {
        Ok(self
            .inner
            .read()
            .await
            .containers
            .values()
            .filter(|c| include_deleted || !c.is_deleted)
            .cloned()
            .collect())
    }

    async fn ensure(&self, id: ContainerId) -> Result<Container> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.containers.get(&id) {
            return Ok(existing.clone());
        }
        let record = Container::placeholder(id);
        inner.last_container_id = inner.last_container_id.max(id);
        inner.containers.insert(id, record.clone());
        Ok(record)
    }

    async fn touch_connection(&self, id: ContainerId, at: DateTime<Utc>) -> Result<Container> {
        let mut inner = self.inner.write().await;
        let container = inner
            .containers
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("container {}", id)))?;
        container.last_connected_at = Some(at);
        Ok(container.clone())
    }

    async fn set_deleted(&self, id: ContainerId, deleted: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let container = inner
            .containers
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("container {}", id)))?;
        if container.is_deleted == deleted {
            return Ok(false);
        }
        container.is_deleted = deleted;
        Ok(true)
    }
}

#[async_trait]
impl WasteTypeCatalog for MemoryStore {
    async fn resolve(&self, name: &str) -> Result<WasteType> {
        Ok(self.inner.write().await.resolve_waste_type(name))
    }

    async fn list(&self) -> Result<Vec<WasteType>> {
        Ok(self.inner.read().await.waste_types.values().cloned().collect())
    }

    async fn delete(&self, id: WasteTypeId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.waste_types.contains_key(&id) {
            return Err(Error::NotFound(format!("waste type {}", id)).into());
        }
        let in_use = inner.details.values().filter(|d| d.waste_type_id == id).count();
        if in_use > 0 {
            return Err(Error::Conflict(format!(
                "waste type {} is in_use by {} detection details",
                id, in_use
            ))
            .into());
        }
        inner.waste_types.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DailyStatStore for MemoryStore {
    async fn upsert(&self, stat: &DailyStat) -> Result<()> {
        self.inner
            .write()
            .await
            .daily_stats
            .insert(stat.key(), stat.detection_count);
        Ok(())
    }

    async fn retain(&self, date: NaiveDate, keep: &[(CityKey, String)]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.daily_stats.len();
        inner.daily_stats.retain(|(stats_date, city, waste_type), _| {
            *stats_date != date
                || keep
                    .iter()
                    .any(|(k_city, k_type)| k_city == city && k_type == waste_type)
        });
        Ok((before - inner.daily_stats.len()) as u64)
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyStat>> {
        let inner = self.inner.read().await;
        Ok(inner
            .daily_stats
            .iter()
            .filter(|((date, _, _), _)| *date >= start && *date <= end)
            .map(|((stats_date, city, waste_type), count)| DailyStat {
                stats_date: *stats_date,
                city: city.clone(),
                waste_type: waste_type.clone(),
                detection_count: *count,
            })
            .collect())
    }

    async fn purge(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.daily_stats.len();
        inner
            .daily_stats
            .retain(|(date, _, _), _| *date < start || *date > end);
        Ok((before - inner.daily_stats.len()) as u64)
    }
}
