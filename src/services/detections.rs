use crate::db::models::{
    BoundingBox, ContainerRef, DetectedObject, DetectionId, NewDetection, PurgeReport, WasteType,
    WasteTypeId,
};
use crate::error::Error;
use crate::stats::window::TimeWindow;
use crate::store::Stores;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// One object as the detector reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPayload {
    #[serde(alias = "class_name")]
    pub waste_type: String,
    pub confidence: f64,
    #[serde(alias = "box")]
    pub bbox: BoundingBox,
}

/// Detection event as the detector reports it (one per image)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default, alias = "trashcan_id")]
    pub container_id: Option<i64>,
    #[serde(default, alias = "filename", alias = "source_image")]
    pub image_name: Option<String>,
    #[serde(default, alias = "saved_path")]
    pub image_path: Option<String>,
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
    /// Informational; the stored count is always the number of objects
    #[serde(default, alias = "object_count")]
    pub total_objects: Option<i64>,
    #[serde(default, alias = "predictions")]
    pub objects: Vec<ObjectPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub event_id: DetectionId,
    pub total_objects: i64,
}

/// Ingestion and raw-log maintenance
#[derive(Clone)]
pub struct DetectionService {
    stores: Stores,
}

impl DetectionService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Store one detection event.
    ///
    /// A missing container id lands in the unknown bucket; an id the registry
    /// hasn't seen registers a placeholder container. Unknown waste type names
    /// are added to the catalog.
    pub async fn ingest(
        &self,
        request: IngestRequest,
        now: DateTime<Utc>,
    ) -> Result<IngestReceipt> {
        let mut objects = Vec::with_capacity(request.objects.len());
        for object in request.objects {
            let waste_type = object.waste_type.trim();
            if waste_type.is_empty() {
                return Err(Error::InvalidArgument("object waste type name is empty".into()).into());
            }
            objects.push(DetectedObject {
                waste_type: waste_type.to_string(),
                confidence: object.confidence,
                bbox: object.bbox,
            });
        }

        let container = match request.container_id {
            Some(id) => {
                self.stores.containers.ensure(id).await?;
                ContainerRef::Known(id)
            }
            None => ContainerRef::Unknown,
        };

        if let Some(reported) = request.total_objects {
            if reported != objects.len() as i64 {
                warn!(
                    "Detector reported {} objects but sent {}; storing {}",
                    reported,
                    objects.len(),
                    objects.len()
                );
            }
        }

        let detection = self
            .stores
            .events
            .insert(NewDetection {
                container,
                image_name: request.image_name,
                image_path: request.image_path,
                detected_at: request.detected_at.unwrap_or(now),
                objects,
            })
            .await?;

        Ok(IngestReceipt {
            event_id: detection.id,
            total_objects: i64::from(detection.object_count),
        })
    }

    /// Delete raw events for `start..=end`. Daily stats for those dates are
    /// stale until rebuilt.
    pub async fn purge_range(&self, start: NaiveDate, end: NaiveDate) -> Result<PurgeReport> {
        let window = TimeWindow::days(start, end)?;
        let report = self.stores.events.purge(&window).await?;
        info!(
            "Purged {} detection events ({} objects) for {}..={}",
            report.rows_removed, report.objects_removed, start, end
        );
        Ok(report)
    }

    pub async fn waste_types(&self) -> Result<Vec<WasteType>> {
        self.stores.catalog.list().await
    }

    /// Fails with `Conflict` while any detail row references the type
    pub async fn delete_waste_type(&self, id: WasteTypeId) -> Result<()> {
        self.stores.catalog.delete(id).await?;
        info!("Deleted waste type {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::window::TimeWindow;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn accepts_detector_field_aliases() -> Result<()> {
        let request: IngestRequest = serde_json::from_str(
            r#"{
                "trashcan_id": 3,
                "filename": "cam3_0001.jpg",
                "saved_path": "/data/cam3_0001.jpg",
                "object_count": 1,
                "predictions": [
                    {"class_id": 2, "class_name": "Can", "confidence": 0.91,
                     "box": {"x1": 1.0, "y1": 2.0, "x2": 3.0, "y2": 4.0}}
                ]
            }"#,
        )?;
        assert_eq!(request.container_id, Some(3));
        assert_eq!(request.image_name.as_deref(), Some("cam3_0001.jpg"));
        assert_eq!(request.image_path.as_deref(), Some("/data/cam3_0001.jpg"));
        assert_eq!(request.objects[0].waste_type, "Can");
        assert_eq!(request.objects[0].bbox.x2, 3.0);
        Ok(())
    }

    #[tokio::test]
    async fn ingest_registers_unknown_containers_and_types() -> Result<()> {
        let stores = Stores::in_memory();
        let service = DetectionService::new(stores.clone());

        let receipt = service
            .ingest(
                IngestRequest {
                    container_id: Some(42),
                    objects: vec![
                        ObjectPayload {
                            waste_type: "Plastic".into(),
                            confidence: 0.8,
                            bbox: BoundingBox::default(),
                        },
                        ObjectPayload {
                            waste_type: "Vinyl".into(),
                            confidence: 0.4,
                            bbox: BoundingBox::default(),
                        },
                    ],
                    ..IngestRequest::default()
                },
                now(),
            )
            .await?;

        assert_eq!(receipt.total_objects, 2);
        let container = stores.containers.get(42).await?;
        assert_eq!(container.map(|c| c.name), Some("Container 42".to_string()));
        assert_eq!(service.waste_types().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_container_and_timestamp_default() -> Result<()> {
        let stores = Stores::in_memory();
        let service = DetectionService::new(stores.clone());
        service.ingest(IngestRequest::default(), now()).await?;

        let window = TimeWindow::day(now().date_naive())?;
        let events = stores.events.event_counts(&window, None).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].container, ContainerRef::Unknown);
        assert!(stores.containers.list(true).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn stored_count_follows_objects_not_reported_total() -> Result<()> {
        let service = DetectionService::new(Stores::in_memory());
        let receipt = service
            .ingest(
                IngestRequest {
                    total_objects: Some(5),
                    ..IngestRequest::default()
                },
                now(),
            )
            .await?;
        assert_eq!(receipt.total_objects, 0);
        Ok(())
    }

    #[tokio::test]
    async fn waste_type_in_use_cannot_be_deleted() -> Result<()> {
        let service = DetectionService::new(Stores::in_memory());
        service
            .ingest(
                IngestRequest {
                    objects: vec![ObjectPayload {
                        waste_type: "Glass".into(),
                        confidence: 0.7,
                        bbox: BoundingBox::default(),
                    }],
                    ..IngestRequest::default()
                },
                now(),
            )
            .await?;
        let glass = service.waste_types().await?[0].id;

        let err = service.delete_waste_type(glass).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Conflict(_))));

        service
            .purge_range(now().date_naive(), now().date_naive())
            .await?;
        service.delete_waste_type(glass).await?;
        assert!(service.waste_types().await?.is_empty());

        let err = service.delete_waste_type(glass).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn blank_waste_type_is_rejected() {
        let service = DetectionService::new(Stores::in_memory());
        let err = service
            .ingest(
                IngestRequest {
                    objects: vec![ObjectPayload {
                        waste_type: "  ".into(),
                        confidence: 0.7,
                        bbox: BoundingBox::default(),
                    }],
                    ..IngestRequest::default()
                },
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidArgument(_))));
    }
}
