use super::container_models::{ContainerId, ContainerRef};
use super::waste_type_models::WasteTypeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DetectionId = i64;

/// Bounding box as reported by the detector. Not validated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One classified object inside a new detection event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub waste_type: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Detection event ready to be written to the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDetection {
    pub container: ContainerRef,
    pub image_name: Option<String>,
    pub image_path: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub objects: Vec<DetectedObject>,
}

/// Detection event (one per analysed image)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    pub container: ContainerRef,
    pub image_name: Option<String>,
    pub image_path: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub object_count: i32,
}

/// Database row for `detections`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DetectionDb {
    pub id: DetectionId,
    pub container_id: Option<ContainerId>,
    pub image_name: Option<String>,
    pub image_path: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub object_count: i32,
}

impl From<DetectionDb> for Detection {
    fn from(db: DetectionDb) -> Self {
        Self {
            id: db.id,
            container: ContainerRef::from(db.container_id),
            image_name: db.image_name,
            image_path: db.image_path,
            detected_at: db.detected_at,
            object_count: db.object_count,
        }
    }
}

/// Detail row owned by a detection event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDetail {
    pub id: i64,
    pub detection_id: DetectionId,
    pub waste_type_id: WasteTypeId,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Detail rows grouped by container and waste type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectCount {
    pub container: ContainerRef,
    pub waste_type: String,
    pub count: i64,
}

/// Detection events grouped by container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCount {
    pub container: ContainerRef,
    pub events: i64,
}

/// Result of removing a range of detection events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PurgeReport {
    /// Detection events removed
    pub rows_removed: u64,
    /// Detail rows removed along with them
    pub objects_removed: u64,
}
