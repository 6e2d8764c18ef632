pub mod container_models;
pub mod daily_stat_models;
pub mod detection_models;
pub mod waste_type_models;

pub use container_models::{CityKey, Container, ContainerId, ContainerRef, NewContainer};
pub use daily_stat_models::{DailyStat, DailyStatDb};
pub use detection_models::{
    BoundingBox, DetectedObject, Detection, DetectionDb, DetectionDetail, DetectionId, EventCount,
    NewDetection, ObjectCount, PurgeReport,
};
pub use waste_type_models::{WasteType, WasteTypeId};
