use crate::db::models::{
    ContainerId, ContainerRef, Detection, DetectionDb, EventCount, NewDetection, ObjectCount,
    PurgeReport,
};
use crate::error::Error;
use crate::stats::window::TimeWindow;
use crate::store::EventLog;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

/// Shared WHERE clause: `$1`/`$2` optional window bounds, `$3` whether to
/// filter by container, `$4` the container id (NULL for the unknown bucket)
const WINDOW_FILTER: &str = r#"
    ($1::timestamptz IS NULL OR d.detected_at >= $1)
    AND ($2::timestamptz IS NULL OR d.detected_at < $2)
    AND (NOT $3 OR d.container_id IS NOT DISTINCT FROM $4)
"#;

#[derive(sqlx::FromRow)]
struct ObjectCountRow {
    container_id: Option<ContainerId>,
    waste_type: String,
    count: i64,
}

#[derive(sqlx::FromRow)]
struct EventCountRow {
    container_id: Option<ContainerId>,
    events: i64,
}

/// Detection event log repository
#[derive(Clone)]
pub struct DetectionsRepository {
    pool: Arc<PgPool>,
}

impl DetectionsRepository {
    /// Create a new detections repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn container_filter(container: Option<ContainerRef>) -> (bool, Option<ContainerId>) {
    match container {
        Some(container) => (true, container.id()),
        None => (false, None),
    }
}

#[async_trait]
impl EventLog for DetectionsRepository {
    async fn insert(&self, detection: NewDetection) -> Result<Detection> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to start transaction: {}", e)))?;

        let row = sqlx::query_as::<_, DetectionDb>(
            r#"
            INSERT INTO detections (container_id, image_name, image_path, detected_at, object_count)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, container_id, image_name, image_path, detected_at, object_count
            "#,
        )
        .bind(detection.container.id())
        .bind(&detection.image_name)
        .bind(&detection.image_path)
        .bind(detection.detected_at)
        .bind(detection.objects.len() as i32)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to create detection: {}", e)))?;

        for object in &detection.objects {
            let waste_type_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO waste_types (name)
                VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(&object.waste_type)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to resolve waste type: {}", e)))?;

            sqlx::query(
                r#"
                INSERT INTO detection_details (detection_id, waste_type_id, confidence, bbox)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(row.id)
            .bind(waste_type_id)
            .bind(object.confidence)
            .bind(Json(object.bbox))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to create detection detail: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit detection: {}", e)))?;

        debug!(
            "Stored detection {} with {} objects",
            row.id,
            detection.objects.len()
        );
        Ok(row.into())
    }

    async fn object_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<ObjectCount>> {
        let (filtered, container_id) = container_filter(container);
        let rows = sqlx::query_as::<_, ObjectCountRow>(&format!(
            r#"
            SELECT d.container_id, w.name AS waste_type, COUNT(dd.id) AS count
            FROM detection_details dd
            JOIN detections d ON d.id = dd.detection_id
            JOIN waste_types w ON w.id = dd.waste_type_id
            WHERE {}
            GROUP BY d.container_id, w.name
            "#,
            WINDOW_FILTER
        ))
        .bind(window.start())
        .bind(window.end())
        .bind(filtered)
        .bind(container_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count detection objects: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| ObjectCount {
                container: ContainerRef::from(row.container_id),
                waste_type: row.waste_type,
                count: row.count,
            })
            .collect())
    }

    async fn event_counts(
        &self,
        window: &TimeWindow,
        container: Option<ContainerRef>,
    ) -> Result<Vec<EventCount>> {
        let (filtered, container_id) = container_filter(container);
        let rows = sqlx::query_as::<_, EventCountRow>(&format!(
            r#"
            SELECT d.container_id, COUNT(d.id) AS events
            FROM detections d
            WHERE {}
            GROUP BY d.container_id
            "#,
            WINDOW_FILTER
        ))
        .bind(window.start())
        .bind(window.end())
        .bind(filtered)
        .bind(container_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count detections: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| EventCount {
                container: ContainerRef::from(row.container_id),
                events: row.events,
            })
            .collect())
    }

    async fn purge(&self, window: &TimeWindow) -> Result<PurgeReport> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to start transaction: {}", e)))?;

        let objects_removed: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(dd.id)
            FROM detection_details dd
            JOIN detections d ON d.id = dd.detection_id
            WHERE {}
            "#,
            WINDOW_FILTER
        ))
        .bind(window.start())
        .bind(window.end())
        .bind(false)
        .bind(None::<ContainerId>)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to count purged objects: {}", e)))?;

        // detail rows go with their event (ON DELETE CASCADE)
        let result = sqlx::query(&format!(
            "DELETE FROM detections d WHERE {}",
            WINDOW_FILTER
        ))
        .bind(window.start())
        .bind(window.end())
        .bind(false)
        .bind(None::<ContainerId>)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to purge detections: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit purge: {}", e)))?;

        Ok(PurgeReport {
            rows_removed: result.rows_affected(),
            objects_removed: objects_removed.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BoundingBox, DetectedObject, NewContainer};
    use crate::db::repositories::{test_pool, ContainersRepository};
    use crate::store::ContainerRegistry;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn insert_count_and_purge() -> Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let containers = ContainersRepository::new(pool.clone());
        let repo = DetectionsRepository::new(pool);
        let container = containers
            .create(NewContainer {
                name: "Repo test".into(),
                ..NewContainer::default()
            })
            .await?;

        // far in the past so other runs don't overlap
        let at = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap()
            + Duration::seconds(container.id);
        let stored = repo
            .insert(NewDetection {
                container: ContainerRef::Known(container.id),
                image_name: Some("a.jpg".into()),
                image_path: None,
                detected_at: at,
                objects: vec![
                    DetectedObject {
                        waste_type: "Plastic".into(),
                        confidence: 0.9,
                        bbox: BoundingBox::default(),
                    },
                    DetectedObject {
                        waste_type: "Plastic".into(),
                        confidence: 0.8,
                        bbox: BoundingBox::default(),
                    },
                ],
            })
            .await?;
        assert_eq!(stored.object_count, 2);

        let window = TimeWindow::between(at, at + Duration::seconds(1))?;
        let scope = Some(ContainerRef::Known(container.id));
        let counts = repo.object_counts(&window, scope).await?;
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].count, 2);
        assert_eq!(repo.event_counts(&window, scope).await?[0].events, 1);

        let report = repo.purge(&window).await?;
        assert_eq!(report.rows_removed, 1);
        assert_eq!(report.objects_removed, 2);
        assert!(repo.object_counts(&window, scope).await?.is_empty());
        Ok(())
    }
}
