use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{PurgeReport, WasteType, WasteTypeId};
use crate::services::detections::{IngestReceipt, IngestRequest};
use crate::stats::RebuildReport;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Inclusive calendar range
#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    #[serde(flatten)]
    pub purge: PurgeReport,
    pub rebuild: RebuildReport,
}

/// Detection ingestion and raw-log purge
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(ingest_detection).delete(purge_detections))
}

/// Waste type catalog
pub fn waste_type_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_waste_types))
        .route("/:id", delete(delete_waste_type))
}

pub async fn ingest_detection(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestReceipt>)> {
    let receipt = state.services.detections.ingest(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Purge raw events, then rebuild the same dates so daily stats stay consistent
pub async fn purge_detections(
    State(state): State<AppState>,
    Query(range): Query<DateRangeParams>,
) -> ApiResult<Json<PurgeResponse>> {
    let purge = state
        .services
        .detections
        .purge_range(range.start_date, range.end_date)
        .await?;
    let rebuild = state
        .services
        .scheduler
        .rebuild_range(range.start_date, range.end_date)
        .await?;
    info!(
        "Purge of {}..={} removed {} events",
        range.start_date, range.end_date, purge.rows_removed
    );
    Ok(Json(PurgeResponse { purge, rebuild }))
}

pub async fn list_waste_types(State(state): State<AppState>) -> ApiResult<Json<Vec<WasteType>>> {
    Ok(Json(state.services.detections.waste_types().await?))
}

pub async fn delete_waste_type(
    State(state): State<AppState>,
    Path(id): Path<WasteTypeId>,
) -> ApiResult<StatusCode> {
    state.services.detections.delete_waste_type(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::tests::state;
    use crate::db::models::BoundingBox;
    use crate::services::detections::ObjectPayload;

    fn request(objects: &[&str]) -> IngestRequest {
        IngestRequest {
            container_id: Some(1),
            objects: objects
                .iter()
                .map(|name| ObjectPayload {
                    waste_type: name.to_string(),
                    confidence: 0.9,
                    bbox: BoundingBox::default(),
                })
                .collect(),
            ..IngestRequest::default()
        }
    }

    #[tokio::test]
    async fn ingest_then_purge_today() -> anyhow::Result<()> {
        let state = state();
        let (status, Json(receipt)) =
            ingest_detection(State(state.clone()), Json(request(&["Can", "Can"])))
                .await
                .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt.total_objects, 2);

        let today = Utc::now().date_naive();
        let Json(response) = purge_detections(
            State(state.clone()),
            Query(DateRangeParams {
                start_date: today,
                end_date: today,
            }),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(response.purge.rows_removed, 1);
        assert_eq!(response.purge.objects_removed, 2);
        assert_eq!(response.rebuild.dates_processed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_used_waste_type_is_conflict() -> anyhow::Result<()> {
        let state = state();
        ingest_detection(State(state.clone()), Json(request(&["Glass"])))
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;
        let Json(types) = list_waste_types(State(state.clone()))
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;

        let err = delete_waste_type(State(state), Path(types[0].id)).await.unwrap_err();
        assert_eq!(err.status, 409);
        Ok(())
    }

    #[tokio::test]
    async fn reversed_purge_range_is_bad_request() {
        let today = Utc::now().date_naive();
        let err = purge_detections(
            State(state()),
            Query(DateRangeParams {
                start_date: today,
                end_date: today.pred_opt().unwrap(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, 400);
    }
}
