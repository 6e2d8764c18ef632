use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{Container, ContainerId, NewContainer};
use crate::query::{ContainerFilter, Page, PageRequest, SortDirection, SortKey, SortSpec};
use crate::services::containers::{
    ConnectionTest, ContainerQuery, ContainerView, DeleteOutcome, OfflineEntry, RestoreOutcome,
    ViewParams,
};
use crate::stats::FillStatus;
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Window and threshold overrides; missing values come from `status` config
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub window_days: Option<i64>,
    pub full_threshold: Option<i64>,
    pub medium_threshold: Option<i64>,
    pub stale_hours: Option<i64>,
}

impl ViewQuery {
    fn params(&self, state: &AppState) -> Result<ViewParams> {
        let defaults = &state.status;
        ViewParams::new(
            self.window_days.unwrap_or(defaults.window_days),
            self.full_threshold.unwrap_or(defaults.full_threshold),
            self.medium_threshold.unwrap_or(defaults.medium_threshold),
            self.stale_hours.unwrap_or(defaults.stale_hours),
            Utc::now(),
        )
    }
}

/// Query string of the container list
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub window_days: Option<i64>,
    pub full_threshold: Option<i64>,
    pub medium_threshold: Option<i64>,
    pub stale_hours: Option<i64>,
    pub city: Option<String>,
    pub name: Option<String>,
    pub is_online: Option<bool>,
    pub status: Option<FillStatus>,
    pub sort: Option<SortKey>,
    pub direction: Option<SortDirection>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn view(&self) -> ViewQuery {
        ViewQuery {
            window_days: self.window_days,
            full_threshold: self.full_threshold,
            medium_threshold: self.medium_threshold,
            stale_hours: self.stale_hours,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub stale_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OfflineResponse {
    pub stale_hours: i64,
    pub items: Vec<OfflineEntry>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub container_id: ContainerId,
    pub outcome: DeleteOutcome,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub container_id: ContainerId,
    pub outcome: RestoreOutcome,
}

/// Create container router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_containers).post(register_container))
        .route("/offline", get(offline_containers))
        .route("/:id", get(get_container).delete(delete_container))
        .route("/:id/connection-test", post(test_connection))
        .route("/:id/restore", post(restore_container))
}

pub async fn list_containers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<ContainerView>>> {
    let params = query.view().params(&state)?;
    let page = PageRequest::new(
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(state.query.default_page_size),
        state.query.max_page_size,
    )?;
    let defaults = SortSpec::default();
    let container_query = ContainerQuery {
        filter: ContainerFilter {
            city: query.city,
            name: query.name,
            is_online: query.is_online,
            status: query.status,
        },
        sort: SortSpec {
            key: query.sort.unwrap_or(defaults.key),
            direction: query.direction.unwrap_or(defaults.direction),
        },
    };

    let page = state
        .services
        .containers
        .list(&container_query, &params, page)
        .await?;
    Ok(Json(page))
}

pub async fn register_container(
    State(state): State<AppState>,
    Json(container): Json<NewContainer>,
) -> ApiResult<(StatusCode, Json<Container>)> {
    let created = state.services.containers.register(container).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_container(
    State(state): State<AppState>,
    Path(id): Path<ContainerId>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Json<ContainerView>> {
    let params = query.params(&state)?;
    Ok(Json(state.services.containers.view(id, &params).await?))
}

pub async fn offline_containers(
    State(state): State<AppState>,
    Query(query): Query<StaleQuery>,
) -> ApiResult<Json<OfflineResponse>> {
    let stale_hours = query.stale_hours.unwrap_or(state.status.stale_hours);
    let items = state
        .services
        .containers
        .offline_set(stale_hours, Utc::now())
        .await?;
    Ok(Json(OfflineResponse { stale_hours, items }))
}

pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<ContainerId>,
) -> ApiResult<Json<ConnectionTest>> {
    let result = state
        .services
        .containers
        .test_connection(id, state.status.stale_hours, Utc::now())
        .await?;
    Ok(Json(result))
}

pub async fn delete_container(
    State(state): State<AppState>,
    Path(id): Path<ContainerId>,
) -> ApiResult<Json<DeleteResponse>> {
    let outcome = state.services.containers.delete(id).await?;
    Ok(Json(DeleteResponse {
        container_id: id,
        outcome,
    }))
}

pub async fn restore_container(
    State(state): State<AppState>,
    Path(id): Path<ContainerId>,
) -> ApiResult<Json<RestoreResponse>> {
    let outcome = state.services.containers.restore(id).await?;
    Ok(Json(RestoreResponse {
        container_id: id,
        outcome,
    }))
}
