use crate::api::rest::detection_controller::DateRangeParams;
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::DailyStat;
use crate::services::dashboard::{DashboardSummary, Period, PeriodStats, StatsRange};
use crate::stats::RebuildReport;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{NaiveDate, Utc};
use log::info;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub stale_hours: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<Period>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Dashboard aggregates
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(dashboard_summary))
        .route("/stats", get(dashboard_stats))
        .route("/daily", get(daily_series))
}

/// Manual daily stats maintenance
pub fn stats_router() -> Router<AppState> {
    Router::new().route("/rebuild", post(rebuild_stats))
}

pub async fn dashboard_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<DashboardSummary>> {
    let stale_hours = query.stale_hours.unwrap_or(state.status.stale_hours);
    let summary = state
        .services
        .dashboard
        .summary(stale_hours, Utc::now())
        .await?;
    Ok(Json(summary))
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<PeriodStats>> {
    let range = StatsRange::from_parts(query.period, query.start_date, query.end_date)?;
    let stats = state
        .services
        .dashboard
        .period_stats(range, Utc::now().date_naive())
        .await?;
    Ok(Json(stats))
}

pub async fn daily_series(
    State(state): State<AppState>,
    Query(range): Query<DateRangeParams>,
) -> ApiResult<Json<Vec<DailyStat>>> {
    let rows = state
        .services
        .dashboard
        .daily_series(range.start_date, range.end_date)
        .await?;
    Ok(Json(rows))
}

pub async fn rebuild_stats(
    State(state): State<AppState>,
    Json(range): Json<DateRangeParams>,
) -> ApiResult<Json<RebuildReport>> {
    info!(
        "Manual daily stats rebuild requested for {}..={}",
        range.start_date, range.end_date
    );
    let report = state
        .services
        .scheduler
        .rebuild_range(range.start_date, range.end_date)
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::tests::state;
    use crate::services::detections::IngestRequest;

    #[tokio::test]
    async fn rebuild_then_read_daily_series() -> anyhow::Result<()> {
        let state = state();
        let now = Utc::now();
        state
            .services
            .detections
            .ingest(IngestRequest::default(), now)
            .await?;
        let today = now.date_naive();

        let Json(report) = rebuild_stats(
            State(state.clone()),
            Json(DateRangeParams {
                start_date: today,
                end_date: today,
            }),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(report.dates_processed, 1);

        // an event without objects adds no detail rows
        let Json(rows) = daily_series(
            State(state),
            Query(DateRangeParams {
                start_date: today,
                end_date: today,
            }),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn half_open_period_range_is_bad_request() {
        let err = dashboard_stats(
            State(state()),
            Query(PeriodQuery {
                start_date: Some(Utc::now().date_naive()),
                ..PeriodQuery::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn summary_of_empty_store() -> anyhow::Result<()> {
        let Json(summary) = dashboard_summary(State(state()), Query(SummaryQuery::default()))
            .await
            .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.total_containers, 0);
        assert!(summary.by_type.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn summary_rejects_out_of_range_stale_hours() {
        for stale_hours in [0, 10_000_000_000_000] {
            let query = SummaryQuery {
                stale_hours: Some(stale_hours),
            };
            let err = dashboard_summary(State(state()), Query(query)).await.unwrap_err();
            assert_eq!(err.status, 400);
        }
    }
}
