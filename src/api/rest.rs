use crate::config::{ApiConfig, QueryConfig, StatusConfig};
use crate::db::DatabaseService;
use crate::error::Error;
use crate::services::Services;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::info;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub mod container_controller;
pub mod dashboard_controller;
pub mod detection_controller;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Defaults for parameters a request leaves out
    pub status: StatusConfig,
    pub query: QueryConfig,
    /// `None` when running on the in-memory store
    pub database: Option<Arc<DatabaseService>>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRange(_) | Error::InvalidThreshold(_) | Error::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Config(_) | Error::Database(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = Error::from_anyhow(&err) {
            return err.clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: Option<bool>,
    pub scheduler_running: bool,
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await?),
        None => None,
    };
    Ok(Json(HealthResponse {
        status: "ok",
        database,
        scheduler_running: state.services.scheduler.is_running().await,
    }))
}

/// Every route, with state attached
pub fn router(state: AppState) -> Router {
    use std::time::Duration;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health))
        .nest("/api/detections", detection_controller::create_router())
        .nest("/api/waste-types", detection_controller::waste_type_router())
        .nest("/api/containers", container_controller::create_router())
        .nest("/api/dashboard", dashboard_controller::create_router())
        .nest("/api/stats", dashboard_controller::stats_router())
        .with_state(state)
        .layer(cors)
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            state,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let app = router(self.state.clone());

        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Stores;

    pub(crate) fn state() -> AppState {
        let config = Config::default();
        AppState {
            services: Services::new(Stores::in_memory(), config.stats.clone()),
            status: config.status,
            query: config.query,
            database: None,
        }
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (Error::NotFound("x".into()), 404),
            (Error::InvalidRange("x".into()), 400),
            (Error::InvalidThreshold("x".into()), 400),
            (Error::InvalidArgument("x".into()), 400),
            (Error::Conflict("x".into()), 409),
            (Error::Database("x".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(anyhow::Error::from(err)).status, status);
        }
        assert_eq!(ApiError::from(anyhow::anyhow!("boom")).status, 500);
    }

    #[tokio::test]
    async fn router_builds_and_health_reports_memory_store() -> anyhow::Result<()> {
        let state = state();
        let _app = router(state.clone());

        let Json(health) = health(State(state)).await.map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(health.status, "ok");
        assert_eq!(health.database, None);
        assert!(!health.scheduler_running);
        Ok(())
    }
}
