use crate::config::DatabaseConfig;
use crate::error::Error;
use crate::store::Stores;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub mod migrations;
pub mod models;
pub mod repositories;

/// Time to wait for a free pooled connection before failing a request
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the Postgres pool behind the detection log, container registry,
/// waste type catalog and daily stats table.
///
/// Every repository handed out by [`DatabaseService::stores`] shares this pool,
/// so ingest, aggregation and the API see the same database.
pub struct DatabaseService {
    pub pool: Arc<PgPool>,
}

impl DatabaseService {
    /// Connect to `database.url` and, with `auto_migrate`, apply the embedded schema
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            "Connecting to detection database (max {} connections)",
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        let service = Self {
            pool: Arc::new(pool),
        };

        if config.auto_migrate {
            service.run_migrations().await?;
        } else {
            info!("auto_migrate is off; expecting the schema to exist");
        }

        Ok(service)
    }

    /// Create the containers, waste type, detection and daily stats tables if missing
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Detection schema is up to date");
        Ok(())
    }

    /// Reported by `/health`; a failed probe is `false`, not an error
    pub async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&*self.pool).await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Postgres-backed store handles for the services and scheduler
    pub fn stores(&self) -> Stores {
        repositories::stores(self.pool.clone())
    }
}
