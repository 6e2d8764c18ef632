use crate::store::Stores;
use sqlx::PgPool;
use std::sync::Arc;

pub mod containers;
pub mod daily_stats;
pub mod detections;
pub mod waste_types;

pub use containers::ContainersRepository;
pub use daily_stats::DailyStatsRepository;
pub use detections::DetectionsRepository;
pub use waste_types::WasteTypesRepository;

/// Every store trait backed by one PostgreSQL pool
pub fn stores(pool: Arc<PgPool>) -> Stores {
    Stores {
        events: Arc::new(DetectionsRepository::new(pool.clone())),
        containers: Arc::new(ContainersRepository::new(pool.clone())),
        catalog: Arc::new(WasteTypesRepository::new(pool.clone())),
        stats: Arc::new(DailyStatsRepository::new(pool)),
    }
}

/// Migrated pool for `TEST_DATABASE_URL`, or `None` to skip the test
#[cfg(test)]
pub(crate) async fn test_pool() -> anyhow::Result<Option<Arc<PgPool>>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    crate::db::migrations::run_migrations(&pool).await?;
    Ok(Some(Arc::new(pool)))
}
