use crate::db::models::{WasteType, WasteTypeId};
use crate::error::Error;
use crate::store::WasteTypeCatalog;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Waste type catalog repository
#[derive(Clone)]
pub struct WasteTypesRepository {
    pool: Arc<PgPool>,
}

impl WasteTypesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WasteTypeCatalog for WasteTypesRepository {
    async fn resolve(&self, name: &str) -> Result<WasteType> {
        // the no-op update makes RETURNING yield the existing row
        let result = sqlx::query_as::<_, WasteType>(
            r#"
            INSERT INTO waste_types (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to resolve waste type: {}", e)))?;

        Ok(result)
    }

    async fn list(&self) -> Result<Vec<WasteType>> {
        let result = sqlx::query_as::<_, WasteType>("SELECT id, name FROM waste_types ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list waste types: {}", e)))?;

        Ok(result)
    }

    async fn delete(&self, id: WasteTypeId) -> Result<()> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM detection_details WHERE waste_type_id = $1)",
        )
        .bind(id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check waste type usage: {}", e)))?;

        if in_use {
            return Err(Error::Conflict(format!("waste type {} is in_use", id)).into());
        }

        let result = sqlx::query("DELETE FROM waste_types WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| match e {
                // a detail row arrived between the check and the delete
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    Error::Conflict(format!("waste type {} is in_use", id))
                }
                e => Error::Database(format!("Failed to delete waste type: {}", e)),
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("waste type {}", id)).into());
        }
        Ok(())
    }
}
