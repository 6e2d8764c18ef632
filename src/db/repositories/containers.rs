use crate::db::models::{Container, ContainerId, NewContainer};
use crate::error::Error;
use crate::store::ContainerRegistry;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

const CONTAINER_COLUMNS: &str = "id, name, city, address_detail, latitude, longitude, capacity, \
     is_online, last_connected_at, is_deleted";

/// Containers repository
#[derive(Clone)]
pub struct ContainersRepository {
    pool: Arc<PgPool>,
}

impl ContainersRepository {
    /// Create a new containers repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContainerRegistry for ContainersRepository {
    async fn create(&self, container: NewContainer) -> Result<Container> {
        let result = sqlx::query_as::<_, Container>(&format!(
            r#"
            INSERT INTO containers (
                name, city, address_detail, latitude, longitude, capacity,
                is_online, last_connected_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            CONTAINER_COLUMNS
        ))
        .bind(&container.name)
        .bind(&container.city)
        .bind(&container.address_detail)
        .bind(container.latitude)
        .bind(container.longitude)
        .bind(container.capacity)
        .bind(container.is_online)
        .bind(container.last_connected_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create container: {}", e)))?;

        Ok(result)
    }

    async fn get(&self, id: ContainerId) -> Result<Option<Container>> {
        let result = sqlx::query_as::<_, Container>(&format!(
            "SELECT {} FROM containers WHERE id = $1",
            CONTAINER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get container by ID: {}", e)))?;

        Ok(result)
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Container>> {
        let result = sqlx::query_as::<_, Container>(&format!(
            r#"
            SELECT {}
            FROM containers
            WHERE $1 OR NOT is_deleted
            ORDER BY id
            "#,
            CONTAINER_COLUMNS
        ))
        .bind(include_deleted)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list containers: {}", e)))?;

        Ok(result)
    }

    async fn ensure(&self, id: ContainerId) -> Result<Container> {
        if let Some(existing) = self.get(id).await? {
            return Ok(existing);
        }

        let placeholder = Container::placeholder(id);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to start transaction: {}", e)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO containers (id, name, is_online, is_deleted)
            VALUES ($1, $2, FALSE, FALSE)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(placeholder.id)
        .bind(&placeholder.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to register container: {}", e)))?;

        // explicit ids must not collide with later serial ids
        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('containers', 'id'),
                GREATEST((SELECT MAX(id) FROM containers), 1)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to advance container sequence: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        if inserted.rows_affected() > 0 {
            info!("Registered placeholder container {}", id);
        }

        self.get(id).await?.ok_or_else(|| {
            Error::Internal(format!("container {} vanished after insert", id)).into()
        })
    }

    async fn touch_connection(&self, id: ContainerId, at: DateTime<Utc>) -> Result<Container> {
        let result = sqlx::query_as::<_, Container>(&format!(
            r#"
            UPDATE containers
            SET last_connected_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            CONTAINER_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update connection time: {}", e)))?;

        result.ok_or_else(|| Error::NotFound(format!("container {}", id)).into())
    }

    async fn set_deleted(&self, id: ContainerId, deleted: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE containers
            SET is_deleted = $2
            WHERE id = $1 AND is_deleted <> $2
            "#,
        )
        .bind(id)
        .bind(deleted)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update container: {}", e)))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get(id).await? {
            Some(_) => Ok(false),
            None => Err(Error::NotFound(format!("container {}", id)).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_pool;

    #[tokio::test]
    async fn ensure_registers_placeholder_once() -> Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let repo = ContainersRepository::new(pool);

        let id = 900_000 + (Utc::now().timestamp_subsec_micros() as i64);
        let first = repo.ensure(id).await?;
        let second = repo.ensure(id).await?;
        assert_eq!(first, second);
        assert_eq!(first.name, format!("Container {}", id));

        // later serial ids skip past the explicit one
        let created = repo
            .create(NewContainer {
                name: "After placeholder".into(),
                ..NewContainer::default()
            })
            .await?;
        assert!(created.id > id);
        Ok(())
    }

    #[tokio::test]
    async fn soft_delete_reports_state_changes() -> Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let repo = ContainersRepository::new(pool);
        let container = repo
            .create(NewContainer {
                name: "Deletable".into(),
                city: Some("Seoul".into()),
                capacity: Some(40),
                ..NewContainer::default()
            })
            .await?;

        assert!(repo.set_deleted(container.id, true).await?);
        assert!(!repo.set_deleted(container.id, true).await?);
        assert!(!repo.list(false).await?.iter().any(|c| c.id == container.id));
        assert!(repo.list(true).await?.iter().any(|c| c.id == container.id));
        assert!(repo.set_deleted(container.id, false).await?);

        let err = repo.set_deleted(-1, true).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
        Ok(())
    }
}
