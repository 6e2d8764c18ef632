use crate::db::models::{CityKey, DailyStat, DailyStatDb};
use crate::error::Error;
use crate::store::DailyStatStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use std::sync::Arc;

/// Daily statistics repository
#[derive(Clone)]
pub struct DailyStatsRepository {
    pool: Arc<PgPool>,
}

impl DailyStatsRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyStatStore for DailyStatsRepository {
    async fn upsert(&self, stat: &DailyStat) -> Result<()> {
        let row = DailyStatDb::from(stat.clone());
        sqlx::query(
            r#"
            INSERT INTO daily_stats (stats_date, city, waste_type, detection_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (stats_date, city, waste_type)
            DO UPDATE SET detection_count = EXCLUDED.detection_count
            "#,
        )
        .bind(row.stats_date)
        .bind(&row.city)
        .bind(&row.waste_type)
        .bind(row.detection_count)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to upsert daily stat: {}", e)))?;

        Ok(())
    }

    async fn retain(&self, date: NaiveDate, keep: &[(CityKey, String)]) -> Result<u64> {
        let cities: Vec<String> = keep.iter().map(|(city, _)| city.to_string()).collect();
        let waste_types: Vec<String> = keep.iter().map(|(_, w)| w.clone()).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM daily_stats
            WHERE stats_date = $1
              AND (city, waste_type) NOT IN (
                  SELECT * FROM UNNEST($2::text[], $3::text[])
              )
            "#,
        )
        .bind(date)
        .bind(&cities)
        .bind(&waste_types)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to remove stale daily stats: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyStat>> {
        let rows = sqlx::query_as::<_, DailyStatDb>(
            r#"
            SELECT stats_date, city, waste_type, detection_count
            FROM daily_stats
            WHERE stats_date BETWEEN $1 AND $2
            ORDER BY stats_date, city, waste_type
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get daily stats: {}", e)))?;

        Ok(rows.into_iter().map(DailyStat::from).collect())
    }

    async fn purge(&self, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_stats WHERE stats_date BETWEEN $1 AND $2")
            .bind(start)
            .bind(end)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to purge daily stats: {}", e)))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_pool;

    fn stat(date: NaiveDate, city: CityKey, count: i64) -> DailyStat {
        DailyStat {
            stats_date: date,
            city,
            waste_type: "Plastic".into(),
            detection_count: count,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_and_retain_drops_stale_keys() -> Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let repo = DailyStatsRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        repo.purge(date, date).await?;

        repo.upsert(&stat(date, CityKey::from("Seoul"), 1)).await?;
        repo.upsert(&stat(date, CityKey::from("Seoul"), 4)).await?;
        repo.upsert(&stat(date, CityKey::Unknown, 2)).await?;

        let rows = repo.range(date, date).await?;
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&stat(date, CityKey::from("Seoul"), 4)));
        assert!(rows.contains(&stat(date, CityKey::Unknown, 2)));

        let removed = repo
            .retain(date, &[(CityKey::Unknown, "Plastic".to_string())])
            .await?;
        assert_eq!(removed, 1);
        assert_eq!(repo.retain(date, &[]).await?, 1);
        assert!(repo.range(date, date).await?.is_empty());
        Ok(())
    }
}
