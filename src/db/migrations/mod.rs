use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Schema scripts in apply order. Each one is safe to run again.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_containers.sql",
        include_str!("sql/001_create_containers.sql"),
    ),
    (
        "002_create_waste_types.sql",
        include_str!("sql/002_create_waste_types.sql"),
    ),
    (
        "003_create_detections.sql",
        include_str!("sql/003_create_detections.sql"),
    ),
    (
        "004_create_daily_stats.sql",
        include_str!("sql/004_create_daily_stats.sql"),
    ),
    ("005_add_indexes.sql", include_str!("sql/005_add_indexes.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        pool.execute(*sql).await?;
        info!("Applied migration: {}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_by_prefix() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(MIGRATIONS.iter().all(|(_, sql)| !sql.trim().is_empty()));
    }
}
