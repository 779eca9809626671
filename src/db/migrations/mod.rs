use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Migrations compiled into the binary, applied in order.
/// Every script is idempotent so they run on each startup.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_create_alerts.sql", include_str!("sql/001_create_alerts.sql")),
    ("002_add_indexes.sql", include_str!("sql/002_add_indexes.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;

    Ok(())
}
