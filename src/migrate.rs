use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Rows are append-only: keyed by fingerprint, never updated.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS response_cache (
            fingerprint TEXT PRIMARY KEY,
            response_text TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_response_cache_created_at ON response_cache(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
