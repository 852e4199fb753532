//! SQLite-backed response cache.
//!
//! Implements [`ResponseCache`] over the `response_cache` table created by
//! [`migrate`](crate::migrate). Writes use `INSERT OR IGNORE`, so the first
//! response stored for a fingerprint is the one every later reader sees.
//! All database errors surface as [`PulseError::Cache`]; the summarizer
//! treats those as fail-open.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use sprint_pulse_core::models::CacheEntry;
use sprint_pulse_core::traits::ResponseCache;
use sprint_pulse_core::PulseError;

use crate::config::Config;
use crate::db;

pub struct SqliteResponseCache {
    pool: SqlitePool,
}

/// Row counts shown by `pulse cache stats`.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: i64,
    pub by_model: Vec<(String, i64)>,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

fn cache_err(e: sqlx::Error) -> PulseError {
    PulseError::Cache(e.to_string())
}

impl SqliteResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using `[cache].path` and make sure the table exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        crate::migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, MIN(created_at) AS oldest, MAX(created_at) AS newest FROM response_cache",
        )
        .fetch_one(&self.pool)
        .await?;

        let by_model = sqlx::query(
            "SELECT model, COUNT(*) AS n FROM response_cache GROUP BY model ORDER BY n DESC, model",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| (r.get::<String, _>("model"), r.get::<i64, _>("n")))
        .collect();

        Ok(CacheStats {
            entries: row.get("n"),
            by_model,
            oldest: row.get("oldest"),
            newest: row.get("newest"),
        })
    }

    /// Delete every entry; returns the number removed.
    pub async fn clear(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM response_cache")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, fingerprint: &str) -> sprint_pulse_core::Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT fingerprint, response_text, model, created_at FROM response_cache WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(cache_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let ts: i64 = row.get("created_at");
        let created_at = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| PulseError::Cache(format!("invalid created_at {}", ts)))?;
        Ok(Some(CacheEntry {
            fingerprint: row.get("fingerprint"),
            response_text: row.get("response_text"),
            model: row.get("model"),
            created_at,
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> sprint_pulse_core::Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO response_cache (fingerprint, response_text, model, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.fingerprint)
        .bind(&entry.response_text)
        .bind(&entry.model)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(cache_err)?;
        Ok(())
    }
}
