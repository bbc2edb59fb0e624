//! Postgres document-store cache backend.
//!
//! The durable tier. Rows carry an `expires_at` column; expired rows are
//! purged server-side on read, so loads never observe a stale entry and the
//! manager needs no client-side TTL re-check.

use crate::cache::backend::{BackendStats, CacheBackend, CacheEntry, CacheMetadata};
use crate::cache::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Create the backend and ensure its table exists. The store is treated
    /// as opaque; no external migration tooling is required.
    pub async fn new(pool: PgPool) -> Result<Self, CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_data_cache (
                key         TEXT PRIMARY KEY,
                payload     JSONB NOT NULL,
                symbol      TEXT NOT NULL,
                start_date  TEXT NOT NULL,
                end_date    TEXT NOT NULL,
                data_source TEXT NOT NULL,
                data_type   TEXT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                ttl_seconds BIGINT NOT NULL,
                expires_at  TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<CacheEntry, CacheError> {
        Ok(CacheEntry {
            key: row.try_get::<String, _>("key")?,
            payload: row.try_get::<serde_json::Value, _>("payload")?,
            metadata: CacheMetadata {
                symbol: row.try_get::<String, _>("symbol")?,
                start_date: row.try_get::<String, _>("start_date")?,
                end_date: row.try_get::<String, _>("end_date")?,
                data_source: row.try_get::<String, _>("data_source")?,
                data_type: row.try_get::<String, _>("data_type")?,
            },
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            ttl_seconds: row.try_get::<i64, _>("ttl_seconds")? as u64,
            backend_tag: "postgres".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for PostgresBackend {
    fn tag(&self) -> &'static str {
        "postgres"
    }

    fn native_expiry(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn save(&self, entry: CacheEntry) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO market_data_cache
                (key, payload, symbol, start_date, end_date, data_source,
                 data_type, created_at, ttl_seconds, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (key) DO UPDATE SET
                payload = EXCLUDED.payload,
                created_at = EXCLUDED.created_at,
                ttl_seconds = EXCLUDED.ttl_seconds,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.payload)
        .bind(&entry.metadata.symbol)
        .bind(&entry.metadata.start_date)
        .bind(&entry.metadata.end_date)
        .bind(&entry.metadata.data_source)
        .bind(&entry.metadata.data_type)
        .bind(entry.created_at)
        .bind(entry.ttl_seconds as i64)
        .bind(entry.expires_at())
        .execute(&self.pool)
        .await?;
        debug!(key = %entry.key, "Postgres cache save");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        // Purge the row server-side if it expired, then read what remains.
        sqlx::query("DELETE FROM market_data_cache WHERE key = $1 AND expires_at <= NOW()")
            .bind(key)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT * FROM market_data_cache WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM market_data_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let rows = sqlx::query(
            r#"
            SELECT data_type,
                   COUNT(*) AS entry_count,
                   COALESCE(SUM(pg_column_size(payload)), 0) AS total_bytes
            FROM market_data_cache
            WHERE expires_at > NOW()
            GROUP BY data_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = BackendStats::default();
        for row in rows {
            let data_type = row.try_get::<String, _>("data_type")?;
            let count = row.try_get::<i64, _>("entry_count")? as u64;
            let bytes = row.try_get::<i64, _>("total_bytes")? as u64;
            stats.entries += count;
            stats.bytes += bytes;
            stats.per_category.insert(data_type, count);
        }
        Ok(stats)
    }

    async fn clear_older_than(&self, age_days: u32) -> Result<u64, CacheError> {
        let result = if age_days == 0 {
            sqlx::query("DELETE FROM market_data_cache")
                .execute(&self.pool)
                .await?
        } else {
            let cutoff = Utc::now() - chrono::Duration::days(age_days as i64);
            sqlx::query("DELETE FROM market_data_cache WHERE created_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected())
    }
}
