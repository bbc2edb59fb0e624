//! Postgres-backed execution store.
//!
//! Durable variant of [`ExecutionStore`](crate::tracker::store::ExecutionStore)
//! for deployments where execution history must survive restarts. Tables are
//! created on construction; the store is otherwise treated as opaque.

use crate::constants::ExecutionStatus;
use crate::error::Result;
use crate::tracker::execution::{ExecutionQuery, JobAuditRecord, JobExecution, JobMetadata};
use crate::tracker::store::{storage_error, ExecutionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub async fn new(pool: PgPool) -> Result<Self> {
        for ddl in [
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_executions (
                id               UUID PRIMARY KEY,
                job_id           TEXT NOT NULL,
                job_name         TEXT NOT NULL,
                status           TEXT NOT NULL,
                scheduled_time   TIMESTAMPTZ,
                started_at       TIMESTAMPTZ NOT NULL,
                updated_at       TIMESTAMPTZ NOT NULL,
                execution_time_secs DOUBLE PRECISION,
                progress         SMALLINT,
                progress_message TEXT,
                current_item     TEXT,
                total_items      BIGINT,
                processed_items  BIGINT,
                is_manual        BOOLEAN NOT NULL DEFAULT FALSE,
                cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
                error_message    TEXT,
                return_value     TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_audit (
                id            UUID PRIMARY KEY,
                job_id        TEXT NOT NULL,
                action        TEXT NOT NULL,
                status        TEXT NOT NULL,
                error_message TEXT,
                timestamp     TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_metadata (
                job_id       TEXT PRIMARY KEY,
                display_name TEXT,
                description  TEXT,
                updated_at   TIMESTAMPTZ NOT NULL
            )
            "#,
        ] {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| storage_error("creating tracker tables", e))?;
        }
        Ok(Self { pool })
    }

    fn row_to_execution(row: &sqlx::postgres::PgRow) -> Result<JobExecution> {
        let status: String = row
            .try_get("status")
            .map_err(|e| storage_error("reading execution row", e))?;
        Ok(JobExecution {
            id: get(row, "id")?,
            job_id: get(row, "job_id")?,
            job_name: get(row, "job_name")?,
            status: status
                .parse::<ExecutionStatus>()
                .map_err(|e| storage_error("parsing execution status", e))?,
            scheduled_time: get(row, "scheduled_time")?,
            started_at: get(row, "started_at")?,
            updated_at: get(row, "updated_at")?,
            execution_time_secs: get(row, "execution_time_secs")?,
            progress: get::<Option<i16>>(row, "progress")?.map(|p| p as u8),
            progress_message: get(row, "progress_message")?,
            current_item: get(row, "current_item")?,
            total_items: get::<Option<i64>>(row, "total_items")?.map(|v| v as u64),
            processed_items: get::<Option<i64>>(row, "processed_items")?.map(|v| v as u64),
            is_manual: get(row, "is_manual")?,
            cancel_requested: get(row, "cancel_requested")?,
            error_message: get(row, "error_message")?,
            return_value: get(row, "return_value")?,
        })
    }

    fn apply_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a ExecutionQuery) {
        let mut prefix = " WHERE ";
        if let Some(job_id) = &query.job_id {
            builder.push(prefix).push("job_id = ").push_bind(job_id);
            prefix = " AND ";
        }
        if let Some(status) = query.status {
            builder
                .push(prefix)
                .push("status = ")
                .push_bind(status.as_str());
            prefix = " AND ";
        }
        if let Some(is_manual) = query.is_manual {
            builder
                .push(prefix)
                .push("is_manual = ")
                .push_bind(is_manual);
        }
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| storage_error("reading execution row", e))
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn upsert_execution(&self, execution: JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_executions
                (id, job_id, job_name, status, scheduled_time, started_at, updated_at,
                 execution_time_secs, progress, progress_message, current_item,
                 total_items, processed_items, is_manual, cancel_requested,
                 error_message, return_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                execution_time_secs = EXCLUDED.execution_time_secs,
                progress = EXCLUDED.progress,
                progress_message = EXCLUDED.progress_message,
                current_item = EXCLUDED.current_item,
                total_items = EXCLUDED.total_items,
                processed_items = EXCLUDED.processed_items,
                cancel_requested = EXCLUDED.cancel_requested,
                error_message = EXCLUDED.error_message,
                return_value = EXCLUDED.return_value
            "#,
        )
        .bind(execution.id)
        .bind(&execution.job_id)
        .bind(&execution.job_name)
        .bind(execution.status.as_str())
        .bind(execution.scheduled_time)
        .bind(execution.started_at)
        .bind(execution.updated_at)
        .bind(execution.execution_time_secs)
        .bind(execution.progress.map(|p| p as i16))
        .bind(&execution.progress_message)
        .bind(&execution.current_item)
        .bind(execution.total_items.map(|v| v as i64))
        .bind(execution.processed_items.map(|v| v as i64))
        .bind(execution.is_manual)
        .bind(execution.cancel_requested)
        .bind(&execution.error_message)
        .bind(&execution.return_value)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("upserting execution", e))?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<JobExecution>> {
        let row = sqlx::query("SELECT * FROM scheduler_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("fetching execution", e))?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn latest_running_for_job(&self, job_id: &str) -> Result<Option<JobExecution>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM scheduler_executions
            WHERE job_id = $1 AND status = 'running'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("fetching latest running execution", e))?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<JobExecution>> {
        let mut builder = QueryBuilder::new("SELECT * FROM scheduler_executions");
        Self::apply_filters(&mut builder, query);
        builder
            .push(" ORDER BY started_at DESC OFFSET ")
            .push_bind(query.offset as i64)
            .push(" LIMIT ")
            .push_bind(query.limit as i64);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("listing executions", e))?;
        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn count_executions(&self, query: &ExecutionQuery) -> Result<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS n FROM scheduler_executions");
        Self::apply_filters(&mut builder, query);
        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("counting executions", e))?;
        Ok(row
            .try_get::<i64, _>("n")
            .map_err(|e| storage_error("counting executions", e))? as u64)
    }

    async fn delete_execution(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduler_executions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("deleting execution", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn stale_running(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduler_executions
            WHERE status = 'running' AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("selecting stale executions", e))?;
        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn insert_audit(&self, record: JobAuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_audit (id, job_id, action, status, error_message, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.job_id)
        .bind(record.action.as_str())
        .bind(&record.status)
        .bind(&record.error_message)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("inserting audit record", e))?;
        Ok(())
    }

    async fn list_audit(
        &self,
        job_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobAuditRecord>> {
        let mut builder = QueryBuilder::new("SELECT * FROM scheduler_audit");
        if let Some(job_id) = job_id {
            builder.push(" WHERE job_id = ").push_bind(job_id);
        }
        builder
            .push(" ORDER BY timestamp DESC OFFSET ")
            .push_bind(offset as i64)
            .push(" LIMIT ")
            .push_bind(limit as i64);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("listing audit records", e))?;
        rows.iter()
            .map(|row| {
                let action: String = get(row, "action")?;
                Ok(JobAuditRecord {
                    id: get(row, "id")?,
                    job_id: get(row, "job_id")?,
                    action: match action.as_str() {
                        "pause" => crate::constants::JobAction::Pause,
                        "resume" => crate::constants::JobAction::Resume,
                        _ => crate::constants::JobAction::Trigger,
                    },
                    status: get(row, "status")?,
                    error_message: get(row, "error_message")?,
                    timestamp: get(row, "timestamp")?,
                })
            })
            .collect()
    }

    async fn count_audit(&self, job_id: Option<&str>) -> Result<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) AS n FROM scheduler_audit");
        if let Some(job_id) = job_id {
            builder.push(" WHERE job_id = ").push_bind(job_id);
        }
        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("counting audit records", e))?;
        Ok(row
            .try_get::<i64, _>("n")
            .map_err(|e| storage_error("counting audit records", e))? as u64)
    }

    async fn get_metadata(&self, job_id: &str) -> Result<Option<JobMetadata>> {
        let row = sqlx::query("SELECT * FROM scheduler_metadata WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("fetching job metadata", e))?;
        row.map(|row| {
            Ok(JobMetadata {
                job_id: get(&row, "job_id")?,
                display_name: get(&row, "display_name")?,
                description: get(&row, "description")?,
                updated_at: get(&row, "updated_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_metadata(&self, metadata: JobMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_metadata (job_id, display_name, description, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, scheduler_metadata.display_name),
                description = COALESCE(EXCLUDED.description, scheduler_metadata.description),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&metadata.job_id)
        .bind(&metadata.display_name)
        .bind(&metadata.description)
        .bind(metadata.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("upserting job metadata", e))?;
        Ok(())
    }
}
