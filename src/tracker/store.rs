//! # Execution Store
//!
//! Storage-agnostic persistence for execution rows, audit records, and job
//! metadata. Writes are idempotent upserts keyed by execution id, so
//! near-simultaneous writes from the handler and the completion callback can
//! never create a duplicate "latest running row".

use crate::error::{CoreError, Result};
use crate::tracker::execution::{ExecutionQuery, JobAuditRecord, JobExecution, JobMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use uuid::Uuid;

#[async_trait]
pub trait ExecutionStore: Send + Sync + fmt::Debug {
    /// Insert or replace the row with this execution's id.
    async fn upsert_execution(&self, execution: JobExecution) -> Result<()>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<JobExecution>>;

    /// Newest Running row for a job, if any.
    async fn latest_running_for_job(&self, job_id: &str) -> Result<Option<JobExecution>>;

    /// Rows matching the filter, newest-first.
    async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<JobExecution>>;

    async fn count_executions(&self, query: &ExecutionQuery) -> Result<u64>;

    async fn delete_execution(&self, id: Uuid) -> Result<bool>;

    /// Running rows whose `updated_at` is older than the cutoff.
    async fn stale_running(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobExecution>>;

    async fn insert_audit(&self, record: JobAuditRecord) -> Result<()>;

    async fn list_audit(
        &self,
        job_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobAuditRecord>>;

    async fn count_audit(&self, job_id: Option<&str>) -> Result<u64>;

    async fn get_metadata(&self, job_id: &str) -> Result<Option<JobMetadata>>;

    async fn upsert_metadata(&self, metadata: JobMetadata) -> Result<()>;
}

/// In-memory store used in tests and single-process deployments without a
/// database.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<Uuid, JobExecution>,
    audit: RwLock<Vec<JobAuditRecord>>,
    metadata: DashMap<String, JobMetadata>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_matches(&self, query: &ExecutionQuery) -> Vec<JobExecution> {
        let mut rows: Vec<JobExecution> = self
            .executions
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn upsert_execution(&self, execution: JobExecution) -> Result<()> {
        self.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<JobExecution>> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn latest_running_for_job(&self, job_id: &str) -> Result<Option<JobExecution>> {
        let query = ExecutionQuery {
            job_id: Some(job_id.to_string()),
            status: Some(crate::constants::ExecutionStatus::Running),
            ..ExecutionQuery::default()
        };
        Ok(self.sorted_matches(&query).into_iter().next())
    }

    async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<JobExecution>> {
        Ok(self
            .sorted_matches(query)
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count_executions(&self, query: &ExecutionQuery) -> Result<u64> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .count() as u64)
    }

    async fn delete_execution(&self, id: Uuid) -> Result<bool> {
        Ok(self.executions.remove(&id).is_some())
    }

    async fn stale_running(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| {
                entry.status == crate::constants::ExecutionStatus::Running
                    && entry.updated_at < cutoff
            })
            .map(|entry| entry.value().clone())
            .take(limit)
            .collect())
    }

    async fn insert_audit(&self, record: JobAuditRecord) -> Result<()> {
        self.audit.write().push(record);
        Ok(())
    }

    async fn list_audit(
        &self,
        job_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobAuditRecord>> {
        let audit = self.audit.read();
        let mut rows: Vec<JobAuditRecord> = audit
            .iter()
            .filter(|r| job_id.map_or(true, |id| r.job_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_audit(&self, job_id: Option<&str>) -> Result<u64> {
        let audit = self.audit.read();
        Ok(audit
            .iter()
            .filter(|r| job_id.map_or(true, |id| r.job_id == id))
            .count() as u64)
    }

    async fn get_metadata(&self, job_id: &str) -> Result<Option<JobMetadata>> {
        Ok(self.metadata.get(job_id).map(|m| m.clone()))
    }

    async fn upsert_metadata(&self, metadata: JobMetadata) -> Result<()> {
        self.metadata.insert(metadata.job_id.clone(), metadata);
        Ok(())
    }
}

/// Convenience conversion for storage-layer failures.
pub(crate) fn storage_error(context: &str, err: impl fmt::Display) -> CoreError {
    CoreError::StorageError(format!("{context}: {err}"))
}
