//! # Execution Tracking
//!
//! Persisted execution history for scheduled jobs: every run gets a row that
//! moves from `running` to exactly one terminal state (`success`, `failed`,
//! `missed`). The tracker also owns cooperative cancellation and the zombie
//! sweep that reaps runs whose process died without finishing the row.
//!
//! ## Architecture
//!
//! * **Models** ([`execution`]): execution rows, audit records, job metadata
//! * **Store** ([`store`]): persistence trait plus the in-memory implementation
//! * **Postgres store** ([`pg_store`]): durable store behind the `postgres` feature
//! * **Tracker** ([`ExecutionTracker`]): the operations the scheduler and API call
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. `cancel_job_execution` flips a flag on the
//! running row and fires the in-process token; the running job observes it on
//! its next `update_job_progress` call, which returns
//! [`CoreError::TaskCancelled`]. A job that never reports progress cannot be
//! cancelled mid-flight, only swept later as a zombie.

pub mod execution;
#[cfg(feature = "postgres")]
pub mod pg_store;
pub mod store;

pub use execution::{
    ExecutionQuery, JobAuditRecord, JobExecution, JobExecutionStats, JobMetadata, LastExecution,
    ProgressCounters,
};
#[cfg(feature = "postgres")]
pub use pg_store::PgExecutionStore;
pub use store::{ExecutionStore, InMemoryExecutionStore};

use crate::constants::{system, ExecutionStatus, JobAction};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared cancellation flag for one execution.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Records execution lifecycle events against an [`ExecutionStore`] and
/// hands out cancellation tokens for in-flight runs.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
    store: Arc<dyn ExecutionStore>,
    cancel_tokens: Arc<DashMap<Uuid, CancellationToken>>,
}

impl ExecutionTracker {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            cancel_tokens: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryExecutionStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Record the start of a run and return its execution row plus a
    /// cancellation token the running job should poll via progress updates.
    pub async fn record_start(
        &self,
        job_id: &str,
        job_name: &str,
        scheduled_time: Option<DateTime<Utc>>,
        is_manual: bool,
    ) -> Result<(JobExecution, CancellationToken)> {
        let execution = JobExecution::start(job_id, job_name, scheduled_time, is_manual);
        let token = CancellationToken::new();
        self.cancel_tokens.insert(execution.id, token.clone());
        self.store.upsert_execution(execution.clone()).await?;
        info!(
            execution_id = %execution.id,
            job_id = job_id,
            is_manual = is_manual,
            "🟢 Execution started"
        );
        Ok((execution, token))
    }

    /// Flip a running row to `success` with its wall-clock duration.
    pub async fn complete_success(
        &self,
        execution_id: Uuid,
        execution_time_secs: f64,
        return_value: Option<String>,
    ) -> Result<()> {
        self.finish(execution_id, ExecutionStatus::Success, |row| {
            row.execution_time_secs = Some(execution_time_secs);
            row.progress = Some(100);
            row.return_value = return_value;
        })
        .await
    }

    /// Flip a running row to `failed` and record the error.
    pub async fn complete_failure(
        &self,
        execution_id: Uuid,
        execution_time_secs: f64,
        error_message: &str,
    ) -> Result<()> {
        let error_message = error_message.to_string();
        self.finish(execution_id, ExecutionStatus::Failed, move |row| {
            row.execution_time_secs = Some(execution_time_secs);
            row.error_message = Some(error_message);
        })
        .await
    }

    async fn finish(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        apply: impl FnOnce(&mut JobExecution),
    ) -> Result<()> {
        let mut row = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| CoreError::ValidationError(format!("unknown execution {execution_id}")))?;
        row.status = status;
        apply(&mut row);
        row.touch();
        self.store.upsert_execution(row).await?;
        self.cancel_tokens.remove(&execution_id);
        info!(execution_id = %execution_id, status = %status, "💾 Execution finished");
        Ok(())
    }

    /// Record a run that was never started because its scheduled time fell
    /// outside the misfire grace window. The row goes straight to `missed`.
    pub async fn record_missed(
        &self,
        job_id: &str,
        job_name: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<JobExecution> {
        let mut execution = JobExecution::start(job_id, job_name, Some(scheduled_time), false);
        execution.status = ExecutionStatus::Missed;
        execution.progress = None;
        execution.touch();
        self.store.upsert_execution(execution.clone()).await?;
        warn!(
            execution_id = %execution.id,
            job_id = job_id,
            scheduled_time = %scheduled_time,
            "⏳ Execution missed"
        );
        Ok(execution)
    }

    /// Update progress on the latest running row for a job, creating one if
    /// the job reports progress without a recorded start.
    ///
    /// Returns [`CoreError::TaskCancelled`] when cancellation has been
    /// requested for the row; the caller is expected to stop and propagate.
    pub async fn update_job_progress(
        &self,
        job_id: &str,
        progress: u8,
        message: Option<&str>,
        counters: Option<ProgressCounters>,
    ) -> Result<JobExecution> {
        let mut row = match self.store.latest_running_for_job(job_id).await? {
            Some(row) => row,
            None => {
                debug!(job_id = job_id, "Progress reported without a running row, creating one");
                let row = JobExecution::start(job_id, job_id, None, false);
                self.store.upsert_execution(row.clone()).await?;
                row
            }
        };

        let token_cancelled = self
            .cancel_tokens
            .get(&row.id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false);
        if row.cancel_requested || token_cancelled {
            return Err(CoreError::TaskCancelled(format!(
                "cancellation requested for job '{job_id}' (execution {})",
                row.id
            )));
        }

        row.progress = Some(progress.min(100));
        row.progress_message = message.map(str::to_string);
        if let Some(counters) = counters {
            row.current_item = counters.current_item;
            row.total_items = counters.total_items;
            row.processed_items = counters.processed_items;
        }
        row.touch();
        self.store.upsert_execution(row.clone()).await?;
        debug!(
            execution_id = %row.id,
            job_id = job_id,
            progress = progress,
            "📋 Progress updated"
        );
        Ok(row)
    }

    /// Request cancellation of a specific execution. Only running rows can be
    /// cancelled; terminal rows are rejected with a validation error.
    pub async fn cancel_job_execution(&self, execution_id: Uuid) -> Result<JobExecution> {
        let mut row = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| CoreError::ValidationError(format!("unknown execution {execution_id}")))?;
        if row.status.is_terminal() {
            return Err(CoreError::ValidationError(format!(
                "execution {execution_id} is already {}, cannot cancel",
                row.status
            )));
        }
        row.cancel_requested = true;
        row.touch();
        self.store.upsert_execution(row.clone()).await?;
        if let Some(token) = self.cancel_tokens.get(&execution_id) {
            token.cancel();
        }
        info!(execution_id = %execution_id, job_id = %row.job_id, "🔄 Cancellation requested");
        Ok(row)
    }

    /// Force a row to `failed` with an operator-supplied reason. Used by the
    /// zombie sweep and by manual cleanup of stuck rows.
    pub async fn mark_execution_as_failed(
        &self,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<bool> {
        let Some(mut row) = self.store.get_execution(execution_id).await? else {
            return Ok(false);
        };
        if row.status.is_terminal() {
            return Ok(false);
        }
        row.status = ExecutionStatus::Failed;
        row.error_message = Some(reason.to_string());
        row.touch();
        self.store.upsert_execution(row).await?;
        self.cancel_tokens.remove(&execution_id);
        Ok(true)
    }

    /// Delete a terminal execution row. Running rows are refused so history
    /// cannot lose an in-flight run.
    pub async fn delete_execution(&self, execution_id: Uuid) -> Result<bool> {
        if let Some(row) = self.store.get_execution(execution_id).await? {
            if !row.status.is_terminal() {
                return Err(CoreError::ValidationError(format!(
                    "execution {execution_id} is still running, cancel it first"
                )));
            }
        }
        self.store.delete_execution(execution_id).await
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Option<JobExecution>> {
        self.store.get_execution(execution_id).await
    }

    /// Page through execution history, newest first.
    pub async fn get_job_executions(
        &self,
        query: &ExecutionQuery,
    ) -> Result<(Vec<JobExecution>, u64)> {
        let rows = self.store.list_executions(query).await?;
        let total = self.store.count_executions(query).await?;
        Ok((rows, total))
    }

    /// Aggregate success/failure statistics over recent history for one job.
    pub async fn get_job_execution_stats(&self, job_id: &str) -> Result<JobExecutionStats> {
        let query = ExecutionQuery {
            limit: 1000,
            ..ExecutionQuery::for_job(job_id)
        };
        let rows = self.store.list_executions(&query).await?;

        let mut stats = JobExecutionStats::default();
        let mut time_sum = 0.0;
        let mut time_count = 0u64;
        for row in &rows {
            stats.total += 1;
            match row.status {
                ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Success => stats.success += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Missed => stats.missed += 1,
            }
            if let Some(secs) = row.execution_time_secs {
                time_sum += secs;
                time_count += 1;
            }
        }
        if time_count > 0 {
            stats.avg_execution_time_secs = Some(time_sum / time_count as f64);
        }
        stats.last_execution = rows.first().map(|row| LastExecution {
            status: row.status,
            started_at: row.started_at,
            execution_time_secs: row.execution_time_secs,
        });
        Ok(stats)
    }

    /// Append a pause/resume/trigger action to the audit log. Audit failures
    /// are logged and swallowed so they never block the action itself.
    pub async fn record_action(&self, job_id: &str, action: JobAction, error: Option<&str>) {
        let record = JobAuditRecord::new(job_id, action, error.map(str::to_string));
        if let Err(e) = self.store.insert_audit(record).await {
            warn!(job_id = job_id, action = %action, error = %e, "❌ Failed to write audit record");
        }
    }

    pub async fn get_job_history(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<JobAuditRecord>, u64)> {
        let rows = self.store.list_audit(Some(job_id), limit, offset).await?;
        let total = self.store.count_audit(Some(job_id)).await?;
        Ok((rows, total))
    }

    pub async fn get_all_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<JobAuditRecord>, u64)> {
        let rows = self.store.list_audit(None, limit, offset).await?;
        let total = self.store.count_audit(None).await?;
        Ok((rows, total))
    }

    pub async fn get_job_metadata(&self, job_id: &str) -> Result<Option<JobMetadata>> {
        self.store.get_metadata(job_id).await
    }

    pub async fn update_job_metadata(
        &self,
        job_id: &str,
        display_name: Option<String>,
        description: Option<String>,
    ) -> Result<JobMetadata> {
        let metadata = JobMetadata {
            job_id: job_id.to_string(),
            display_name,
            description,
            updated_at: Utc::now(),
        };
        self.store.upsert_metadata(metadata.clone()).await?;
        Ok(metadata)
    }

    /// Flip running rows whose last heartbeat is older than `threshold` to
    /// `failed`. Returns the number of rows reaped. Each zombie is flipped at
    /// most once because the sweep only selects rows still in `running`.
    pub async fn sweep_zombies(&self, threshold: Duration) -> Result<u64> {
        let cutoff = Utc::now() - threshold;
        let stale = self.store.stale_running(cutoff, 500).await?;
        let mut reaped = 0u64;
        for row in stale {
            let reason = CoreError::ZombieTimeout(format!(
                "no heartbeat since {} (threshold {} minutes)",
                row.updated_at,
                threshold.num_minutes()
            ));
            if self
                .mark_execution_as_failed(row.id, &reason.to_string())
                .await?
            {
                warn!(
                    execution_id = %row.id,
                    job_id = %row.job_id,
                    last_heartbeat = %row.updated_at,
                    "🧹 Zombie execution reaped"
                );
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped = reaped, "🧹 Zombie sweep complete");
        } else {
            debug!("🧹 Zombie sweep found nothing stale");
        }
        Ok(reaped)
    }

    /// Default sweep threshold from system constants.
    pub fn default_zombie_threshold() -> Duration {
        Duration::minutes(system::DEFAULT_ZOMBIE_THRESHOLD_MINUTES as i64)
    }
}
