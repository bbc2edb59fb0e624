//! # Execution Models
//!
//! Persisted rows owned by the execution tracker: per-run execution records
//! (append-only history), operator audit records, and display metadata.

use crate::constants::{ExecutionStatus, JobAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One run of a job. Created when the job fires (or is manually triggered),
/// mutated by the running handler (progress) and by the completion callback
/// or an operator action; immutable once terminal except via explicit
/// cancel/delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: String,
    pub job_name: String,
    pub status: ExecutionStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    /// When the run started (row creation time).
    pub started_at: DateTime<Utc>,
    /// Last write to this row; the zombie sweep keys off this.
    pub updated_at: DateTime<Utc>,
    pub execution_time_secs: Option<f64>,
    pub progress: Option<u8>,
    pub progress_message: Option<String>,
    pub current_item: Option<String>,
    pub total_items: Option<u64>,
    pub processed_items: Option<u64>,
    pub is_manual: bool,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub return_value: Option<String>,
}

impl JobExecution {
    /// A fresh Running row at progress zero.
    pub fn start(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        scheduled_time: Option<DateTime<Utc>>,
        is_manual: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.into(),
            job_name: job_name.into(),
            status: ExecutionStatus::Running,
            scheduled_time,
            started_at: now,
            updated_at: now,
            execution_time_secs: None,
            progress: Some(0),
            progress_message: None,
            current_item: None,
            total_items: None,
            processed_items: None,
            is_manual,
            cancel_requested: false,
            error_message: None,
            return_value: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Optional item counters attached to a progress update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub current_item: Option<String>,
    pub total_items: Option<u64>,
    pub processed_items: Option<u64>,
}

/// Filter for execution history queries. `limit`/`offset` page through rows
/// newest-first.
#[derive(Debug, Clone)]
pub struct ExecutionQuery {
    pub job_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub is_manual: Option<bool>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ExecutionQuery {
    fn default() -> Self {
        Self {
            job_id: None,
            status: None,
            is_manual: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl ExecutionQuery {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, execution: &JobExecution) -> bool {
        if let Some(job_id) = &self.job_id {
            if &execution.job_id != job_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if execution.status != status {
                return false;
            }
        }
        if let Some(is_manual) = self.is_manual {
            if execution.is_manual != is_manual {
                return false;
            }
        }
        true
    }
}

/// Operator action recorded in the audit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAuditRecord {
    pub id: Uuid,
    pub job_id: String,
    pub action: JobAction,
    /// "success" or "failed" outcome of the action itself.
    pub status: String,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobAuditRecord {
    pub fn new(job_id: impl Into<String>, action: JobAction, error_message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.into(),
            action,
            status: if error_message.is_none() {
                "success".to_string()
            } else {
                "failed".to_string()
            },
            error_message,
            timestamp: Utc::now(),
        }
    }
}

/// Operator-editable display metadata for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated per-job execution statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobExecutionStats {
    pub total: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
    pub missed: u64,
    pub avg_execution_time_secs: Option<f64>,
    pub last_execution: Option<LastExecution>,
}

/// Summary of the most recent execution of a job.
#[derive(Debug, Clone, Serialize)]
pub struct LastExecution {
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub execution_time_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_produces_a_running_row_at_zero_progress() {
        let execution = JobExecution::start("sync_quotes", "Sync Quotes", None, true);
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.progress, Some(0));
        assert!(execution.is_manual);
        assert!(!execution.cancel_requested);
        assert!(execution.execution_time_secs.is_none());
    }

    #[test]
    fn query_filters_compose() {
        let mut execution = JobExecution::start("a", "A", None, false);
        execution.status = ExecutionStatus::Success;

        assert!(ExecutionQuery::default().matches(&execution));
        assert!(ExecutionQuery::for_job("a").matches(&execution));
        assert!(!ExecutionQuery::for_job("b").matches(&execution));

        let manual_only = ExecutionQuery {
            is_manual: Some(true),
            ..ExecutionQuery::default()
        };
        assert!(!manual_only.matches(&execution));

        let failed_only = ExecutionQuery {
            status: Some(ExecutionStatus::Failed),
            ..ExecutionQuery::default()
        };
        assert!(!failed_only.matches(&execution));
    }

    #[test]
    fn audit_record_status_follows_error_presence() {
        let ok = JobAuditRecord::new("a", JobAction::Pause, None);
        assert_eq!(ok.status, "success");
        let failed = JobAuditRecord::new("a", JobAction::Trigger, Some("boom".to_string()));
        assert_eq!(failed.status, "failed");
    }
}
