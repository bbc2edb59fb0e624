//! Job definitions, handlers, and the context handed to a running job.

use crate::error::Result;
use crate::scheduler::trigger::TriggerSpec;
use crate::tracker::{CancellationToken, ExecutionTracker, ProgressCounters};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A registered job. Definitions are created at registration, mutated by
/// pause/resume, and live for the process lifetime.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    pub trigger: TriggerSpec,
    pub paused: bool,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub kwargs: serde_json::Value,
}

impl JobDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger: TriggerSpec,
        kwargs: serde_json::Value,
    ) -> Self {
        let next_run_time = trigger.next_fire(Utc::now());
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            paused: false,
            next_run_time,
            last_run_time: None,
            kwargs,
        }
    }
}

/// Read-only view of a job for listings, enriched with operator metadata.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub trigger: String,
    pub paused: bool,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
}

/// Everything a running job needs: its identity, arguments, and the channel
/// back to the tracker for progress and cooperative cancellation.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub execution_id: Uuid,
    pub kwargs: serde_json::Value,
    pub tracker: ExecutionTracker,
    pub token: CancellationToken,
}

impl JobContext {
    /// Report progress. Returns `Err(CoreError::TaskCancelled)` once
    /// cancellation has been requested; the handler should propagate it.
    pub async fn progress(
        &self,
        progress: u8,
        message: Option<&str>,
        counters: Option<ProgressCounters>,
    ) -> Result<()> {
        self.tracker
            .update_job_progress(&self.job_id, progress, message, counters)
            .await?;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The work a job performs. `Ok(Some(summary))` is persisted as the
/// execution's return value.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<Option<String>>;
}

impl fmt::Debug for dyn JobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobHandler")
    }
}

type HandlerFn =
    dyn Fn(JobContext) -> BoxFuture<'static, Result<Option<String>>> + Send + Sync + 'static;

/// Closure adapter so callers can register async closures without a struct.
pub struct FnJobHandler {
    f: Arc<HandlerFn>,
}

impl FnJobHandler {
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: Fn(JobContext) -> BoxFuture<'static, Result<Option<String>>> + Send + Sync + 'static,
    {
        Arc::new(Self { f: Arc::new(f) })
    }
}

impl fmt::Debug for FnJobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnJobHandler")
    }
}

#[async_trait]
impl JobHandler for FnJobHandler {
    async fn run(&self, ctx: JobContext) -> Result<Option<String>> {
        (self.f)(ctx).await
    }
}
