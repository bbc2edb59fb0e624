//! The scheduler service: job registry, dispatch loop, and execution wrapper.

use crate::config::SchedulerConfig;
use crate::constants::{system, JobAction};
use crate::error::{CoreError, Result};
use crate::logging::{log_error, log_job_operation};
use crate::scheduler::job::{FnJobHandler, JobContext, JobDefinition, JobHandler, JobInfo};
use crate::scheduler::trigger::TriggerSpec;
use crate::tracker::{ExecutionQuery, ExecutionTracker};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct JobEntry {
    definition: JobDefinition,
    handler: Arc<dyn JobHandler>,
}

/// Counts reported by [`Scheduler::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub total_jobs: u64,
    pub paused_jobs: u64,
    pub running_executions: u64,
    pub scheduler_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub healthy: bool,
    pub scheduler_running: bool,
    pub store_reachable: bool,
}

/// Drives registered jobs from a single tick loop. Fired jobs run as spawned
/// tasks so a slow handler never blocks dispatch.
///
/// Concurrent runs of the same job id are not prevented; jobs needing
/// exclusive runs must take their own lease.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    tracker: ExecutionTracker,
    jobs: Arc<DashMap<String, Arc<RwLock<JobEntry>>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(tracker: ExecutionTracker, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            tracker,
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            loop_handle: parking_lot::Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// Register a job. A duplicate id replaces the existing definition and
    /// handler; the initial next run is computed from the trigger.
    pub fn add_job(
        &self,
        trigger: TriggerSpec,
        handler: Arc<dyn JobHandler>,
        id: &str,
        name: &str,
        kwargs: serde_json::Value,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(CoreError::ValidationError(
                "job id must not be empty".to_string(),
            ));
        }
        let definition = JobDefinition::new(id, name, trigger, kwargs);
        let next_run = definition.next_run_time;
        let replaced = self
            .jobs
            .insert(
                id.to_string(),
                Arc::new(RwLock::new(JobEntry {
                    definition,
                    handler,
                })),
            )
            .is_some();
        info!(
            job_id = id,
            replaced = replaced,
            next_run = ?next_run,
            "🔧 Job registered"
        );
        Ok(())
    }

    /// Pause a job: it stays registered but stops firing. Returns false for
    /// an unknown id.
    pub async fn pause_job(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.jobs.get(id).map(|e| e.value().clone()) else {
            return Ok(false);
        };
        {
            let mut entry = entry.write().await;
            entry.definition.paused = true;
            entry.definition.next_run_time = None;
        }
        self.tracker.record_action(id, JobAction::Pause, None).await;
        info!(job_id = id, "⏸ Job paused");
        Ok(true)
    }

    /// Resume a paused job, recomputing the next fire from its trigger.
    pub async fn resume_job(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.jobs.get(id).map(|e| e.value().clone()) else {
            return Ok(false);
        };
        let next_run = {
            let mut entry = entry.write().await;
            entry.definition.paused = false;
            entry.definition.next_run_time = entry.definition.trigger.next_fire(Utc::now());
            entry.definition.next_run_time
        };
        self.tracker.record_action(id, JobAction::Resume, None).await;
        info!(job_id = id, next_run = ?next_run, "▶ Job resumed");
        Ok(true)
    }

    /// Run a job once, immediately, regardless of its paused state. The
    /// definition's schedule and paused flag are left untouched; the run is
    /// recorded with `is_manual = true`.
    pub async fn trigger_job(&self, id: &str, kwargs: Option<serde_json::Value>) -> Result<bool> {
        let Some(entry) = self.jobs.get(id).map(|e| e.value().clone()) else {
            self.tracker
                .record_action(id, JobAction::Trigger, Some("job not found"))
                .await;
            return Ok(false);
        };
        let (handler, name, job_kwargs) = {
            let entry = entry.read().await;
            (
                entry.handler.clone(),
                entry.definition.name.clone(),
                entry.definition.kwargs.clone(),
            )
        };
        let kwargs = kwargs.unwrap_or(job_kwargs);
        let tracker = self.tracker.clone();
        let job_id = id.to_string();
        tokio::spawn(async move {
            Self::run_execution(tracker, handler, job_id, name, kwargs, None, true).await;
        });
        self.tracker.record_action(id, JobAction::Trigger, None).await;
        Ok(true)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobInfo>> {
        let Some(entry) = self.jobs.get(id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let metadata = self.tracker.get_job_metadata(id).await?;
        let entry = entry.read().await;
        Ok(Some(JobInfo {
            id: entry.definition.id.clone(),
            name: entry.definition.name.clone(),
            display_name: metadata.as_ref().and_then(|m| m.display_name.clone()),
            description: metadata.and_then(|m| m.description),
            trigger: entry.definition.trigger.to_string(),
            paused: entry.definition.paused,
            next_run_time: entry.definition.next_run_time,
            last_run_time: entry.definition.last_run_time,
        }))
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let ids: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(info) = self.get_job(&id).await? {
                jobs.push(info);
            }
        }
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    pub async fn get_stats(&self) -> Result<SchedulerStats> {
        let mut paused = 0u64;
        for entry in self.jobs.iter() {
            if entry.value().read().await.definition.paused {
                paused += 1;
            }
        }
        let running_executions = self
            .tracker
            .store()
            .count_executions(&ExecutionQuery {
                status: Some(crate::constants::ExecutionStatus::Running),
                ..ExecutionQuery::default()
            })
            .await?;
        Ok(SchedulerStats {
            total_jobs: self.jobs.len() as u64,
            paused_jobs: paused,
            running_executions,
            scheduler_running: self.running.load(Ordering::SeqCst),
        })
    }

    pub async fn health_check(&self) -> SchedulerHealth {
        let scheduler_running = self.running.load(Ordering::SeqCst);
        let store_reachable = self
            .tracker
            .store()
            .count_executions(&ExecutionQuery::default())
            .await
            .is_ok();
        SchedulerHealth {
            healthy: scheduler_running && store_reachable,
            scheduler_running,
            store_reachable,
        }
    }

    /// Start the dispatch loop. Registers the built-in zombie sweep job on
    /// first start. Idempotent: a second call on a running scheduler is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.register_zombie_sweep()?;

        let jobs = self.jobs.clone();
        let tracker = self.tracker.clone();
        let tick = std::time::Duration::from_millis(self.config.tick_interval_ms.max(1));
        let grace = Duration::seconds(self.config.misfire_grace_seconds as i64);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("🟢 Scheduler dispatch loop started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::dispatch_due(&jobs, &tracker, grace).await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("🔴 Scheduler dispatch loop stopping");
                        break;
                    }
                }
            }
        });
        *self.loop_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop dispatching. In-flight handler tasks are left to finish; their
    /// completion callbacks still write terminal rows.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatch loop did not shut down cleanly");
            }
        }
        info!("🔴 Scheduler shut down");
    }

    fn register_zombie_sweep(&self) -> Result<()> {
        if self.jobs.contains_key(system::ZOMBIE_SWEEP_JOB_ID) {
            return Ok(());
        }
        let tracker = self.tracker.clone();
        let threshold = Duration::minutes(self.config.zombie_threshold_minutes as i64);
        let handler = FnJobHandler::new(move |_ctx| {
            let tracker = tracker.clone();
            Box::pin(async move {
                let reaped = tracker.sweep_zombies(threshold).await?;
                Ok(Some(format!("reaped {reaped} zombie executions")))
            })
        });
        self.add_job(
            TriggerSpec::interval_secs(self.config.zombie_sweep_interval_seconds)?,
            handler,
            system::ZOMBIE_SWEEP_JOB_ID,
            "Zombie execution sweep",
            serde_json::json!({}),
        )
    }

    /// One dispatch pass: fire every due job, record misfires as Missed.
    async fn dispatch_due(
        jobs: &DashMap<String, Arc<RwLock<JobEntry>>>,
        tracker: &ExecutionTracker,
        misfire_grace: Duration,
    ) {
        let now = Utc::now();
        // Snapshot so no dashmap ref is held across an await.
        let snapshot: Vec<Arc<RwLock<JobEntry>>> =
            jobs.iter().map(|e| e.value().clone()).collect();

        for entry in snapshot {
            let fire = {
                let mut entry = entry.write().await;
                let Some(scheduled) = entry.definition.next_run_time else {
                    continue;
                };
                if entry.definition.paused || scheduled > now {
                    continue;
                }
                // Advance from `now`, not `scheduled`: a long-overdue job gets
                // one fire (or one Missed row), not a backlog of catch-up runs.
                entry.definition.next_run_time = entry.definition.trigger.next_fire(now);
                if now - scheduled > misfire_grace {
                    Some((entry.definition.clone(), scheduled, true))
                } else {
                    entry.definition.last_run_time = Some(scheduled);
                    Some((entry.definition.clone(), scheduled, false))
                }
            };

            let Some((definition, scheduled, missed)) = fire else {
                continue;
            };
            if missed {
                if let Err(e) = tracker
                    .record_missed(&definition.id, &definition.name, scheduled)
                    .await
                {
                    error!(job_id = %definition.id, error = %e, "❌ Failed to record missed run");
                }
                continue;
            }

            debug!(job_id = %definition.id, scheduled = %scheduled, "🔄 Dispatching job");
            let handler = {
                let entry = entry.read().await;
                entry.handler.clone()
            };
            let tracker = tracker.clone();
            tokio::spawn(async move {
                Self::run_execution(
                    tracker,
                    handler,
                    definition.id,
                    definition.name,
                    definition.kwargs,
                    Some(scheduled),
                    false,
                )
                .await;
            });
        }
    }

    /// Record a Running row, invoke the handler, and write the terminal state.
    /// Handler errors become Failed rows and never propagate.
    async fn run_execution(
        tracker: ExecutionTracker,
        handler: Arc<dyn JobHandler>,
        job_id: String,
        job_name: String,
        kwargs: serde_json::Value,
        scheduled_time: Option<DateTime<Utc>>,
        is_manual: bool,
    ) {
        let (execution, token) = match tracker
            .record_start(&job_id, &job_name, scheduled_time, is_manual)
            .await
        {
            Ok(started) => started,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "❌ Could not record execution start");
                return;
            }
        };

        let ctx = JobContext {
            job_id: job_id.clone(),
            execution_id: execution.id,
            kwargs,
            tracker: tracker.clone(),
            token,
        };
        let started = std::time::Instant::now();
        let outcome = handler.run(ctx).await;
        let elapsed = started.elapsed().as_secs_f64();

        let execution_id = execution.id.to_string();
        let write = match outcome {
            Ok(summary) => {
                log_job_operation("execute", &job_id, Some(&execution_id), "success", summary.as_deref());
                tracker.complete_success(execution.id, elapsed, summary).await
            }
            Err(e) if e.is_cancellation() => {
                log_job_operation("execute", &job_id, Some(&execution_id), "cancelled", Some(&e.to_string()));
                tracker
                    .complete_failure(execution.id, elapsed, &format!("cancelled: {e}"))
                    .await
            }
            Err(e) => {
                log_job_operation("execute", &job_id, Some(&execution_id), "failed", Some(&e.to_string()));
                tracker
                    .complete_failure(execution.id, elapsed, &e.to_string())
                    .await
            }
        };
        if let Err(e) = write {
            log_error("scheduler", "record_outcome", &e.to_string(), Some(&job_id));
        }
    }
}
