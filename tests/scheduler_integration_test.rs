//! Full scheduler lifecycle: dispatch loop, manual triggers, cancellation,
//! and the recorded execution history.

mod common;

use common::{fast_scheduler_config, wait_until};
use marketsync_core::constants::ExecutionStatus;
use marketsync_core::scheduler::{FnJobHandler, Scheduler, TriggerSpec};
use marketsync_core::tracker::{ExecutionQuery, ExecutionTracker, JobExecution};
use serde_json::json;
use std::time::Duration;

async fn terminal_execution(scheduler: &Scheduler, job_id: &str) -> Option<JobExecution> {
    let tracker = scheduler.tracker().clone();
    let job_id = job_id.to_string();
    wait_until(Duration::from_secs(5), move || {
        let tracker = tracker.clone();
        let job_id = job_id.clone();
        async move {
            let (rows, _) = tracker
                .get_job_executions(&ExecutionQuery::for_job(&job_id))
                .await
                .ok()?;
            rows.into_iter().find(|r| r.status.is_terminal())
        }
    })
    .await
}

#[tokio::test]
async fn dispatch_loop_fires_interval_jobs() {
    let scheduler = Scheduler::new(ExecutionTracker::in_memory(), fast_scheduler_config());
    scheduler
        .add_job(
            TriggerSpec::interval_secs(1).unwrap(),
            FnJobHandler::new(|ctx| {
                Box::pin(async move {
                    ctx.progress(50, Some("fetching"), None).await?;
                    Ok(Some("1 batch".to_string()))
                })
            }),
            "ticker_sync",
            "Ticker Sync",
            json!({"symbols": ["600519"]}),
        )
        .unwrap();

    scheduler.start().unwrap();
    let row = terminal_execution(&scheduler, "ticker_sync").await.unwrap();
    scheduler.shutdown().await;

    assert_eq!(row.status, ExecutionStatus::Success);
    assert!(!row.is_manual);
    assert!(row.scheduled_time.is_some());
    assert_eq!(row.return_value.as_deref(), Some("1 batch"));
    assert!(row.execution_time_secs.is_some());
}

#[tokio::test]
async fn manual_trigger_of_paused_job_runs_and_stays_paused() {
    let scheduler = Scheduler::new(ExecutionTracker::in_memory(), fast_scheduler_config());
    scheduler
        .add_job(
            TriggerSpec::interval_secs(3600).unwrap(),
            FnJobHandler::new(|_ctx| Box::pin(async { Ok(Some("manual run".to_string())) })),
            "weekly_report",
            "Weekly Report",
            json!({}),
        )
        .unwrap();
    scheduler.pause_job("weekly_report").await.unwrap();

    assert!(scheduler.trigger_job("weekly_report", None).await.unwrap());
    let row = terminal_execution(&scheduler, "weekly_report").await.unwrap();

    assert_eq!(row.status, ExecutionStatus::Success);
    assert!(row.is_manual);

    let info = scheduler.get_job("weekly_report").await.unwrap().unwrap();
    assert!(info.paused);
    assert!(info.next_run_time.is_none());
}

#[tokio::test]
async fn cancellation_interrupts_a_progress_reporting_handler() {
    let scheduler = Scheduler::new(ExecutionTracker::in_memory(), fast_scheduler_config());
    scheduler
        .add_job(
            TriggerSpec::interval_secs(3600).unwrap(),
            FnJobHandler::new(|ctx| {
                Box::pin(async move {
                    for step in 0..200u8 {
                        ctx.progress(step.min(99), Some("crunching"), None).await?;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok(Some("never reached".to_string()))
                })
            }),
            "long_sync",
            "Long Sync",
            json!({}),
        )
        .unwrap();

    scheduler.trigger_job("long_sync", None).await.unwrap();

    // Wait for the running row, then request cancellation.
    let tracker = scheduler.tracker().clone();
    let running = wait_until(Duration::from_secs(5), || {
        let tracker = tracker.clone();
        async move {
            tracker
                .store()
                .latest_running_for_job("long_sync")
                .await
                .ok()
                .flatten()
        }
    })
    .await
    .unwrap();

    tracker.cancel_job_execution(running.id).await.unwrap();

    let row = terminal_execution(&scheduler, "long_sync").await.unwrap();
    assert_eq!(row.status, ExecutionStatus::Failed);
    assert!(row
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("cancel"));
}

#[tokio::test]
async fn history_and_stats_reflect_completed_runs() {
    let scheduler = Scheduler::new(ExecutionTracker::in_memory(), fast_scheduler_config());
    scheduler
        .add_job(
            TriggerSpec::interval_secs(3600).unwrap(),
            FnJobHandler::new(|_ctx| Box::pin(async { Ok(None) })),
            "news_sync",
            "News Sync",
            json!({}),
        )
        .unwrap();

    scheduler.trigger_job("news_sync", None).await.unwrap();
    terminal_execution(&scheduler, "news_sync").await.unwrap();

    let stats = scheduler
        .tracker()
        .get_job_execution_stats("news_sync")
        .await
        .unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);

    // Manual trigger left one audit entry.
    let (audit, total) = scheduler
        .tracker()
        .get_job_history("news_sync", 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(audit[0].status, "success");
}
