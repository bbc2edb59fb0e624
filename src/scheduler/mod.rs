//! # Job Scheduling
//!
//! Cron- and interval-driven job execution with persisted history.
//!
//! ## Architecture
//!
//! * **Triggers** ([`trigger`]): cron expressions and fixed intervals
//! * **Jobs** ([`job`]): definitions, the [`JobHandler`] trait, and the
//!   [`JobContext`] a running handler sees
//! * **Service** ([`service`]): the [`Scheduler`] registry and dispatch loop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use marketsync_core::scheduler::{FnJobHandler, Scheduler, TriggerSpec};
//! use marketsync_core::tracker::ExecutionTracker;
//! use marketsync_core::config::SchedulerConfig;
//!
//! # fn demo() -> marketsync_core::error::Result<()> {
//! let scheduler = Scheduler::new(ExecutionTracker::in_memory(), SchedulerConfig::default());
//! let handler = FnJobHandler::new(|ctx| {
//!     Box::pin(async move {
//!         ctx.progress(50, Some("halfway"), None).await?;
//!         Ok(Some("done".to_string()))
//!     })
//! });
//! scheduler.add_job(
//!     TriggerSpec::cron("0 30 9 * * Mon-Fri *")?,
//!     handler,
//!     "daily_sync",
//!     "Daily Market Sync",
//!     serde_json::json!({"markets": ["china", "us"]}),
//! )?;
//! scheduler.start()?;
//! # Ok(())
//! # }
//! ```

pub mod job;
pub mod service;
pub mod trigger;

pub use job::{FnJobHandler, JobContext, JobDefinition, JobHandler, JobInfo};
pub use service::{Scheduler, SchedulerHealth, SchedulerStats};
pub use trigger::TriggerSpec;
