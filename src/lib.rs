//! # MarketSync Core
//!
//! Execution control plane for a financial-data aggregation backend. Three
//! subsystems cooperate to keep provider syncs reliable and polite:
//!
//! * **Scheduler** ([`scheduler`]): cron/interval jobs dispatched from a
//!   single tick loop, with every run persisted as an execution row
//! * **Rate limiting** ([`ratelimit`]): per-provider sliding windows that
//!   make callers wait instead of letting provider quotas reject them
//! * **Adaptive cache** ([`cache`]): memory/file/postgres backends behind one
//!   manager with transparent fallback and per-market TTL policy
//!
//! Execution history, cooperative cancellation, and zombie reaping live in
//! [`tracker`]; [`context::AppContext`] wires everything together from
//! configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use marketsync_core::context::AppContext;
//!
//! # fn main() -> marketsync_core::error::Result<()> {
//! let ctx = AppContext::bootstrap()?;
//! ctx.scheduler.start()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod ratelimit;
pub mod scheduler;
pub mod tracker;

pub use context::AppContext;
pub use error::{CoreError, Result};
