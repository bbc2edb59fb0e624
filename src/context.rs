//! Application context: explicit wiring of the control-plane subsystems.
//!
//! Construction is explicit rather than ambient: callers build an
//! [`AppContext`] once at startup and hand clones (or the inner `Arc`s) to
//! whatever needs them. No global singletons.

use crate::cache::CacheManager;
use crate::config::{ConfigManager, CoreConfig};
use crate::error::Result;
use crate::ratelimit::RateLimiterRegistry;
use crate::scheduler::Scheduler;
use crate::tracker::ExecutionTracker;
use std::sync::Arc;
use tracing::info;

/// The wired-up control plane: configuration, cache, rate limiters,
/// execution tracking, and the scheduler.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<CoreConfig>,
    pub cache: Arc<CacheManager>,
    pub rate_limiters: Arc<RateLimiterRegistry>,
    pub tracker: ExecutionTracker,
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    /// Build every subsystem from loaded configuration, with in-memory
    /// execution storage. The scheduler is constructed but not started.
    pub fn from_config(config: CoreConfig) -> Result<Self> {
        let tracker = ExecutionTracker::in_memory();
        Self::with_tracker(config, tracker)
    }

    /// Build with a caller-supplied tracker (e.g. one backed by Postgres).
    pub fn with_tracker(config: CoreConfig, tracker: ExecutionTracker) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(CacheManager::from_config(&config.cache)?);
        let rate_limiters = Arc::new(RateLimiterRegistry::from_config(&config.rate_limits)?);
        let scheduler = Arc::new(Scheduler::new(tracker.clone(), config.scheduler.clone()));
        info!(
            providers = rate_limiters.len(),
            primary_backend = %config.cache.primary_backend,
            "🔧 Application context constructed"
        );
        Ok(Self {
            config: Arc::new(config),
            cache,
            rate_limiters,
            tracker,
            scheduler,
        })
    }

    /// Initialize structured logging, load configuration from the
    /// environment-selected YAML file, and build the context from it.
    pub fn bootstrap() -> Result<Self> {
        crate::logging::init_structured_logging();
        let manager = ConfigManager::load()?;
        Self::from_config(manager.config().clone())
    }
}
