//! Shared helpers for integration tests.

use marketsync_core::cache::{CacheManager, FileBackend, MemoryBackend, TtlPolicy};
use marketsync_core::config::SchedulerConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Scheduler config with a fast tick so tests finish quickly.
pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval_ms: 20,
        ..SchedulerConfig::default()
    }
}

/// Memory-primary cache manager with a file fallback rooted in a temp dir.
/// The `TempDir` must outlive the manager.
pub fn memory_file_manager(dir: &TempDir, default_ttl: u64) -> CacheManager {
    let file = FileBackend::new(dir.path()).expect("file backend in temp dir");
    CacheManager::with_backends(
        Arc::new(MemoryBackend::new()),
        vec![Arc::new(file)],
        TtlPolicy::new(HashMap::new()).with_default(default_ttl),
        true,
    )
}

/// Poll `check` every 10ms until it returns `Some` or the deadline passes.
pub async fn wait_until<T, F, Fut>(deadline: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let started = std::time::Instant::now();
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if started.elapsed() > deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
