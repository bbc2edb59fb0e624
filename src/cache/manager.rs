//! # Cache Manager
//!
//! Front door of the adaptive cache. Computes deterministic keys and TTLs,
//! writes through the configured primary backend, and degrades transparently
//! to the always-available file backend when the primary fails. Backend
//! errors surface to callers only when every backend in the chain fails.

use crate::cache::backend::{CacheBackend, CacheEntry, CacheMetadata};
use crate::cache::file::FileBackend;
use crate::cache::key::cache_key;
use crate::cache::memory::MemoryBackend;
use crate::cache::ttl::TtlPolicy;
use crate::cache::CacheError;
use crate::config::CacheConfig;
use crate::error::{CoreError, Result};
use crate::logging::log_cache_operation;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reachability and occupancy of one backend, reported by stats.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub tag: String,
    pub available: bool,
    pub entries: u64,
}

/// Aggregated statistics across all reachable backends.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_bytes: u64,
    pub total_size_mb: f64,
    pub per_category: HashMap<String, u64>,
    pub backends: Vec<BackendInfo>,
    pub primary_backend: String,
    pub fallback_enabled: bool,
}

/// Process-wide cache front door; one instance is constructed at startup and
/// shared by every job handler.
#[derive(Debug)]
pub struct CacheManager {
    primary: Arc<dyn CacheBackend>,
    fallbacks: Vec<Arc<dyn CacheBackend>>,
    ttl_policy: TtlPolicy,
    fallback_enabled: bool,
}

impl CacheManager {
    /// Build from explicit backends: reads and writes try the primary first,
    /// then the given fallbacks in order, terminating at the file backend.
    pub fn with_backends(
        primary: Arc<dyn CacheBackend>,
        fallbacks: Vec<Arc<dyn CacheBackend>>,
        ttl_policy: TtlPolicy,
        fallback_enabled: bool,
    ) -> Self {
        info!(
            primary = primary.tag(),
            fallbacks = fallbacks.len(),
            fallback_enabled,
            "🔧 Cache manager initialized"
        );
        Self {
            primary,
            fallbacks,
            ttl_policy,
            fallback_enabled,
        }
    }

    /// Build the memory- or file-primary configurations directly from config.
    /// A postgres primary needs a live pool and is assembled by the
    /// application context instead.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let ttl_policy = TtlPolicy::new(config.ttl_settings.clone());
        let file_backend: Arc<dyn CacheBackend> = Arc::new(
            FileBackend::new(&config.cache_dir)
                .map_err(|e| CoreError::ConfigurationError(e.to_string()))?,
        );
        match config.primary_backend.as_str() {
            "memory" => Ok(Self::with_backends(
                Arc::new(MemoryBackend::new()),
                vec![file_backend],
                ttl_policy,
                config.fallback_enabled,
            )),
            "file" => Ok(Self::with_backends(
                file_backend,
                Vec::new(),
                ttl_policy,
                config.fallback_enabled,
            )),
            other => Err(CoreError::ConfigurationError(format!(
                "cache backend '{other}' requires explicit construction"
            ))),
        }
    }

    /// Backends in read/write order: primary first, fallbacks only when
    /// fallback is enabled.
    fn chain(&self) -> impl Iterator<Item = &Arc<dyn CacheBackend>> {
        std::iter::once(&self.primary).chain(
            self.fallback_enabled
                .then_some(self.fallbacks.iter())
                .into_iter()
                .flatten(),
        )
    }

    fn all_backends(&self) -> impl Iterator<Item = &Arc<dyn CacheBackend>> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Resolve the TTL the policy table assigns to a symbol/data-type pair.
    pub fn resolve_ttl(&self, symbol: &str, data_type: &str) -> u64 {
        self.ttl_policy.resolve(symbol, data_type)
    }

    /// Save a payload for a logical slot and return its cache key. The write
    /// lands in the first backend that accepts it.
    pub async fn save_data(
        &self,
        symbol: &str,
        payload: serde_json::Value,
        start_date: &str,
        end_date: &str,
        data_source: &str,
        data_type: &str,
    ) -> Result<String> {
        let key = cache_key(symbol, start_date, end_date, data_source, data_type);
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            metadata: CacheMetadata {
                symbol: symbol.to_string(),
                start_date: start_date.to_string(),
                end_date: end_date.to_string(),
                data_source: data_source.to_string(),
                data_type: data_type.to_string(),
            },
            created_at: Utc::now(),
            ttl_seconds: self.ttl_policy.resolve(symbol, data_type),
            backend_tag: String::new(),
        };

        let mut last_error = None;
        for backend in self.chain() {
            match backend.save(entry.clone()).await {
                Ok(()) => {
                    log_cache_operation(
                        "save",
                        backend.tag(),
                        Some(&key),
                        "saved",
                        Some(&format!("symbol={symbol} ttl={}s", entry.ttl_seconds)),
                    );
                    return Ok(key);
                }
                Err(e) => {
                    warn!(
                        backend = backend.tag(),
                        key = %key,
                        error = %e,
                        "Cache save failed, degrading to next backend"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(CoreError::BackendUnavailable(
            CacheError::AllBackendsFailed(format!(
                "save of '{key}' failed: {}",
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ))
            .to_string(),
        ))
    }

    /// Load a payload by key. Returns `Ok(None)` on a miss or an expired
    /// entry; errs only when every backend failed.
    pub async fn load_data(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut failures = 0usize;
        let mut probed = 0usize;
        for backend in self.chain() {
            probed += 1;
            match backend.load(key).await {
                Ok(Some(entry)) => {
                    // Stores with native expiry purge rows server-side;
                    // everything else is validity-checked here at read time.
                    if backend.native_expiry() || entry.is_valid() {
                        debug!(key = %key, backend = backend.tag(), "Cache hit");
                        return Ok(Some(entry.payload));
                    }
                    debug!(key = %key, backend = backend.tag(), "Cache entry expired");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        backend = backend.tag(),
                        key = %key,
                        error = %e,
                        "Cache load failed, trying next backend"
                    );
                    failures += 1;
                }
            }
        }

        if failures == probed {
            return Err(CoreError::BackendUnavailable(
                CacheError::AllBackendsFailed(format!("load of '{key}' failed")).to_string(),
            ));
        }
        Ok(None)
    }

    /// Return the key for a logical slot iff a valid cached payload exists.
    pub async fn find_cached(
        &self,
        symbol: &str,
        start_date: &str,
        end_date: &str,
        data_source: &str,
        data_type: &str,
    ) -> Option<String> {
        let key = cache_key(symbol, start_date, end_date, data_source, data_type);
        match self.load_data(&key).await {
            Ok(Some(_)) => Some(key),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "find_cached degraded to miss");
                None
            }
        }
    }

    /// Aggregate statistics across all reachable backends. An unreachable
    /// backend is reported as such and omitted from the totals; it never
    /// fails the call.
    pub async fn get_cache_stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total_entries: 0,
            total_bytes: 0,
            total_size_mb: 0.0,
            per_category: HashMap::new(),
            backends: Vec::new(),
            primary_backend: self.primary.tag().to_string(),
            fallback_enabled: self.fallback_enabled,
        };

        for backend in self.all_backends() {
            if !backend.is_available().await {
                warn!(backend = backend.tag(), "Backend unreachable, omitted from cache stats");
                stats.backends.push(BackendInfo {
                    tag: backend.tag().to_string(),
                    available: false,
                    entries: 0,
                });
                continue;
            }
            match backend.stats().await {
                Ok(backend_stats) => {
                    stats.total_entries += backend_stats.entries;
                    stats.total_bytes += backend_stats.bytes;
                    for (category, count) in backend_stats.per_category {
                        *stats.per_category.entry(category).or_insert(0) += count;
                    }
                    stats.backends.push(BackendInfo {
                        tag: backend.tag().to_string(),
                        available: true,
                        entries: backend_stats.entries,
                    });
                }
                Err(e) => {
                    warn!(backend = backend.tag(), error = %e, "Backend stats failed, omitted");
                    stats.backends.push(BackendInfo {
                        tag: backend.tag().to_string(),
                        available: false,
                        entries: 0,
                    });
                }
            }
        }

        stats.total_size_mb = (stats.total_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        stats
    }

    /// Delete entries older than `age_days` (0 = clear all) in every backend.
    /// A failing backend is logged and skipped; the others still clear.
    pub async fn clear(&self, age_days: u32) -> u64 {
        let mut deleted = 0u64;
        for backend in self.all_backends() {
            match backend.clear_older_than(age_days).await {
                Ok(count) => {
                    deleted += count;
                    debug!(backend = backend.tag(), count, "Cache clear");
                }
                Err(e) => {
                    warn!(backend = backend.tag(), error = %e, "Cache clear failed in backend");
                }
            }
        }
        info!(age_days, deleted, "🧹 Cache clear complete");
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::BackendStats;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    /// Backend stub that fails every operation, standing in for an
    /// unreachable store.
    #[derive(Debug)]
    struct UnreachableBackend;

    #[async_trait]
    impl CacheBackend for UnreachableBackend {
        fn tag(&self) -> &'static str {
            "unreachable"
        }
        fn native_expiry(&self) -> bool {
            true
        }
        async fn is_available(&self) -> bool {
            false
        }
        async fn save(&self, _entry: CacheEntry) -> std::result::Result<(), CacheError> {
            Err(self.error())
        }
        async fn load(&self, _key: &str) -> std::result::Result<Option<CacheEntry>, CacheError> {
            Err(self.error())
        }
        async fn delete(&self, _key: &str) -> std::result::Result<bool, CacheError> {
            Err(self.error())
        }
        async fn stats(&self) -> std::result::Result<BackendStats, CacheError> {
            Err(self.error())
        }
        async fn clear_older_than(&self, _age_days: u32) -> std::result::Result<u64, CacheError> {
            Err(self.error())
        }
    }

    impl UnreachableBackend {
        fn error(&self) -> CacheError {
            CacheError::Unavailable {
                backend: "unreachable".to_string(),
                reason: "connection refused".to_string(),
            }
        }
    }

    fn memory_manager() -> CacheManager {
        CacheManager::with_backends(
            Arc::new(MemoryBackend::new()),
            Vec::new(),
            TtlPolicy::default(),
            true,
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let manager = memory_manager();
        let payload = json!([{"date": "2024-01-02", "close": 185.6}]);

        let key = manager
            .save_data("AAPL", payload.clone(), "2024-01-01", "2024-01-31", "providerA", "stock_data")
            .await
            .unwrap();

        assert_eq!(manager.load_data(&key).await.unwrap(), Some(payload));
        assert!(manager.load_data("no-such-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_returns_key_only_for_cached_slots() {
        let manager = memory_manager();
        let key = manager
            .save_data("AAPL", json!(1), "2024-01-01", "2024-01-31", "providerA", "stock_data")
            .await
            .unwrap();

        let found = manager
            .find_cached("AAPL", "2024-01-01", "2024-01-31", "providerA", "stock_data")
            .await;
        assert_eq!(found, Some(key));

        let missing = manager
            .find_cached("MSFT", "2024-01-01", "2024-01-31", "providerA", "stock_data")
            .await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn failing_primary_degrades_to_file_backend() {
        let dir = TempDir::new().unwrap();
        let manager = CacheManager::with_backends(
            Arc::new(UnreachableBackend),
            vec![Arc::new(FileBackend::new(dir.path()).unwrap())],
            TtlPolicy::default(),
            true,
        );

        let payload = json!({"rows": 3});
        let key = manager
            .save_data("600519", payload.clone(), "", "", "tushare", "stock_data")
            .await
            .unwrap();
        assert_eq!(manager.load_data(&key).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn fallback_disabled_surfaces_primary_failure() {
        let dir = TempDir::new().unwrap();
        let manager = CacheManager::with_backends(
            Arc::new(UnreachableBackend),
            vec![Arc::new(FileBackend::new(dir.path()).unwrap())],
            TtlPolicy::default(),
            false,
        );

        let err = manager
            .save_data("AAPL", json!(1), "", "", "providerA", "stock_data")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn expired_file_entry_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let file_backend = Arc::new(FileBackend::new(dir.path()).unwrap());
        let manager = CacheManager::with_backends(
            file_backend.clone(),
            Vec::new(),
            TtlPolicy::default(),
            true,
        );

        // Plant an already-expired entry directly in the backend.
        let key = cache_key("AAPL", "2024-01-01", "2024-01-31", "providerA", "stock_data");
        file_backend
            .save(CacheEntry {
                key: key.clone(),
                payload: json!(42),
                metadata: CacheMetadata {
                    symbol: "AAPL".to_string(),
                    start_date: "2024-01-01".to_string(),
                    end_date: "2024-01-31".to_string(),
                    data_source: "providerA".to_string(),
                    data_type: "stock_data".to_string(),
                },
                created_at: Utc::now() - chrono::Duration::hours(3),
                ttl_seconds: 7200,
                backend_tag: String::new(),
            })
            .await
            .unwrap();

        assert!(manager.load_data(&key).await.unwrap().is_none());
        assert!(manager
            .find_cached("AAPL", "2024-01-01", "2024-01-31", "providerA", "stock_data")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn stats_omit_unreachable_backend() {
        let manager = CacheManager::with_backends(
            Arc::new(UnreachableBackend),
            vec![Arc::new(MemoryBackend::new())],
            TtlPolicy::default(),
            true,
        );
        manager
            .save_data("AAPL", json!(1), "", "", "providerA", "stock_data")
            .await
            .unwrap();

        let stats = manager.get_cache_stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.per_category["stock_data"], 1);
        let unreachable = stats.backends.iter().find(|b| b.tag == "unreachable").unwrap();
        assert!(!unreachable.available);
        let memory = stats.backends.iter().find(|b| b.tag == "memory").unwrap();
        assert!(memory.available);
        assert_eq!(memory.entries, 1);
    }

    #[tokio::test]
    async fn clear_zero_empties_reachable_backends() {
        let manager = memory_manager();
        for symbol in ["AAPL", "MSFT", "600519"] {
            manager
                .save_data(symbol, json!(1), "", "", "providerA", "stock_data")
                .await
                .unwrap();
        }
        assert_eq!(manager.get_cache_stats().await.total_entries, 3);

        let deleted = manager.clear(0).await;
        assert_eq!(deleted, 3);
        assert_eq!(manager.get_cache_stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn clear_continues_past_failing_backend() {
        let manager = CacheManager::with_backends(
            Arc::new(UnreachableBackend),
            vec![Arc::new(MemoryBackend::new())],
            TtlPolicy::default(),
            true,
        );
        manager
            .save_data("AAPL", json!(1), "", "", "providerA", "stock_data")
            .await
            .unwrap();

        // The unreachable backend fails but the memory backend still clears.
        assert_eq!(manager.clear(0).await, 1);
    }

    #[tokio::test]
    async fn from_config_builds_memory_primary_with_file_fallback() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            primary_backend: "memory".to_string(),
            cache_dir: dir.path().to_string_lossy().into_owned(),
            ..CacheConfig::default()
        };
        let manager = CacheManager::from_config(&config).unwrap();
        assert_eq!(manager.primary.tag(), "memory");
        assert_eq!(manager.fallbacks.len(), 1);
        assert_eq!(manager.resolve_ttl("600519", "stock_data"), 3600);
    }
}
