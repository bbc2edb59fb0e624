//! In-memory cache backend.
//!
//! The fast tier. Expiry is native: expired entries are dropped on access and
//! skimmed off during stats aggregation, so a read can never observe a stale
//! row.

use crate::cache::backend::{BackendStats, CacheBackend, CacheEntry};
use crate::cache::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> u64 {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid_at(now));
        (before - self.entries.len()) as u64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn tag(&self) -> &'static str {
        "memory"
    }

    fn native_expiry(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn save(&self, mut entry: CacheEntry) -> Result<(), CacheError> {
        entry.backend_tag = self.tag().to_string();
        debug!(key = %entry.key, "Memory cache save");
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_valid() => return Ok(Some(entry.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
            debug!(key = %key, "Memory cache entry expired, purged");
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        self.purge_expired();
        let mut stats = BackendStats::default();
        for entry in self.entries.iter() {
            stats.record(&entry.metadata.data_type, entry.approximate_bytes());
        }
        Ok(stats)
    }

    async fn clear_older_than(&self, age_days: u32) -> Result<u64, CacheError> {
        let before = self.entries.len();
        if age_days == 0 {
            self.entries.clear();
        } else {
            let cutoff = Utc::now() - chrono::Duration::days(age_days as i64);
            self.entries.retain(|_, entry| entry.created_at >= cutoff);
        }
        Ok((before - self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::CacheMetadata;
    use serde_json::json;

    fn entry(key: &str, ttl_seconds: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: json!({"close": 187.4}),
            metadata: CacheMetadata {
                symbol: "AAPL".to_string(),
                start_date: "2024-01-01".to_string(),
                end_date: "2024-01-31".to_string(),
                data_source: "providerA".to_string(),
                data_type: "stock_data".to_string(),
            },
            created_at: Utc::now(),
            ttl_seconds,
            backend_tag: String::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_valid_entries() {
        let backend = MemoryBackend::new();
        backend.save(entry("k1", 3600)).await.unwrap();

        let loaded = backend.load("k1").await.unwrap().unwrap();
        assert_eq!(loaded.payload, json!({"close": 187.4}));
        assert_eq!(loaded.backend_tag, "memory");
        assert!(backend.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_purged_on_read() {
        let backend = MemoryBackend::new();
        let mut stale = entry("k1", 60);
        stale.created_at = Utc::now() - chrono::Duration::seconds(120);
        backend.save(stale).await.unwrap();

        assert!(backend.load("k1").await.unwrap().is_none());
        // The expired row is gone, not just hidden
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn stats_skip_expired_entries() {
        let backend = MemoryBackend::new();
        backend.save(entry("fresh", 3600)).await.unwrap();
        let mut stale = entry("stale", 60);
        stale.created_at = Utc::now() - chrono::Duration::seconds(120);
        backend.save(stale).await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.per_category["stock_data"], 1);
        assert!(stats.bytes > 0);
    }

    #[tokio::test]
    async fn clear_respects_age_cutoff() {
        let backend = MemoryBackend::new();
        backend.save(entry("new", 3600)).await.unwrap();
        let mut old = entry("old", 3600);
        old.created_at = Utc::now() - chrono::Duration::days(10);
        backend.save(old).await.unwrap();

        assert_eq!(backend.clear_older_than(5).await.unwrap(), 1);
        assert!(backend.load("new").await.unwrap().is_some());
        assert_eq!(backend.clear_older_than(0).await.unwrap(), 1);
        assert!(backend.is_empty());
    }
}
