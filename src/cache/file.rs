//! Local file cache backend.
//!
//! The always-available terminal fallback tier: one JSON document per key
//! under the cache directory. There is no native expiry; the manager computes
//! validity at read time from the stored timestamp and TTL.

use crate::cache::backend::{BackendStats, CacheBackend, CacheEntry};
use crate::cache::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    /// Create the backend, ensuring the cache directory exists.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    async fn read_entry(&self, path: &Path) -> Result<CacheEntry, CacheError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn tag(&self) -> &'static str {
        "file"
    }

    fn native_expiry(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        self.cache_dir.is_dir()
    }

    async fn save(&self, mut entry: CacheEntry) -> Result<(), CacheError> {
        entry.backend_tag = self.tag().to_string();
        let path = self.path_for(&entry.key);
        let content = serde_json::to_string(&entry)?;
        tokio::fs::write(&path, content).await?;
        debug!(key = %entry.key, path = %path.display(), "File cache save");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_entry(&path).await?))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(&path).await?;
        Ok(true)
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let mut stats = BackendStats::default();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_entry(&path).await {
                Ok(entry) => {
                    let bytes = dirent.metadata().await.map(|m| m.len()).unwrap_or(0);
                    stats.record(&entry.metadata.data_type, bytes);
                }
                Err(e) => {
                    // A corrupt file must not fail the whole aggregation.
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache file");
                }
            }
        }
        Ok(stats)
    }

    async fn clear_older_than(&self, age_days: u32) -> Result<u64, CacheError> {
        let cutoff = (age_days > 0)
            .then(|| Utc::now() - chrono::Duration::days(age_days as i64));
        let mut deleted = 0u64;
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let remove = match cutoff {
                None => true,
                Some(cutoff) => match self.read_entry(&path).await {
                    Ok(entry) => entry.created_at < cutoff,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to inspect cache file");
                        false
                    }
                },
            };
            if remove && tokio::fs::remove_file(&path).await.is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::CacheMetadata;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(key: &str, data_type: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: json!([{"date": "2024-01-02", "close": 185.6}]),
            metadata: CacheMetadata {
                symbol: "AAPL".to_string(),
                start_date: "2024-01-01".to_string(),
                end_date: "2024-01-31".to_string(),
                data_source: "providerA".to_string(),
                data_type: data_type.to_string(),
            },
            created_at: Utc::now(),
            ttl_seconds: 7200,
            backend_tag: String::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_entries_through_disk() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();

        backend.save(entry("abc123", "stock_data")).await.unwrap();
        let loaded = backend.load("abc123").await.unwrap().unwrap();
        assert_eq!(loaded.metadata.symbol, "AAPL");
        assert_eq!(loaded.backend_tag, "file");
        assert!(backend.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_count_per_category() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        backend.save(entry("s1", "stock_data")).await.unwrap();
        backend.save(entry("s2", "stock_data")).await.unwrap();
        backend.save(entry("n1", "news_data")).await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.per_category["stock_data"], 2);
        assert_eq!(stats.per_category["news_data"], 1);
        assert!(stats.bytes > 0);
    }

    #[tokio::test]
    async fn corrupt_files_do_not_fail_stats() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        backend.save(entry("good", "stock_data")).await.unwrap();
        tokio::fs::write(dir.path().join("bad.json"), "not json")
            .await
            .unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn clear_all_and_clear_by_age() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();

        let mut old = entry("old", "stock_data");
        old.created_at = Utc::now() - chrono::Duration::days(9);
        backend.save(old).await.unwrap();
        backend.save(entry("new", "stock_data")).await.unwrap();

        assert_eq!(backend.clear_older_than(7).await.unwrap(), 1);
        assert!(backend.load("new").await.unwrap().is_some());
        assert_eq!(backend.clear_older_than(0).await.unwrap(), 1);
        assert_eq!(backend.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path()).unwrap();
        backend.save(entry("k", "stock_data")).await.unwrap();

        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }
}
