//! # Cache Backend Trait and Entry Model
//!
//! One trait over every persistence tier. Backends are independently mockable;
//! the manager owns fallback policy and TTL resolution, backends only store
//! and retrieve entries.

use crate::cache::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Logical slot attributes stored alongside every entry, used to re-resolve
/// TTLs at read time for backends without native expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub data_source: String,
    pub data_type: String,
}

/// One cached payload. An entry is valid iff `now < created_at + ttl`; reads
/// are all-or-nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub metadata: CacheMetadata,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    /// Tag of the backend that stored the entry.
    pub backend_tag: String,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Approximate serialized payload size in bytes, used for stats.
    pub fn approximate_bytes(&self) -> u64 {
        serde_json::to_string(&self.payload)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }
}

/// Per-backend entry statistics.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BackendStats {
    pub entries: u64,
    pub bytes: u64,
    /// Entry counts keyed by data type.
    pub per_category: HashMap<String, u64>,
}

impl BackendStats {
    pub fn record(&mut self, data_type: &str, bytes: u64) {
        self.entries += 1;
        self.bytes += bytes;
        *self.per_category.entry(data_type.to_string()).or_insert(0) += 1;
    }
}

/// A single persistence tier of the adaptive cache.
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Short tag identifying the backend ("memory", "file", "postgres").
    fn tag(&self) -> &'static str;

    /// True when the store purges expired rows itself and reads need no
    /// client-side TTL re-check.
    fn native_expiry(&self) -> bool;

    /// Cheap reachability probe used by stats aggregation.
    async fn is_available(&self) -> bool;

    async fn save(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Load an entry. Backends with native expiry must never return an
    /// expired entry.
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Remove one entry; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn stats(&self) -> Result<BackendStats, CacheError>;

    /// Delete entries older than `age_days` (0 = delete all); returns the
    /// number removed.
    async fn clear_older_than(&self, age_days: u32) -> Result<u64, CacheError>;
}
