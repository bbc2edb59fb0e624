//! # Adaptive Multi-Tier Cache
//!
//! Caches normalized provider payloads so repeated pulls for the same logical
//! slot never hit the provider twice inside the TTL, and survive backend
//! outages by degrading along an ordered backend chain.
//!
//! ## Architecture
//!
//! - [`CacheBackend`] — one trait over every store: fast in-memory, durable
//!   document store (Postgres), and an always-available local file store.
//! - [`CacheManager`] — computes deterministic keys and TTLs, writes/reads
//!   through the configured primary backend, and transparently falls back to
//!   the file backend when the primary is unreachable.
//! - TTL policy is keyed by `{market}_{data_type}`; backends with native
//!   expiry purge rows server-side, the file backend is validity-checked at
//!   read time.
//!
//! Backend errors are contained at the manager boundary: they surface to a
//! caller only when every backend in the chain fails.

pub mod backend;
pub mod file;
pub mod key;
pub mod manager;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod ttl;

pub use backend::{BackendStats, CacheBackend, CacheEntry, CacheMetadata};
pub use file::FileBackend;
pub use key::cache_key;
pub use manager::{BackendInfo, CacheManager, CacheStats};
pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
pub use ttl::TtlPolicy;

/// Errors raised by individual cache backends. The manager catches these and
/// degrades along the chain; only [`CacheError::AllBackendsFailed`] escapes it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("Cache backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// A payload or entry could not be (de)serialized.
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// File store I/O failure.
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// Every backend in the chain failed for the operation.
    #[error("All cache backends failed: {0}")]
    AllBackendsFailed(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Unavailable {
            backend: "postgres".to_string(),
            reason: err.to_string(),
        }
    }
}
