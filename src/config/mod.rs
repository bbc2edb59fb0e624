//! # Configuration System
//!
//! YAML-based configuration for the execution control plane. All tunables come
//! from explicit, validated configuration with sensible defaults; there are no
//! ambient globals. Environment-specific overrides (development/test/production)
//! are merged over the base document by [`ConfigManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use marketsync_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let tick = manager.config().scheduler.tick_interval_ms;
//! let primary = &manager.config().cache.primary_backend;
//! # Ok(())
//! # }
//! ```

pub mod loader;

pub use loader::ConfigManager;

use crate::constants::system;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for the execution control plane.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl CoreConfig {
    /// Validate cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "scheduler.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.zombie_threshold_minutes == 0 {
            return Err(CoreError::ConfigurationError(
                "scheduler.zombie_threshold_minutes must be greater than zero".to_string(),
            ));
        }
        if !CacheConfig::KNOWN_BACKENDS.contains(&self.cache.primary_backend.as_str()) {
            return Err(CoreError::ConfigurationError(format!(
                "cache.primary_backend must be one of {:?}, got '{}'",
                CacheConfig::KNOWN_BACKENDS,
                self.cache.primary_backend
            )));
        }
        for (name, provider) in &self.rate_limits.providers {
            if name.is_empty() {
                return Err(CoreError::ConfigurationError(
                    "rate_limits.providers contains an empty provider name".to_string(),
                ));
            }
            provider.validate(name)?;
        }
        let margin = self.rate_limits.safety_margin;
        if !(margin > 0.0 && margin <= 1.0) {
            return Err(CoreError::ConfigurationError(format!(
                "rate_limits.safety_margin must be in (0, 1], got {margin}"
            )));
        }
        Ok(())
    }
}

/// Scheduler dispatch and sweep tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Dispatcher tick interval in milliseconds.
    #[serde(default = "SchedulerConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// A due run older than this is recorded Missed instead of started.
    #[serde(default = "SchedulerConfig::default_misfire_grace_seconds")]
    pub misfire_grace_seconds: u64,

    /// Interval of the built-in zombie sweep job.
    #[serde(default = "SchedulerConfig::default_zombie_sweep_interval_seconds")]
    pub zombie_sweep_interval_seconds: u64,

    /// Running rows not updated within this window are flipped to Failed.
    #[serde(default = "SchedulerConfig::default_zombie_threshold_minutes")]
    pub zombie_threshold_minutes: u64,
}

impl SchedulerConfig {
    fn default_tick_interval_ms() -> u64 {
        system::DEFAULT_TICK_INTERVAL_MS
    }
    fn default_misfire_grace_seconds() -> u64 {
        system::DEFAULT_MISFIRE_GRACE_SECONDS
    }
    fn default_zombie_sweep_interval_seconds() -> u64 {
        system::DEFAULT_ZOMBIE_SWEEP_INTERVAL_SECONDS
    }
    fn default_zombie_threshold_minutes() -> u64 {
        system::DEFAULT_ZOMBIE_THRESHOLD_MINUTES
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(self.misfire_grace_seconds)
    }

    pub fn zombie_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.zombie_threshold_minutes as i64)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            misfire_grace_seconds: Self::default_misfire_grace_seconds(),
            zombie_sweep_interval_seconds: Self::default_zombie_sweep_interval_seconds(),
            zombie_threshold_minutes: Self::default_zombie_threshold_minutes(),
        }
    }
}

/// Adaptive cache configuration: primary backend, fallback policy, TTL table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Backend tried first for every save/load: "memory", "file", or "postgres".
    #[serde(default = "CacheConfig::default_primary_backend")]
    pub primary_backend: String,

    /// When true, a failing primary backend degrades to the file backend
    /// instead of surfacing the error.
    #[serde(default = "CacheConfig::default_fallback_enabled")]
    pub fallback_enabled: bool,

    /// Directory used by the always-available file backend.
    #[serde(default = "CacheConfig::default_cache_dir")]
    pub cache_dir: String,

    /// TTL policy table keyed by `{market}_{data_type}`, values in seconds.
    #[serde(default = "CacheConfig::default_ttl_settings")]
    pub ttl_settings: HashMap<String, u64>,
}

impl CacheConfig {
    pub const KNOWN_BACKENDS: &'static [&'static str] = &["memory", "file", "postgres"];

    fn default_primary_backend() -> String {
        "memory".to_string()
    }
    fn default_fallback_enabled() -> bool {
        true
    }
    fn default_cache_dir() -> String {
        "data/cache".to_string()
    }

    /// Faster-moving markets get shorter TTLs.
    pub fn default_ttl_settings() -> HashMap<String, u64> {
        HashMap::from([
            ("china_stock_data".to_string(), 3600),
            ("us_stock_data".to_string(), 7200),
            ("china_news_data".to_string(), 1800),
            ("us_news_data".to_string(), 3600),
            ("china_fundamentals_data".to_string(), 21600),
            ("us_fundamentals_data".to_string(), 21600),
        ])
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            primary_backend: Self::default_primary_backend(),
            fallback_enabled: Self::default_fallback_enabled(),
            cache_dir: Self::default_cache_dir(),
            ttl_settings: Self::default_ttl_settings(),
        }
    }
}

/// Per-provider rate-limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Safety margin applied to tiered limits, leaving headroom below the
    /// provider's documented cap.
    #[serde(default = "RateLimitConfig::default_safety_margin")]
    pub safety_margin: f64,

    /// Providers keyed by name.
    #[serde(default = "RateLimitConfig::default_providers")]
    pub providers: HashMap<String, ProviderLimitConfig>,
}

impl RateLimitConfig {
    fn default_safety_margin() -> f64 {
        system::DEFAULT_SAFETY_MARGIN
    }

    /// Conservative defaults mirroring documented provider limits.
    pub fn default_providers() -> HashMap<String, ProviderLimitConfig> {
        HashMap::from([
            (
                "tushare".to_string(),
                ProviderLimitConfig {
                    tier: Some("standard".to_string()),
                    max_calls: None,
                    time_window_seconds: None,
                    safety_margin: None,
                },
            ),
            (
                "akshare".to_string(),
                ProviderLimitConfig {
                    tier: None,
                    max_calls: Some(60),
                    time_window_seconds: Some(60),
                    safety_margin: None,
                },
            ),
            (
                "baostock".to_string(),
                ProviderLimitConfig {
                    tier: None,
                    max_calls: Some(100),
                    time_window_seconds: Some(60),
                    safety_margin: None,
                },
            ),
        ])
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            safety_margin: Self::default_safety_margin(),
            providers: Self::default_providers(),
        }
    }
}

/// Limit definition for one provider: either a named capacity tier or an
/// explicit calls-per-window pair.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderLimitConfig {
    pub tier: Option<String>,
    pub max_calls: Option<u32>,
    pub time_window_seconds: Option<u64>,
    /// Overrides the global safety margin for this provider.
    pub safety_margin: Option<f64>,
}

impl ProviderLimitConfig {
    fn validate(&self, name: &str) -> Result<()> {
        if self.tier.is_none() && self.max_calls.is_none() {
            return Err(CoreError::ConfigurationError(format!(
                "provider '{name}' must set either a tier or max_calls"
            )));
        }
        if let Some(0) = self.max_calls {
            return Err(CoreError::ConfigurationError(format!(
                "provider '{name}': max_calls must be greater than zero"
            )));
        }
        if let Some(0) = self.time_window_seconds {
            return Err(CoreError::ConfigurationError(format!(
                "provider '{name}': time_window_seconds must be greater than zero"
            )));
        }
        Ok(())
    }
}

/// Connection settings for the durable document store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// When false the postgres-backed stores are never constructed.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "DatabaseConfig::default_url")]
    pub url: String,

    #[serde(default = "DatabaseConfig::default_pool")]
    pub pool: u32,
}

impl DatabaseConfig {
    fn default_url() -> String {
        "postgresql://localhost/marketsync".to_string()
    }
    fn default_pool() -> u32 {
        5
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: Self::default_url(),
            pool: Self::default_pool(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.primary_backend, "memory");
        assert!(config.cache.fallback_enabled);
        assert_eq!(config.scheduler.zombie_threshold_minutes, 30);
    }

    #[test]
    fn rejects_zero_tick_interval() {
        let mut config = CoreConfig::default();
        config.scheduler.tick_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));
    }

    #[test]
    fn rejects_unknown_primary_backend() {
        let mut config = CoreConfig::default();
        config.cache.primary_backend = "redis".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_provider_without_limits() {
        let mut config = CoreConfig::default();
        config
            .rate_limits
            .providers
            .insert("empty".to_string(), ProviderLimitConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_ttl_table_prefers_faster_markets() {
        let settings = CacheConfig::default_ttl_settings();
        assert!(settings["china_stock_data"] < settings["us_stock_data"]);
        assert!(settings["china_news_data"] < settings["china_fundamentals_data"]);
    }
}
