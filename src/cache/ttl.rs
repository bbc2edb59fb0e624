//! TTL policy resolution.
//!
//! TTLs come from a table keyed by `{market}_{data_type}`; the market is
//! inferred from the symbol. Anything without a policy entry gets the default.

use crate::constants::{system, Market};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TtlPolicy {
    settings: HashMap<String, u64>,
    default_seconds: u64,
}

impl TtlPolicy {
    pub fn new(settings: HashMap<String, u64>) -> Self {
        Self {
            settings,
            default_seconds: system::DEFAULT_TTL_SECONDS,
        }
    }

    pub fn with_default(mut self, default_seconds: u64) -> Self {
        self.default_seconds = default_seconds;
        self
    }

    /// Resolve the TTL in seconds for a symbol/data-type pair.
    pub fn resolve(&self, symbol: &str, data_type: &str) -> u64 {
        let market = Market::from_symbol(symbol);
        let key = format!("{market}_{data_type}");
        self.settings
            .get(&key)
            .copied()
            .unwrap_or(self.default_seconds)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default_ttl_settings())
    }
}
