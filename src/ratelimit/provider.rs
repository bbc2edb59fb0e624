//! # Provider Tiers and Limiter Registry
//!
//! Maps provider capacity tiers to concrete window limits and builds the
//! per-provider [`RateLimiter`] instances from configuration. Tiered limits
//! are multiplied by a safety margin (< 1.0) so sustained usage stays below
//! the provider's documented cap.

use crate::config::{ProviderLimitConfig, RateLimitConfig};
use crate::error::Result;
use crate::ratelimit::RateLimiter;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Subscription tiers offered by quota-tiered providers. Limits are
/// calls-per-minute before the safety margin is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Free,
    Basic,
    Standard,
    Premium,
    Vip,
}

impl ProviderTier {
    /// Documented per-minute call limit for the tier.
    pub fn limit(&self) -> (u32, Duration) {
        let max_calls = match self {
            ProviderTier::Free => 100,
            ProviderTier::Basic => 200,
            ProviderTier::Standard => 400,
            ProviderTier::Premium => 600,
            ProviderTier::Vip => 800,
        };
        (max_calls, Duration::from_secs(60))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTier::Free => "free",
            ProviderTier::Basic => "basic",
            ProviderTier::Standard => "standard",
            ProviderTier::Premium => "premium",
            ProviderTier::Vip => "vip",
        }
    }
}

impl FromStr for ProviderTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "free" => Ok(ProviderTier::Free),
            "basic" => Ok(ProviderTier::Basic),
            "standard" => Ok(ProviderTier::Standard),
            "premium" => Ok(ProviderTier::Premium),
            "vip" => Ok(ProviderTier::Vip),
            other => Err(format!("unknown provider tier: {other}")),
        }
    }
}

/// Build a limiter for a tiered provider, applying the safety margin to leave
/// headroom below the documented cap. At least one call per window is always
/// admitted.
pub fn tiered_limiter(
    provider: &str,
    tier: ProviderTier,
    safety_margin: f64,
) -> Result<RateLimiter> {
    let (max_calls, window) = tier.limit();
    let effective = ((max_calls as f64 * safety_margin) as u32).max(1);
    info!(
        provider = %provider,
        tier = tier.as_str(),
        max_calls = effective,
        safety_margin,
        "Tiered rate limiter configured"
    );
    RateLimiter::new(
        effective,
        window,
        format!("{provider}({tier})", tier = tier.as_str()),
    )
}

/// One shared limiter per provider, constructed explicitly at startup and
/// injected into job handlers.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: DashMap::new(),
        }
    }

    /// Build the registry from configuration. Providers with an unknown tier
    /// fall back to Standard with a warning rather than failing startup;
    /// degenerate limits (zero calls or window) do fail it.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        let registry = Self::new();
        for (provider, limits) in &config.providers {
            let limiter = build_limiter(provider, limits, config.safety_margin)?;
            registry.limiters.insert(provider.clone(), Arc::new(limiter));
        }
        Ok(registry)
    }

    /// Shared limiter for a provider, if one is configured.
    pub fn get(&self, provider: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(provider).map(|entry| Arc::clone(&entry))
    }

    /// Register or replace a provider limiter.
    pub fn insert(&self, provider: impl Into<String>, limiter: RateLimiter) {
        self.limiters.insert(provider.into(), Arc::new(limiter));
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.limiters.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

fn build_limiter(
    provider: &str,
    limits: &ProviderLimitConfig,
    default_margin: f64,
) -> Result<RateLimiter> {
    let margin = limits.safety_margin.unwrap_or(default_margin);
    if let Some(tier_name) = &limits.tier {
        let tier = tier_name.parse::<ProviderTier>().unwrap_or_else(|_| {
            warn!(
                provider = %provider,
                tier = %tier_name,
                "Unknown provider tier, falling back to 'standard'"
            );
            ProviderTier::Standard
        });
        tiered_limiter(provider, tier, margin)
    } else {
        // Explicit limits are taken as already conservative; no margin applied.
        let max_calls = limits.max_calls.unwrap_or(60);
        let window = Duration::from_secs(limits.time_window_seconds.unwrap_or(60));
        RateLimiter::new(max_calls, window, provider.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_limits_scale_with_subscription() {
        assert_eq!(ProviderTier::Free.limit().0, 100);
        assert_eq!(ProviderTier::Vip.limit().0, 800);
        assert_eq!(ProviderTier::Standard.limit().1, Duration::from_secs(60));
    }

    #[test]
    fn safety_margin_shrinks_tiered_limits() {
        let limiter = tiered_limiter("tushare", ProviderTier::Standard, 0.8).unwrap();
        assert_eq!(limiter.max_calls(), 320);
        assert_eq!(limiter.time_window(), Duration::from_secs(60));
        assert_eq!(limiter.name(), "tushare(standard)");
    }

    #[test]
    fn margin_never_rounds_to_zero_calls() {
        let limiter = tiered_limiter("tiny", ProviderTier::Free, 0.001).unwrap();
        assert_eq!(limiter.max_calls(), 1);
    }

    #[test]
    fn registry_builds_default_providers() {
        let config = RateLimitConfig::default();
        let registry = RateLimiterRegistry::from_config(&config).unwrap();

        let tushare = registry.get("tushare").unwrap();
        // standard tier 400/min at 0.8 margin
        assert_eq!(tushare.max_calls(), 320);

        let akshare = registry.get("akshare").unwrap();
        assert_eq!(akshare.max_calls(), 60);

        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn degenerate_limits_fail_registry_construction() {
        let mut config = RateLimitConfig::default();
        config.providers.insert(
            "broken".to_string(),
            ProviderLimitConfig {
                max_calls: Some(0),
                ..Default::default()
            },
        );
        assert!(RateLimiterRegistry::from_config(&config).is_err());
    }

    #[test]
    fn unknown_tier_falls_back_to_standard() {
        let limits = ProviderLimitConfig {
            tier: Some("platinum".to_string()),
            ..Default::default()
        };
        let limiter = build_limiter("tushare", &limits, 0.8).unwrap();
        assert_eq!(limiter.max_calls(), 320);
    }

    #[tokio::test]
    async fn registry_hands_out_shared_instances() {
        let registry = RateLimiterRegistry::from_config(&RateLimitConfig::default()).unwrap();
        let a = registry.get("akshare").unwrap();
        let b = registry.get("akshare").unwrap();
        a.acquire().await;
        // Same underlying window: b observes a's admission.
        assert_eq!(b.get_stats().await.current_calls, 1);
    }
}
