//! # Provider Rate Limiting
//!
//! Sliding-window admission control bounding outbound calls per data provider.
//! One [`RateLimiter`] instance is shared by every concurrent caller of a
//! provider; `acquire()` suspends the caller until admitting it cannot push the
//! trailing-window call count above the configured limit.
//!
//! Provider-specific limits come from configuration: either a named capacity
//! tier multiplied by a safety margin (leaving headroom below the provider's
//! documented cap) or an explicit calls-per-window pair. Instances are built
//! once at startup by [`RateLimiterRegistry`] and injected into job handlers,
//! never held as module-level singletons.

pub mod provider;
pub mod sliding_window;

pub use provider::{ProviderTier, RateLimiterRegistry};
pub use sliding_window::{RateLimiter, RateLimiterStats};
