//! # Sliding-Window Rate Limiter
//!
//! Maintains an ordered sequence of admission timestamps per limiter. On each
//! `acquire()`, timestamps older than the trailing window are purged; when the
//! window is full the caller sleeps until the oldest admission ages out, then
//! re-purges and admits. The purge-check-admit sequence runs as one critical
//! section, so two concurrent callers can never both be admitted past the limit.

use crate::error::{CoreError, Result};
use crate::logging::log_provider_operation;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Buffer added to computed waits so a re-check lands strictly after the
/// oldest admission expires.
const WAIT_BUFFER: Duration = Duration::from_millis(10);

#[derive(Debug, Default, Clone)]
struct WindowState {
    /// Admission timestamps, oldest first, strictly non-decreasing.
    calls: VecDeque<Instant>,
    total_calls: u64,
    total_waits: u64,
    total_wait_time: Duration,
}

impl WindowState {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Stats snapshot returned by [`RateLimiter::get_stats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RateLimiterStats {
    pub name: String,
    pub max_calls: u32,
    pub time_window_seconds: f64,
    /// Admissions currently inside the trailing window.
    pub current_calls: usize,
    pub total_calls: u64,
    pub total_waits: u64,
    pub total_wait_time_seconds: f64,
    pub avg_wait_time_seconds: f64,
}

/// Shared per-provider sliding-window admission control.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_calls: u32,
    time_window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `max_calls` per trailing
    /// `time_window`. Both bounds must be positive.
    pub fn new(max_calls: u32, time_window: Duration, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if max_calls == 0 {
            return Err(CoreError::ConfigurationError(format!(
                "rate limiter '{name}': max_calls must be greater than zero"
            )));
        }
        if time_window.is_zero() {
            return Err(CoreError::ConfigurationError(format!(
                "rate limiter '{name}': time_window must be greater than zero"
            )));
        }
        info!(
            limiter = %name,
            max_calls,
            time_window_seconds = time_window.as_secs_f64(),
            "🔧 Rate limiter initialized"
        );
        Ok(Self {
            name,
            max_calls,
            time_window,
            state: Mutex::new(WindowState::default()),
        })
    }

    /// Suspend until a call can be admitted without exceeding the window
    /// limit, then record the admission. Never fails, only delays; the wait is
    /// self-bounded by the window length.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let mut now = Instant::now();
        state.purge(now, self.time_window);

        if state.calls.len() >= self.max_calls as usize {
            // Window is full: wait until the oldest admission ages out.
            let oldest = *state
                .calls
                .front()
                .expect("full window always has an oldest admission");
            let wait = (oldest + self.time_window + WAIT_BUFFER).saturating_duration_since(now);

            if wait > Duration::ZERO {
                state.total_waits += 1;
                state.total_wait_time += wait;
                log_provider_operation(
                    "acquire",
                    &self.name,
                    "throttled",
                    Some(wait.as_millis() as u64),
                    None,
                );
                // The lock is held through the sleep: the computed wait must
                // reflect window state as observed at lock acquisition, and
                // admissions stay strictly ordered.
                tokio::time::sleep(wait).await;
                now = Instant::now();
                state.purge(now, self.time_window);
            }
        }

        state.calls.push_back(now);
        state.total_calls += 1;
    }

    /// Snapshot of current occupancy and cumulative counters.
    pub async fn get_stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().await;
        state.purge(Instant::now(), self.time_window);
        let total_wait = state.total_wait_time.as_secs_f64();
        RateLimiterStats {
            name: self.name.clone(),
            max_calls: self.max_calls,
            time_window_seconds: self.time_window.as_secs_f64(),
            current_calls: state.calls.len(),
            total_calls: state.total_calls,
            total_waits: state.total_waits,
            total_wait_time_seconds: total_wait,
            avg_wait_time_seconds: if state.total_waits > 0 {
                total_wait / state.total_waits as f64
            } else {
                0.0
            },
        }
    }

    /// Zero the cumulative counters. The admission window itself is untouched
    /// so the limit keeps holding.
    pub async fn reset_stats(&self) {
        let mut state = self.state.lock().await;
        state.total_calls = 0;
        state.total_waits = 0;
        state.total_wait_time = Duration::ZERO;
        info!(limiter = %self.name, "🔄 Rate limiter stats reset");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn time_window(&self) -> Duration {
        self.time_window
    }
}
