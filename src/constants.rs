//! # System Constants
//!
//! Core constants and enums that define the operational boundaries of the
//! execution control plane: execution statuses, operator actions, market and
//! data-type classification, and system-wide defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a single job execution.
///
/// `Running` is the only non-terminal state. `Missed` is recorded when the
/// dispatcher could not start a run within its misfire grace window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Missed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Missed => "missed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "missed" => Ok(ExecutionStatus::Missed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Operator actions recorded in the audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Pause,
    Resume,
    Trigger,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Trigger => "trigger",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market classification used by the cache TTL policy. Faster-moving markets
/// get shorter TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    China,
    Us,
}

impl Market {
    /// Classify a symbol: six-digit numeric codes are mainland China listings,
    /// everything else is treated as US.
    pub fn from_symbol(symbol: &str) -> Self {
        if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_digit()) {
            Market::China
        } else {
            Market::Us
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::China => "china",
            Market::Us => "us",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Well-known cache data-type categories used for per-category statistics.
pub mod data_types {
    pub const STOCK_DATA: &str = "stock_data";
    pub const NEWS_DATA: &str = "news_data";
    pub const FUNDAMENTALS_DATA: &str = "fundamentals_data";

    pub const ALL: &[&str] = &[STOCK_DATA, NEWS_DATA, FUNDAMENTALS_DATA];
}

/// System-wide default values.
pub mod system {
    /// Default TTL applied when no policy entry matches (seconds).
    pub const DEFAULT_TTL_SECONDS: u64 = 7200;

    /// Dispatcher tick interval (milliseconds).
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

    /// Grace window after the scheduled fire time before a run is recorded
    /// as missed instead of started (seconds).
    pub const DEFAULT_MISFIRE_GRACE_SECONDS: u64 = 60;

    /// Interval between zombie sweeps (seconds).
    pub const DEFAULT_ZOMBIE_SWEEP_INTERVAL_SECONDS: u64 = 300;

    /// A Running row not updated within this many minutes is flipped to
    /// Failed by the sweep.
    pub const DEFAULT_ZOMBIE_THRESHOLD_MINUTES: u64 = 30;

    /// Default safety margin applied to tiered provider limits.
    pub const DEFAULT_SAFETY_MARGIN: f64 = 0.8;

    /// Job id of the built-in zombie sweep job.
    pub const ZOMBIE_SWEEP_JOB_ID: &str = "check_zombie_executions";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_round_trips_through_str() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
            ExecutionStatus::Missed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Missed.is_terminal());
    }

    #[test]
    fn market_classification_from_symbol() {
        assert_eq!(Market::from_symbol("000001"), Market::China);
        assert_eq!(Market::from_symbol("600519"), Market::China);
        assert_eq!(Market::from_symbol("AAPL"), Market::Us);
        assert_eq!(Market::from_symbol("BRK.B"), Market::Us);
        // Five digits is not a mainland code
        assert_eq!(Market::from_symbol("00700"), Market::Us);
    }
}
