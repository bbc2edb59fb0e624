//! Trigger specifications for scheduled jobs.
//!
//! Two shapes: cron expressions (seconds-resolution, parsed by the `cron`
//! crate) and fixed intervals. A bad cron expression fails the call that
//! supplied it; nothing is registered on parse failure.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum TriggerSpec {
    /// Cron schedule, e.g. `"0 30 9 * * Mon-Fri *"`.
    Cron(Box<Schedule>),
    /// Fixed interval between fires.
    Interval(Duration),
}

impl TriggerSpec {
    /// Parse a cron expression. Returns `ConfigurationError` on a malformed
    /// expression so the caller can reject the job without registering it.
    pub fn cron(expression: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| {
            CoreError::ConfigurationError(format!("invalid cron expression '{expression}': {e}"))
        })?;
        Ok(TriggerSpec::Cron(Box::new(schedule)))
    }

    pub fn interval_secs(seconds: u64) -> Result<Self> {
        if seconds == 0 {
            return Err(CoreError::ConfigurationError(
                "interval triggers require a nonzero period".to_string(),
            ));
        }
        Ok(TriggerSpec::Interval(Duration::seconds(seconds as i64)))
    }

    pub fn interval(duration: Duration) -> Result<Self> {
        if duration <= Duration::zero() {
            return Err(CoreError::ConfigurationError(
                "interval triggers require a positive period".to_string(),
            ));
        }
        Ok(TriggerSpec::Interval(duration))
    }

    /// Next fire time strictly after `after`. Cron schedules can run out
    /// (e.g. a fixed-date expression in the past); intervals never do.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TriggerSpec::Cron(schedule) => schedule.after(&after).next(),
            TriggerSpec::Interval(period) => Some(after + *period),
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSpec::Cron(schedule) => write!(f, "cron[{schedule}]"),
            TriggerSpec::Interval(period) => write!(f, "interval[{}s]", period.num_seconds()),
        }
    }
}
