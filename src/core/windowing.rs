//! Trailing time window used to scope history, assessment and chat queries.
//!
//! The window always ends at the call time and looks back a fixed duration
//! (three days by default). The start bound is inclusive.

use crate::core::reading::Reading;
use chrono::{DateTime, Duration, Utc};

/// Default lookback in days.
pub const DEFAULT_WINDOW_DAYS: i64 = 3;

/// A lookback window relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentWindow {
    lookback: Duration,
}

impl Default for RecentWindow {
    fn default() -> Self {
        Self::days(DEFAULT_WINDOW_DAYS)
    }
}

impl RecentWindow {
    pub fn new(lookback: Duration) -> Self {
        Self { lookback }
    }

    /// Lookback of `days` days, saturating at the largest representable span.
    pub fn days(days: i64) -> Self {
        Self::new(Duration::try_days(days).unwrap_or(Duration::MAX))
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// First instant inside the window ending at `now`.
    ///
    /// Clamps to the earliest representable instant when the lookback reaches
    /// past it.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.lookback).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Check if a timestamp falls within the window ending at `now`.
    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        timestamp >= self.start(now)
    }
}

/// Most recent `limit` readings, newest first.
///
/// The sort is stable, so readings sharing a timestamp keep their
/// insertion order.
pub fn most_recent(readings: &[Reading], limit: usize) -> Vec<Reading> {
    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    ordered.into_iter().take(limit).cloned().collect()
}
