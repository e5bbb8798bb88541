//! Sampling windows.
//!
//! A [`TimeRange`] is created once per tick and shared read-only with every
//! query execution of that tick.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// Default width of the sampled window (1 minute).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Closed `[start, end]` window for one range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Build the window ending at `now` and reaching `window` into the past.
    ///
    /// A zero `window` is rejected by config validation, so callers going
    /// through [`crate::config::AppConfig`] always get `start < end`.
    pub fn generate(now: DateTime<Utc>, window: Duration) -> Self {
        let delta = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let start = now.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Window start in whole Unix seconds.
    pub fn start_unix(&self) -> i64 {
        self.start.timestamp()
    }

    /// Window end in whole Unix seconds.
    pub fn end_unix(&self) -> i64 {
        self.end.timestamp()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
