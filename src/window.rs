use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{MothballError, Result};

/// Span of the extended backlog tier past the regular threshold.
pub const EXTENDED_BACKLOG_SPAN_HOURS: f64 = 7.0 * 24.0;

/// Tolerance applied to both backlog tiers. Backlog sweeps run four times a
/// day, so they absorb far more jitter than the hourly band.
pub const BACKLOG_TOLERANCE_HOURS: f64 = 24.0;

/// A scan window expressed in hours-before-now.
///
/// Resolved against a concrete `now` by [`bounds`](ArchiveWindow::bounds):
/// the lower bound is `now - (max_hours + tolerance_hours)` (exclusive), the
/// upper bound `now - min_hours` (inclusive). The tolerance widens the window
/// toward older records only, so a tick that fires late still catches its
/// band but a record is never picked before its window opens. The exclusive
/// lower bound lets adjacent windows partition the timeline with no instant
/// falling into two of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArchiveWindow {
    pub min_hours: f64,
    pub max_hours: f64,
    pub tolerance_hours: f64,
}

impl ArchiveWindow {
    /// Window over an explicit `[min_hours, max_hours]` age range.
    pub fn range(min_hours: f64, max_hours: f64, tolerance_hours: f64) -> Self {
        Self {
            min_hours,
            max_hours,
            tolerance_hours,
        }
    }

    /// The steady-state hourly band: records last contacted between
    /// `hours_threshold - tolerance` and `hours_threshold + tolerance` hours
    /// ago. At the 48h/0.5h defaults that is the 47.5h-48.5h band, one hour
    /// wide to match the hourly cadence.
    pub fn regular(hours_threshold: u32, tolerance_hours: f64) -> Self {
        let threshold = f64::from(hours_threshold);
        Self {
            min_hours: (threshold - tolerance_hours).max(0.0),
            max_hours: threshold,
            tolerance_hours,
        }
    }

    /// Extended backlog tier: opens exactly where the regular band closes
    /// (`hours_threshold + tolerance`) and reaches seven days past the
    /// threshold. Recovers records missed by short outages.
    pub fn extended_backlog(hours_threshold: u32, tolerance_hours: f64) -> Self {
        let threshold = f64::from(hours_threshold);
        Self {
            min_hours: threshold + tolerance_hours,
            max_hours: threshold + EXTENDED_BACKLOG_SPAN_HOURS,
            tolerance_hours: BACKLOG_TOLERANCE_HOURS,
        }
    }

    /// Old backlog tier: seven days back to `max_backlog_age_days`. Heavier
    /// sweep for long outages; only run in aggressive mode.
    pub fn old_backlog(max_backlog_age_days: u32) -> Self {
        Self {
            min_hours: EXTENDED_BACKLOG_SPAN_HOURS,
            max_hours: f64::from(max_backlog_age_days) * 24.0,
            tolerance_hours: BACKLOG_TOLERANCE_HOURS,
        }
    }

    /// Resolve to `(lower, upper)` timestamps against `now`; lower bound
    /// exclusive, upper bound inclusive.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lower = now - duration_from_hours(self.max_hours + self.tolerance_hours);
        let upper = now - duration_from_hours(self.min_hours);
        (lower, upper)
    }

    /// Rejects windows that could not select anything or run backwards.
    pub fn validate(&self) -> Result<()> {
        if self.min_hours < 0.0 || self.max_hours < 0.0 || self.tolerance_hours < 0.0 {
            return Err(MothballError::Settings(
                "window hours must not be negative".to_string(),
            ));
        }
        if self.max_hours <= self.min_hours {
            return Err(MothballError::Settings(format!(
                "max_hours ({}) must be greater than min_hours ({})",
                self.max_hours, self.min_hours
            )));
        }
        Ok(())
    }
}

/// Fractional hours to a chrono duration, rounded to whole milliseconds.
pub fn duration_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
