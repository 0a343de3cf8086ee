use meter_domain::TimeWindow;
use serde::Deserialize;
use time::{Date, OffsetDateTime};
use time_tz::{OffsetDateTimeExt, Tz};

use super::PipelineError;

/// How civil dates are turned into instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAnchor {
    /// Local midnight in the configured zone (DST-aware).
    #[default]
    Civil,
    /// Midnight UTC, regardless of the configured zone.
    Utc,
}

/// Which days a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// The day before `today`.
    Daily,
    /// The whole calendar month before the one containing `today`.
    Monthly,
    /// Operator-chosen days, both ends inclusive.
    Range { first: Date, last: Date },
}

impl RunMode {
    /// Inclusive first and last civil day for this mode.
    pub fn days(&self, today: Date) -> Result<(Date, Date), PipelineError> {
        match *self {
            Self::Daily => {
                let yesterday = previous_day(today)?;
                Ok((yesterday, yesterday))
            }
            Self::Monthly => {
                let first_this_month = today
                    .replace_day(1)
                    .map_err(|e| PipelineError::Config(e.to_string()))?;
                let last = previous_day(first_this_month)?;
                let first = last
                    .replace_day(1)
                    .map_err(|e| PipelineError::Config(e.to_string()))?;
                Ok((first, last))
            }
            Self::Range { first, last } => Ok((first, last)),
        }
    }

    /// The run window, computed once before the per-point loop.
    pub fn window(
        &self,
        today: Date,
        anchor: WindowAnchor,
        zone: &Tz,
    ) -> Result<TimeWindow, PipelineError> {
        let (first, last) = self.days(today)?;
        let window = match anchor {
            WindowAnchor::Civil => TimeWindow::civil_days(first, last, zone)?,
            WindowAnchor::Utc => TimeWindow::utc_days(first, last)?,
        };
        Ok(window)
    }
}

/// The current civil date in `zone`.
pub fn civil_today(zone: &Tz) -> Date {
    OffsetDateTime::now_utc().to_timezone(zone).date()
}

fn previous_day(day: Date) -> Result<Date, PipelineError> {
    day.previous_day()
        .ok_or_else(|| PipelineError::Config(format!("no day before {day}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};
    use time_tz::timezones::db::europe::BRUSSELS;

    #[test]
    fn daily_covers_yesterday_in_civil_time() {
        let w = RunMode::Daily
            .window(date!(2025-03-31), WindowAnchor::Civil, BRUSSELS)
            .unwrap();
        assert_eq!(w.start(), datetime!(2025-03-29 23:00:00 UTC));
        assert_eq!(w.end(), datetime!(2025-03-30 22:00:00 UTC));
    }

    #[test]
    fn monthly_covers_previous_month() {
        let (first, last) = RunMode::Monthly.days(date!(2025-03-01)).unwrap();
        assert_eq!(first, date!(2025-02-01));
        assert_eq!(last, date!(2025-02-28));
    }

    #[test]
    fn monthly_wraps_year_boundary() {
        let w = RunMode::Monthly
            .window(date!(2025-01-17), WindowAnchor::Civil, BRUSSELS)
            .unwrap();
        assert_eq!(w.start(), datetime!(2024-11-30 23:00:00 UTC));
        assert_eq!(w.end(), datetime!(2024-12-31 23:00:00 UTC));
    }

    #[test]
    fn range_is_end_inclusive() {
        let mode = RunMode::Range {
            first: date!(2025-08-01),
            last: date!(2025-08-31),
        };
        let w = mode
            .window(date!(2025-10-01), WindowAnchor::Civil, BRUSSELS)
            .unwrap();
        assert_eq!(w.start(), datetime!(2025-07-31 22:00:00 UTC));
        assert_eq!(w.end(), datetime!(2025-08-31 22:00:00 UTC));
    }

    #[test]
    fn utc_anchor_uses_utc_midnights() {
        let mode = RunMode::Range {
            first: date!(2025-08-01),
            last: date!(2025-08-31),
        };
        let w = mode
            .window(date!(2025-10-01), WindowAnchor::Utc, BRUSSELS)
            .unwrap();
        assert_eq!(w.start(), datetime!(2025-08-01 00:00:00 UTC));
        assert_eq!(w.end(), datetime!(2025-09-01 00:00:00 UTC));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mode = RunMode::Range {
            first: date!(2025-08-31),
            last: date!(2025-08-01),
        };
        let res = mode.window(date!(2025-10-01), WindowAnchor::Civil, BRUSSELS);
        assert!(matches!(res, Err(PipelineError::Window(_))));
    }
}
