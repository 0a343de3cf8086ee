use time::{
    format_description::well_known::Rfc3339, Date, OffsetDateTime, PrimitiveDateTime, Time,
    UtcOffset,
};
use time_tz::{PrimitiveDateTimeExt, TimeZone};

use super::DomainError;

/// Half-open `[start, end)` interval, always held as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl TimeWindow {
    /// Window from explicit instants. Any offset is accepted and normalized to UTC.
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, DomainError> {
        let start = start.to_offset(UtcOffset::UTC);
        let end = end.to_offset(UtcOffset::UTC);
        if start >= end {
            return Err(DomainError::EmptyWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Civil days `first..=last` in `tz`, anchored at local midnight.
    ///
    /// The exclusive end is the midnight following `last`, so a single day
    /// spans 23, 24 or 25 hours depending on the DST transitions it contains.
    pub fn civil_days<T: TimeZone>(first: Date, last: Date, tz: &T) -> Result<Self, DomainError> {
        let after_last = day_after(first, last)?;
        Self::new(local_midnight(first, tz)?, local_midnight(after_last, tz)?)
    }

    /// Days `first..=last` anchored at UTC midnight.
    pub fn utc_days(first: Date, last: Date) -> Result<Self, DomainError> {
        let after_last = day_after(first, last)?;
        Self::new(
            PrimitiveDateTime::new(first, Time::MIDNIGHT).assume_utc(),
            PrimitiveDateTime::new(after_last, Time::MIDNIGHT).assume_utc(),
        )
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// RFC 3339 renderings of both bounds, e.g. `2025-03-29T23:00:00Z`.
    pub fn rfc3339_bounds(&self) -> Result<(String, String), DomainError> {
        let fmt = |t: OffsetDateTime| t.format(&Rfc3339).map_err(|e| DomainError::Format(e.to_string()));
        Ok((fmt(self.start)?, fmt(self.end)?))
    }
}

fn day_after(first: Date, last: Date) -> Result<Date, DomainError> {
    if first > last {
        return Err(DomainError::InvertedDays {
            first: first.to_string(),
            last: last.to_string(),
        });
    }
    last.next_day()
        .ok_or_else(|| DomainError::EndOfCalendar(last.to_string()))
}

fn local_midnight<T: TimeZone>(day: Date, tz: &T) -> Result<OffsetDateTime, DomainError> {
    PrimitiveDateTime::new(day, Time::MIDNIGHT)
        .assume_timezone(tz)
        .take_first()
        .ok_or_else(|| DomainError::NonexistentMidnight(day.to_string()))
}
