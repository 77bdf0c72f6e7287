use std::fmt;

use time::{Date, Duration, OffsetDateTime, UtcOffset, macros::offset};

/// The platform publishes timestamps in Korean Standard Time.
pub const PLATFORM_OFFSET: UtcOffset = offset!(+9);

/// A `[cutoff, until)` publish-time range. `until` is open when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: Date,
    end: Option<Date>,
}

impl DateWindow {
    pub fn since(start: Date) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: Date, end: Date) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Inclusive lower bound, midnight of the start date.
    pub fn cutoff(&self) -> OffsetDateTime {
        self.start.midnight().assume_offset(PLATFORM_OFFSET)
    }

    /// Exclusive upper bound, midnight of the end date.
    pub fn until(&self) -> Option<OffsetDateTime> {
        self.end
            .map(|end| end.midnight().assume_offset(PLATFORM_OFFSET))
    }

    /// One-day windows covering `[start, end)`, newest first.
    pub fn daily_chunks(start: Date, end: Date) -> DailyChunks {
        DailyChunks { start, next_end: end }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{} ~ {}", self.start, end),
            None => write!(f, "{} ~", self.start),
        }
    }
}

pub struct DailyChunks {
    start: Date,
    next_end: Date,
}

impl Iterator for DailyChunks {
    type Item = DateWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_end <= self.start {
            return None;
        }
        let end = self.next_end;
        let start = end.checked_sub(Duration::DAY)?;
        self.next_end = start;
        Some(DateWindow::between(start, end))
    }
}

/// Formats a millisecond epoch timestamp as a `YYYY-MM-DD` platform date.
pub fn date_from_millis(millis: i64) -> Option<String> {
    datetime_from_millis(millis).map(|at| at.date().to_string())
}

pub fn datetime_from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .map(|at| at.to_offset(PLATFORM_OFFSET))
}

/// Today's date on the platform's clock.
pub fn today() -> Date {
    OffsetDateTime::now_utc().to_offset(PLATFORM_OFFSET).date()
}
