use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime, Time};

/// One month of a user's timeline and how many files it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub count: i64,
}

impl TimeBucket {
    pub fn key(&self) -> Result<String> {
        bucket_key(self.date)
    }
}

/// A timeline bucket with its comparison timestamp precomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedBucket {
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub count: i64,
    pub date_ms: i64,
}

impl TryFrom<TimeBucket> for LoadedBucket {
    type Error = anyhow::Error;

    fn try_from(bucket: TimeBucket) -> Result<Self> {
        Ok(Self {
            key: bucket.key()?,
            date_ms: unix_millis(bucket.date),
            date: bucket.date,
            count: bucket.count,
        })
    }
}

/// First through last instant of a calendar month, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl MonthWindow {
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// The month containing `date`, in `date`'s own offset.
pub fn month_window(date: OffsetDateTime) -> Result<MonthWindow> {
    let first = date
        .date()
        .replace_day(1)
        .map_err(|err| anyhow!("invalid bucket date {}: {}", date, err))?;
    let (next_year, next_month) = match first.month() {
        time::Month::December => (first.year() + 1, time::Month::January),
        month => (first.year(), month.next()),
    };
    let next_first = Date::from_calendar_date(next_year, next_month, 1)
        .map_err(|err| anyhow!("invalid bucket date {}: {}", date, err))?;

    let start = first.with_time(Time::MIDNIGHT).assume_offset(date.offset());
    let end = next_first.with_time(Time::MIDNIGHT).assume_offset(date.offset())
        - Duration::milliseconds(1);

    Ok(MonthWindow { start, end })
}

pub fn bucket_key(date: OffsetDateTime) -> Result<String> {
    date.format(&Rfc3339)
        .map_err(|err| anyhow!("cannot format bucket date {}: {}", date, err))
}

pub fn unix_millis(date: OffsetDateTime) -> i64 {
    (date.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn leap_february_ends_on_the_29th() {
        let window = month_window(datetime!(2024-02-14 08:30 UTC)).unwrap();
        assert_eq!(window.start, datetime!(2024-02-01 00:00 UTC));
        assert_eq!(window.end, datetime!(2024-02-29 23:59:59.999 UTC));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let window = month_window(datetime!(2023-12-31 23:00 UTC)).unwrap();
        assert_eq!(window.start, datetime!(2023-12-01 00:00 UTC));
        assert_eq!(window.end, datetime!(2023-12-31 23:59:59.999 UTC));
        assert!(window.contains(datetime!(2023-12-31 23:59:59.5 UTC)));
        assert!(!window.contains(datetime!(2024-01-01 00:00 UTC)));
    }

    #[test]
    fn window_keeps_the_source_offset() {
        let window = month_window(datetime!(2024-06-10 12:00 +02:00)).unwrap();
        assert_eq!(window.start, datetime!(2024-06-01 00:00 +02:00));
    }

    #[test]
    fn loaded_bucket_carries_key_and_millis() {
        let bucket = TimeBucket {
            date: datetime!(2024-03-01 00:00 UTC),
            count: 12,
        };
        let loaded = LoadedBucket::try_from(bucket).unwrap();
        assert_eq!(loaded.key, "2024-03-01T00:00:00Z");
        assert_eq!(loaded.date_ms, 1_709_251_200_000);
        assert_eq!(loaded.count, 12);
    }
}
