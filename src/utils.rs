// Utility functions
use chrono::{DateTime, NaiveDate, NaiveTime};

/// Exchange-local calendar date of a unix timestamp, given the exchange's UTC offset in seconds.
pub fn date_from_unix(timestamp: i64, utc_offset_secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + utc_offset_secs, 0).map(|dt| dt.date_naive())
}

/// Unix timestamp of midnight UTC at the start of `date`.
pub fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}
