//! Date and instant parsing shared by the schedule loader and the live feeds.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

/// Default civil timezone of the live feeds.
pub const FEED_TIMEZONE: Tz = chrono_tz::Europe::Warsaw;

/// Parses a GTFS `YYYYMMDD` date.
pub fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

/// Parses the calendar date from the first ten characters of a live
/// `operating date`, which may carry a time part (`2026-01-05T00:00:00`).
pub fn parse_operating_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Parses an ISO-8601 instant. Timestamps without an explicit offset are
/// civil times in `tz`; an ambiguous civil time resolves to the earlier
/// instant.
///
/// A civil time skipped by a forward transition is read with the offset in
/// force before it, so `02:30` on a spring-forward night becomes `03:30`.
pub fn parse_instant(s: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t);
    }

    let naive: NaiveDateTime = s.parse().ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|t| t.fixed_offset())
}
