use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

/// One train run as the live system identifies it.
///
/// `operating_date` is the live "timetable day", which differs from the GTFS
/// service date for runs shifted across midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveTripKey {
    pub schedule_id: i64,
    pub order_id: i64,
    pub operating_date: NaiveDate,
}

impl LiveTripKey {
    pub fn new(schedule_id: i64, order_id: i64, operating_date: NaiveDate) -> Self {
        Self {
            schedule_id,
            order_id,
            operating_date,
        }
    }
}

impl fmt::Display for LiveTripKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.schedule_id, self.order_id, self.operating_date
        )
    }
}

/// One realized trip instance of the static schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GtfsTripKey {
    pub trip_id: Arc<str>,
    pub start_date: NaiveDate,
}

impl GtfsTripKey {
    pub fn new(trip_id: impl Into<Arc<str>>, start_date: NaiveDate) -> Self {
        Self {
            trip_id: trip_id.into(),
            start_date,
        }
    }

    /// `start_date` in the `YYYYMMDD` form GTFS-Realtime expects.
    pub fn gtfs_start_date(&self) -> String {
        self.start_date.format("%Y%m%d").to_string()
    }
}
