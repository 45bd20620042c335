//! Static schedule side of the live-to-static join.
//!
//! [`StaticSchedule`] holds the raw GTFS rows, and [`ScheduleIndex`] is built
//! from it exactly once. The index is never mutated afterwards: matchers only
//! borrow it.

mod gtfs;
mod index;
mod keys;

pub use gtfs::{FeedWindow, StaticSchedule, StopTimeRecord, TripRecord};
pub use index::{
    DEFAULT_DAY_OFFSET_PATTERN, DEFAULT_ORDER_COLUMN, DEFAULT_TRIP_KEY_PATTERN, IndexConfig,
    LiveKeyRule, ScheduleIndex, StopTimeEntry, TripBucket,
};
pub use keys::{GtfsTripKey, LiveTripKey};
