use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use regex::Regex;
use tracing::{debug, info};

use super::gtfs::{StaticSchedule, TripRecord};
use super::keys::{GtfsTripKey, LiveTripKey};
use crate::error::ScheduleError;

pub const DEFAULT_TRIP_KEY_PATTERN: &str = r"^(?P<sid>[0-9]+)_(?P<oid>[0-9]+)";
pub const DEFAULT_DAY_OFFSET_PATTERN: &str = r"(?P<days>[+-][0-9]+)D$";
pub const DEFAULT_ORDER_COLUMN: &str = "plk_order";

/// Where a static trip carries its live schedule and order ids.
#[derive(Debug, Clone)]
pub enum LiveKeyRule {
    /// Regex over `trip_id` with named groups `sid` and `oid`.
    TripIdPattern(Regex),
    /// Explicit `trips.txt` columns.
    Columns { schedule_id: String, order_id: String },
}

impl LiveKeyRule {
    pub(crate) fn ids_from_trip_id(re: &Regex, trip_id: &str) -> Option<(i64, i64)> {
        let caps = re.captures(trip_id)?;
        let sid = caps.name("sid")?.as_str().parse().ok()?;
        let oid = caps.name("oid")?.as_str().parse().ok()?;
        Some((sid, oid))
    }
}

/// Conventions used to join the static schedule to live identifiers.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub live_key: LiveKeyRule,
    /// Regex over `service_id` with a named group `days`: how many days the
    /// GTFS service date lies after the live operating date.
    pub day_offset: Regex,
    /// `stop_times.txt` column holding the live order number.
    pub order_column: String,
}

impl IndexConfig {
    pub fn new(
        trip_key_pattern: &str,
        day_offset_pattern: &str,
        order_column: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            live_key: LiveKeyRule::TripIdPattern(Regex::new(trip_key_pattern)?),
            day_offset: Regex::new(day_offset_pattern)?,
            order_column: order_column.to_string(),
        })
    }

    /// Day offset encoded in `service_id`; zero when the pattern does not match.
    pub fn offset_days(&self, service_id: &str) -> Result<i64, ScheduleError> {
        let Some(caps) = self.day_offset.captures(service_id) else {
            return Ok(0);
        };
        let malformed = || ScheduleError::InvalidDayOffset {
            service_id: service_id.to_string(),
        };
        let days = caps.name("days").ok_or_else(malformed)?.as_str();
        days.parse::<i64>()
            .ok()
            .filter(|d| d.unsigned_abs() <= 366)
            .ok_or_else(malformed)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            live_key: LiveKeyRule::TripIdPattern(
                Regex::new(DEFAULT_TRIP_KEY_PATTERN).expect("default trip key pattern is valid"),
            ),
            day_offset: Regex::new(DEFAULT_DAY_OFFSET_PATTERN)
                .expect("default day offset pattern is valid"),
            order_column: DEFAULT_ORDER_COLUMN.to_string(),
        }
    }
}

/// A stop of a static trip, addressed by its live order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTimeEntry {
    pub trip: GtfsTripKey,
    pub stop_sequence: u32,
    pub stop_id: Arc<str>,
}

/// Everything the static schedule knows about one live train run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripBucket {
    /// Static trips representing the run (several for split legs), sorted.
    pub all: Vec<GtfsTripKey>,
    pub by_order_number: HashMap<u32, StopTimeEntry>,
}

/// Read-only lookup from live identifiers to static trips.
#[derive(Debug, Default)]
pub struct ScheduleIndex {
    by_live_key: HashMap<LiveTripKey, TripBucket>,
    valid_operating_dates: HashSet<NaiveDate>,
}

impl ScheduleIndex {
    /// Loads the GTFS feed at `path` and indexes it.
    pub fn from_path(path: &Path, config: &IndexConfig) -> Result<Self, ScheduleError> {
        let schedule = StaticSchedule::load(path, config)?;
        Self::build(&schedule, config)
    }

    /// Registers every trip under the live key of each date it operates on.
    pub fn build(schedule: &StaticSchedule, config: &IndexConfig) -> Result<Self, ScheduleError> {
        let mut by_live_key: HashMap<LiveTripKey, TripBucket> = HashMap::new();
        let mut registrations: HashMap<&str, Vec<(LiveTripKey, GtfsTripKey)>> = HashMap::new();

        for trip in &schedule.trips {
            let dates = schedule.services.get(&trip.service_id).ok_or_else(|| {
                ScheduleError::UnknownService {
                    trip_id: trip.trip_id.clone(),
                    service_id: trip.service_id.clone(),
                }
            })?;
            let offset = config.offset_days(&trip.service_id)?;
            let trip_id: Arc<str> = Arc::from(trip.trip_id.as_str());

            for &gtfs_date in dates {
                let key = live_key(trip, gtfs_date, offset)?;
                let gtfs_key = GtfsTripKey::new(trip_id.clone(), gtfs_date);

                let bucket = by_live_key.entry(key).or_default();
                if !bucket.all.contains(&gtfs_key) {
                    bucket.all.push(gtfs_key.clone());
                }
                registrations
                    .entry(trip.trip_id.as_str())
                    .or_default()
                    .push((key, gtfs_key));
            }
        }

        let mut stop_ids: HashMap<&str, Arc<str>> = HashMap::new();
        for st in &schedule.stop_times {
            let Some(registered) = registrations.get(st.trip_id.as_str()) else {
                continue;
            };
            let stop_id = stop_ids
                .entry(st.stop_id.as_str())
                .or_insert_with(|| Arc::from(st.stop_id.as_str()))
                .clone();

            for (key, gtfs_key) in registered {
                if let Some(bucket) = by_live_key.get_mut(key) {
                    bucket.by_order_number.insert(
                        st.order_number,
                        StopTimeEntry {
                            trip: gtfs_key.clone(),
                            stop_sequence: st.stop_sequence,
                            stop_id: stop_id.clone(),
                        },
                    );
                }
            }
        }

        for bucket in by_live_key.values_mut() {
            bucket.all.sort();
        }

        let mut valid_operating_dates: HashSet<NaiveDate> =
            by_live_key.keys().map(|k| k.operating_date).collect();
        if let Some(window) = schedule.window {
            debug!(start = %window.start, end = %window.end, "Feed validity window");
            valid_operating_dates.extend(window.start.iter_days().take_while(|d| *d <= window.end));
        }

        info!(
            live_keys = by_live_key.len(),
            operating_dates = valid_operating_dates.len(),
            "Schedule index built"
        );

        Ok(Self {
            by_live_key,
            valid_operating_dates,
        })
    }

    pub fn get(&self, key: &LiveTripKey) -> Option<&TripBucket> {
        self.by_live_key.get(key)
    }

    pub fn is_valid_operating_date(&self, date: NaiveDate) -> bool {
        self.valid_operating_dates.contains(&date)
    }

    pub fn valid_operating_dates(&self) -> &HashSet<NaiveDate> {
        &self.valid_operating_dates
    }

    pub fn len(&self) -> usize {
        self.by_live_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_live_key.is_empty()
    }
}

fn live_key(
    trip: &TripRecord,
    gtfs_date: NaiveDate,
    offset: i64,
) -> Result<LiveTripKey, ScheduleError> {
    let days = Days::new(offset.unsigned_abs());
    let operating_date = if offset >= 0 {
        gtfs_date.checked_sub_days(days)
    } else {
        gtfs_date.checked_add_days(days)
    }
    .ok_or_else(|| ScheduleError::InvalidDayOffset {
        service_id: trip.service_id.clone(),
    })?;
    Ok(LiveTripKey::new(trip.schedule_id, trip.order_id, operating_date))
}
