use std::collections::HashMap;

use chrono::NaiveDate;

use crate::schedule::{
    FeedWindow, IndexConfig, ScheduleIndex, StaticSchedule, StopTimeRecord, TripRecord,
};

pub(crate) fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

fn trip(trip_id: &str, service_id: &str, sid: i64, oid: i64) -> TripRecord {
    TripRecord {
        trip_id: trip_id.into(),
        service_id: service_id.into(),
        schedule_id: sid,
        order_id: oid,
    }
}

fn stop(trip_id: &str, seq: u32, stop_id: &str, order: u32) -> StopTimeRecord {
    StopTimeRecord {
        trip_id: trip_id.into(),
        stop_sequence: seq,
        stop_id: stop_id.into(),
        order_number: order,
    }
}

/// Feed valid 5th..=10th January 2026, service on the 5th and 6th.
///
/// Train 1/2 is trip `1_2`. Train 5/6 is split into legs `5_6_A`
/// (orders 1-2) and `5_6_B` (orders 3-4).
pub(crate) fn sample_index() -> ScheduleIndex {
    let schedule = StaticSchedule {
        window: Some(FeedWindow {
            start: date(5),
            end: date(10),
        }),
        services: HashMap::from([("C".to_string(), vec![date(5), date(6)])]),
        trips: vec![
            trip("1_2", "C", 1, 2),
            trip("5_6_A", "C", 5, 6),
            trip("5_6_B", "C", 5, 6),
        ],
        stop_times: vec![
            stop("1_2", 1, "100", 1),
            stop("1_2", 2, "200", 3),
            stop("1_2", 3, "300", 5),
            stop("5_6_A", 1, "100", 1),
            stop("5_6_A", 2, "200", 2),
            stop("5_6_B", 1, "200", 3),
            stop("5_6_B", 2, "300", 4),
        ],
    };
    ScheduleIndex::build(&schedule, &IndexConfig::default()).unwrap()
}

/// Same window, plus night train 7/8 (trip `7_8`, service `N+1D`) whose GTFS
/// date is the window's first day, so its live operating date is the 4th.
pub(crate) fn night_index() -> ScheduleIndex {
    let schedule = StaticSchedule {
        window: Some(FeedWindow {
            start: date(5),
            end: date(10),
        }),
        services: HashMap::from([
            ("C".to_string(), vec![date(5)]),
            ("N+1D".to_string(), vec![date(5)]),
        ]),
        trips: vec![trip("1_2", "C", 1, 2), trip("7_8", "N+1D", 7, 8)],
        stop_times: vec![stop("7_8", 1, "700", 1), stop("7_8", 2, "800", 2)],
    };
    ScheduleIndex::build(&schedule, &IndexConfig::default()).unwrap()
}
