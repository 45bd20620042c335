//! Matcher output: typed facts and their GTFS-Realtime and JSON renderings.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde_json::{Value, json};

use crate::gtfs_rt::{self, trip_descriptor, trip_update};
use crate::schedule::GtfsTripKey;

/// Language tag of upstream alert texts.
pub const ALERT_LANGUAGE: &str = "pl";

/// Live state of one stop of a trip. Stop identity comes from the schedule
/// index, never from the live payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StopDelay {
    pub stop_id: Arc<str>,
    pub stop_sequence: u32,
    pub cancelled: bool,
    pub confirmed: bool,
    pub live_arrival: Option<DateTime<FixedOffset>>,
    pub live_departure: Option<DateTime<FixedOffset>>,
}

impl StopDelay {
    fn to_json(&self) -> Value {
        json!({
            "stop_id": &*self.stop_id,
            "stop_sequence": self.stop_sequence,
            "confirmed": self.confirmed,
            "cancelled": self.cancelled,
            "arrival": self.live_arrival.map(|t| t.to_rfc3339()),
            "departure": self.live_departure.map(|t| t.to_rfc3339()),
        })
    }

    fn to_update(&self) -> trip_update::StopTimeUpdate {
        use trip_update::stop_time_update::ScheduleRelationship;

        let mut update = trip_update::StopTimeUpdate {
            stop_sequence: Some(self.stop_sequence),
            stop_id: Some(self.stop_id.to_string()),
            ..Default::default()
        };

        if self.cancelled {
            update.schedule_relationship = Some(ScheduleRelationship::Skipped as i32);
            return update;
        }

        let uncertainty = if self.confirmed { 0 } else { 1 };
        let event = |t: DateTime<FixedOffset>| trip_update::StopTimeEvent {
            time: Some(epoch_seconds(t)),
            uncertainty: Some(uncertainty),
            ..Default::default()
        };
        update.schedule_relationship = Some(ScheduleRelationship::Scheduled as i32);
        update.arrival = self.live_arrival.map(event);
        update.departure = self.live_departure.map(event);
        update
    }
}

/// Live stop states of one static trip instance, in the order the live feed
/// reported them.
#[derive(Debug, Clone, PartialEq)]
pub struct TripDelay {
    pub trip: GtfsTripKey,
    pub stops: Vec<StopDelay>,
    /// The whole trip is called off; `stops` is then empty.
    pub cancelled: bool,
}

impl TripDelay {
    pub fn new(trip: GtfsTripKey) -> Self {
        Self {
            trip,
            stops: Vec::new(),
            cancelled: false,
        }
    }

    pub fn cancellation(trip: GtfsTripKey) -> Self {
        Self {
            cancelled: true,
            ..Self::new(trip)
        }
    }
}

/// A disruption resolved to the static trips it affects.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub trips: Vec<GtfsTripKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    TripDelay(TripDelay),
    Alert(Alert),
}

impl From<TripDelay> for Fact {
    fn from(d: TripDelay) -> Self {
        Fact::TripDelay(d)
    }
}

impl From<Alert> for Fact {
    fn from(a: Alert) -> Self {
        Fact::Alert(a)
    }
}

impl Fact {
    pub fn entity_id(&self) -> String {
        match self {
            Fact::TripDelay(d) => format!("D_{}_{}", d.trip.start_date, d.trip.trip_id),
            Fact::Alert(a) => format!("A_{}", a.id),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Fact::TripDelay(d) => json!({
                "type": "delay",
                "id": self.entity_id(),
                "trip": &d.trip,
                "cancelled": d.cancelled,
                "stops": d.stops.iter().map(StopDelay::to_json).collect::<Vec<_>>(),
            }),
            Fact::Alert(a) => json!({
                "type": "alert",
                "id": self.entity_id(),
                "title": &a.title,
                "description": &a.description,
                "trips": &a.trips,
            }),
        }
    }

    pub fn to_entity(&self) -> gtfs_rt::FeedEntity {
        let mut entity = gtfs_rt::FeedEntity {
            id: self.entity_id(),
            ..Default::default()
        };

        match self {
            Fact::TripDelay(d) => {
                let mut trip = descriptor(&d.trip);
                if d.cancelled {
                    trip.schedule_relationship =
                        Some(trip_descriptor::ScheduleRelationship::Canceled as i32);
                }
                entity.trip_update = Some(gtfs_rt::TripUpdate {
                    trip,
                    stop_time_update: d.stops.iter().map(StopDelay::to_update).collect(),
                    ..Default::default()
                });
            }
            Fact::Alert(a) => {
                entity.alert = Some(gtfs_rt::Alert {
                    header_text: translated(&a.title),
                    description_text: translated(&a.description),
                    informed_entity: a
                        .trips
                        .iter()
                        .map(|t| gtfs_rt::EntitySelector {
                            trip: Some(descriptor(t)),
                            ..Default::default()
                        })
                        .collect(),
                });
            }
        }

        entity
    }
}

/// Facts produced by one matcher invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FactContainer {
    /// Publish time of the live feed the facts were derived from.
    pub timestamp: DateTime<FixedOffset>,
    pub facts: Vec<Fact>,
}

impl FactContainer {
    pub fn new(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            facts: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn to_feed_message(&self) -> gtfs_rt::FeedMessage {
        gtfs_rt::FeedMessage {
            header: gtfs_rt::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: Some(gtfs_rt::feed_header::Incrementality::FullDataset as i32),
                timestamp: u64::try_from(self.timestamp.timestamp()).ok(),
                ..Default::default()
            },
            entity: self.facts.iter().map(Fact::to_entity).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "facts": self.facts.iter().map(Fact::to_json).collect::<Vec<_>>(),
        })
    }
}

fn descriptor(key: &GtfsTripKey) -> gtfs_rt::TripDescriptor {
    gtfs_rt::TripDescriptor {
        trip_id: Some(key.trip_id.to_string()),
        start_date: Some(key.gtfs_start_date()),
        ..Default::default()
    }
}

fn translated(text: &str) -> Option<gtfs_rt::TranslatedString> {
    if text.is_empty() {
        return None;
    }
    Some(gtfs_rt::TranslatedString {
        translation: vec![gtfs_rt::translated_string::Translation {
            text: text.to_string(),
            language: Some(ALERT_LANGUAGE.to_string()),
        }],
    })
}

fn epoch_seconds(t: DateTime<FixedOffset>) -> i64 {
    t.timestamp() + i64::from(t.timestamp_subsec_millis() >= 500)
}
