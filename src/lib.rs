pub mod backoff;
pub mod error;
pub mod fact;
pub mod fetch;
pub mod matcher;
pub mod output;
pub mod schedule;
pub mod source;
pub mod time;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
