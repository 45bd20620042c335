//! Error types for schedule loading and upstream fetching.

use std::time::Duration;

use thiserror::Error;

/// Failure while loading the static schedule or building the index from it.
///
/// Every variant is fatal: a partially built index would silently produce
/// partial matches.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("GTFS archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{file}: missing column {column}")]
    MissingColumn { file: &'static str, column: String },

    #[error("{file}:{line}: invalid {column}: {reason}")]
    InvalidValue {
        file: &'static str,
        line: u64,
        column: String,
        reason: String,
    },

    #[error("service_id {service_id:?} has a malformed day-offset suffix")]
    InvalidDayOffset { service_id: String },

    #[error("failed to extract schedule and order id from trip_id {0:?}")]
    InvalidTripKey(String),

    #[error("trip {trip_id:?} references unknown service {service_id:?}")]
    UnknownService { trip_id: String, service_id: String },

    #[error("calendar_dates.txt removes dates for service {0:?}; calendar.txt is not supported")]
    CalendarRemoval(String),
}

/// Failure while fetching or decoding an upstream live feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: upstream server error ({status})")]
    ServerError { url: String, status: u16 },

    #[error("{url}: rate limited")]
    RateLimited {
        url: String,
        reset: Option<Duration>,
    },

    #[error("operations did not fit in {pages} pages")]
    Incomplete { pages: u32 },

    #[error("{url}: unexpected status {status}")]
    Status { url: String, status: u16 },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url}: invalid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed payload: {0}")]
    Payload(String),
}

/// What the poller should do about a failed cycle that may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySignal {
    /// Upstream internal failure.
    ServerError,
    /// Upstream asked us to slow down; `reset` is its (already bounded) hint.
    RateLimited { reset: Option<Duration> },
}

impl FetchError {
    /// Returns `None` for failures that must halt the poller.
    pub fn retry_signal(&self) -> Option<RetrySignal> {
        match self {
            FetchError::ServerError { .. } => Some(RetrySignal::ServerError),
            FetchError::RateLimited { reset, .. } => {
                Some(RetrySignal::RateLimited { reset: *reset })
            }
            _ => None,
        }
    }
}
