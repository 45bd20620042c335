//! Upstream railway API: endpoints and raw payload models.
//!
//! Payload field names follow the API's abbreviated JSON keys. Dates and
//! instants are kept as strings until a matcher converts them, so a single
//! malformed record surfaces as [`FetchError::Payload`] with context instead
//! of failing the whole page decode.

mod disruptions;
mod operations;

pub use disruptions::{Disruption, Disruptions, fetch_disruptions};
pub use operations::{
    CANCELLED_STATUS, OperationStop, OperationTrain, Operations, Pagination, fetch_operations_page,
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use reqwest::Url;
use serde::Deserialize;

use crate::error::FetchError;
use crate::schedule::LiveTripKey;
use crate::time::{FEED_TIMEZONE, parse_instant, parse_operating_date};

pub const DEFAULT_BASE_URL: &str = "https://pdp-api.plk-sa.pl/api/v1";

/// Where the live API lives and how to read its timestamps.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    /// Civil timezone for instants sent without an offset.
    pub timezone: Tz,
    /// Carrier codes left out of the operations feed.
    pub exclude_carriers: Vec<String>,
}

impl ApiConfig {
    pub fn new(base_url: &str, timezone: Tz) -> Result<Self> {
        let base_url: Url = base_url
            .parse()
            .with_context(|| format!("invalid API base URL {base_url:?}"))?;
        if base_url.cannot_be_a_base() {
            bail!("API base URL {base_url} cannot have a path");
        }
        Ok(Self {
            base_url,
            timezone,
            exclude_carriers: vec!["WKD".to_string()],
        })
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, FEED_TIMEZONE).expect("default base URL is valid")
    }
}

/// Reference to one train run, shared by operations and disruptions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrainRef {
    pub sid: i64,
    pub oid: i64,
    pub od: String,
}

impl TrainRef {
    pub fn live_key(&self) -> Result<LiveTripKey, FetchError> {
        let date = parse_operating_date(&self.od).ok_or_else(|| {
            FetchError::Payload(format!(
                "train {}/{} has invalid operating date {:?}",
                self.sid, self.oid, self.od
            ))
        })?;
        Ok(LiveTripKey::new(self.sid, self.oid, date))
    }
}

pub(crate) fn feed_timestamp(ts: &str, tz: Tz) -> Result<DateTime<FixedOffset>, FetchError> {
    parse_instant(ts, tz)
        .ok_or_else(|| FetchError::Payload(format!("invalid feed timestamp {ts:?}")))
}
