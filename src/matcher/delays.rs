use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use super::{MatchStats, Matched};
use crate::error::FetchError;
use crate::fact::{Fact, FactContainer, StopDelay, TripDelay};
use crate::fetch::HttpClient;
use crate::schedule::ScheduleIndex;
use crate::source::{ApiConfig, OperationTrain, feed_timestamp, fetch_operations_page};
use crate::time::parse_instant;

/// How the paginated operations feed is walked.
#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    pub page_size: u32,
    /// Pages fetched before giving up; the first page is always fetched.
    pub max_pages: u32,
    /// Pause between consecutive page requests.
    pub fetch_spacing: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            max_pages: 10,
            fetch_spacing: Duration::from_millis(100),
        }
    }
}

/// Fetches every page of the operations feed and turns it into one
/// [`TripDelay`] per affected static trip.
///
/// Running out of page budget before the last page is an error: partial
/// results are never returned as complete ones. A train repeated on a later
/// page is matched only the first time it is seen.
#[instrument(skip_all, fields(page_size = options.page_size, max_pages = options.max_pages))]
pub async fn fetch_delays<C: HttpClient>(
    client: &C,
    api: &ApiConfig,
    index: &ScheduleIndex,
    options: &PageOptions,
) -> Result<Matched<MatchStats>, FetchError> {
    let mut stats = MatchStats::default();
    let mut seen = HashSet::new();
    let mut page_number = 1;
    let mut page = fetch_operations_page(client, api, page_number, options.page_size).await?;
    let mut facts = FactContainer::new(feed_timestamp(&page.ts, api.timezone)?);

    loop {
        for train in &page.tr {
            let key = train.train.live_key()?;
            if !seen.insert(key) {
                stats.duplicates += 1;
                debug!(%key, page = page_number, "Train repeated on a later page");
                continue;
            }
            let delays = match_train(train, index, api.timezone, &mut stats)?;
            facts.facts.extend(delays.into_iter().map(Fact::from));
        }
        debug!(
            page = page_number,
            trains = page.tr.len(),
            has_next = page.pg.hn,
            "Operations page matched"
        );

        if !page.pg.hn {
            break;
        }
        if page_number >= options.max_pages {
            return Err(FetchError::Incomplete {
                pages: page_number,
            });
        }

        page_number += 1;
        if !options.fetch_spacing.is_zero() {
            tokio::time::sleep(options.fetch_spacing).await;
        }
        page = fetch_operations_page(client, api, page_number, options.page_size).await?;
    }

    info!(%stats, facts = facts.len(), "Delays matched");
    Ok(Matched { facts, stats })
}

/// Joins one live train against the index.
///
/// Returns the delays grouped by static trip, in the order the trips were
/// first seen in the live stop list. A train called off as a whole yields a
/// cancellation for every trip of its bucket instead. Data-quality problems
/// are counted in `stats` and skipped; only a malformed payload is an error.
pub fn match_train(
    train: &OperationTrain,
    index: &ScheduleIndex,
    tz: Tz,
    stats: &mut MatchStats,
) -> Result<Vec<TripDelay>, FetchError> {
    let key = train.train.live_key()?;
    stats.total += 1;

    if !index.is_valid_operating_date(key.operating_date) {
        stats.outside_feed_dates += 1;
        return Ok(Vec::new());
    }

    let Some(bucket) = index.get(&key) else {
        stats.unmatched += 1;
        debug!(%key, "Unknown train");
        return Ok(Vec::new());
    };
    stats.matched += 1;

    if train.entirely_cancelled() {
        stats.cancelled += 1;
        debug!(%key, trips = bucket.all.len(), "Train cancelled");
        return Ok(bucket.all.iter().cloned().map(TripDelay::cancellation).collect());
    }

    let mut delays: Vec<TripDelay> = Vec::new();
    for stop in &train.st {
        let Some(entry) = bucket.by_order_number.get(&stop.psn) else {
            stats.unknown_stop_orders += 1;
            warn!(%key, order = stop.psn, "Train refers to unknown stop order");
            continue;
        };

        let live_stop_id = stop.id.to_string();
        if *entry.stop_id != *live_stop_id {
            stats.stop_mismatches += 1;
            warn!(
                %key,
                order = stop.psn,
                live = %live_stop_id,
                scheduled = %entry.stop_id,
                "Train changes stop"
            );
        }

        let delay = StopDelay {
            stop_id: entry.stop_id.clone(),
            stop_sequence: entry.stop_sequence,
            cancelled: stop.cancelled(),
            confirmed: stop.confirmed(),
            live_arrival: live_instant(stop.aa.as_deref(), tz)?,
            live_departure: live_instant(stop.ad.as_deref(), tz)?,
        };

        match delays.iter_mut().find(|d| d.trip == entry.trip) {
            Some(d) => d.stops.push(delay),
            None => delays.push(TripDelay {
                stops: vec![delay],
                ..TripDelay::new(entry.trip.clone())
            }),
        }
    }

    Ok(delays)
}

fn live_instant(s: Option<&str>, tz: Tz) -> Result<Option<DateTime<FixedOffset>>, FetchError> {
    match s {
        None | Some("") => Ok(None),
        Some(s) => parse_instant(s, tz)
            .map(Some)
            .ok_or_else(|| FetchError::Payload(format!("invalid live timestamp {s:?}"))),
    }
}
