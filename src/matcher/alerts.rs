use std::fmt;

use tracing::{debug, info, instrument};

use super::{Matched, pct};
use crate::error::FetchError;
use crate::fact::{Alert, FactContainer};
use crate::fetch::HttpClient;
use crate::schedule::ScheduleIndex;
use crate::source::{ApiConfig, Disruption, feed_timestamp, fetch_disruptions};

/// Counters of one alert-matching cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub total: usize,
    /// Disruptions emitted as alerts.
    pub matched: usize,
    /// Disruptions dropped for not resolving to any trip.
    pub unmatched: usize,
}

impl fmt::Display for AlertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched {} / {} ({:.2} %)",
            self.matched,
            self.total,
            pct(self.matched, self.total)
        )
    }
}

#[instrument(skip_all)]
pub async fn fetch_alerts<C: HttpClient>(
    client: &C,
    api: &ApiConfig,
    index: &ScheduleIndex,
) -> Result<Matched<AlertStats>, FetchError> {
    let disruptions = fetch_disruptions(client, api).await?;
    let mut facts = FactContainer::new(feed_timestamp(&disruptions.ts, api.timezone)?);
    let mut stats = AlertStats::default();

    for disruption in &disruptions.ds {
        stats.total += 1;
        match match_disruption(disruption, index)? {
            Some(alert) => {
                stats.matched += 1;
                facts.facts.push(alert.into());
            }
            None => stats.unmatched += 1,
        }
    }

    info!(%stats, "Alerts matched");
    Ok(Matched { facts, stats })
}

/// Resolves a disruption to the union of the static trips of every affected
/// run. Returns `None` when no run is known to the index.
pub fn match_disruption(
    disruption: &Disruption,
    index: &ScheduleIndex,
) -> Result<Option<Alert>, FetchError> {
    let mut trips = Vec::new();
    for affected in &disruption.ar {
        let key = affected.live_key()?;
        let Some(bucket) = index.get(&key) else {
            continue;
        };
        for trip in &bucket.all {
            if !trips.contains(trip) {
                trips.push(trip.clone());
            }
        }
    }

    if trips.is_empty() {
        debug!(id = disruption.id, "Dropping disruption without known trips");
        return Ok(None);
    }

    Ok(Some(Alert {
        id: disruption.id,
        title: disruption.tt.clone().unwrap_or_default(),
        description: disruption.msg.clone().unwrap_or_default(),
        trips,
    }))
}
