//! Live-to-static matching of the operations and disruptions feeds.
//!
//! Each matcher invocation fetches, joins against the borrowed
//! [`ScheduleIndex`](crate::schedule::ScheduleIndex) and returns its facts
//! together with the counters of that one invocation.

mod alerts;
mod delays;
#[cfg(test)]
pub(crate) mod testing;

pub use alerts::{AlertStats, fetch_alerts, match_disruption};
pub use delays::{PageOptions, fetch_delays, match_train};

use std::fmt;

use crate::fact::FactContainer;

/// Result of one matcher invocation.
#[derive(Debug)]
pub struct Matched<S> {
    pub facts: FactContainer,
    pub stats: S,
}

/// Counters of one delay-matching cycle.
///
/// `matched + unmatched + outside_feed_dates == total`. Repeated live
/// records are counted in `duplicates` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub outside_feed_dates: usize,
    pub unknown_stop_orders: usize,
    pub stop_mismatches: usize,
    /// Matched trains called off as a whole.
    pub cancelled: usize,
    pub duplicates: usize,
}

impl MatchStats {
    /// Live records inside the feed's date range.
    pub fn processed(&self) -> usize {
        self.matched + self.unmatched
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched {} / {} ({:.2} %); unmatched: {}; outside feed dates: {}; \
             unknown stop orders: {}; stop mismatches: {}; cancelled: {}; duplicates: {}",
            self.matched,
            self.processed(),
            pct(self.matched, self.processed()),
            self.unmatched,
            self.outside_feed_dates,
            self.unknown_stop_orders,
            self.stop_mismatches,
            self.cancelled,
            self.duplicates,
        )
    }
}

pub(crate) fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
