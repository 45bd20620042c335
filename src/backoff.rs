//! Polling loop with exponential backoff on retryable upstream failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error};

use crate::error::{FetchError, RetrySignal};

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Time between cycle starts. Zero runs a single cycle.
    pub period: Duration,
    /// Cap on the doubling of `period` after consecutive failures.
    pub max_exponent: u32,
}

impl PollerConfig {
    pub fn once() -> Self {
        Self {
            period: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_once(&self) -> bool {
        self.period.is_zero()
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
            max_exponent: 8,
        }
    }
}

/// Pause bookkeeping between cycles.
#[derive(Debug, Clone)]
pub struct Backoff {
    period: Duration,
    max_exponent: u32,
    failures: u32,
    pause: Duration,
}

impl Backoff {
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            period: config.period,
            max_exponent: config.max_exponent,
            failures: 0,
            pause: config.period,
        }
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) -> Duration {
        self.failures = 0;
        self.pause = self.period;
        self.pause
    }

    /// `period * 2^min(failures, max_exponent)`, counting only the failures
    /// before this one. A rate-limit hint longer than that wins.
    pub fn record_failure(&mut self, signal: RetrySignal) -> Duration {
        let exponent = self.failures.min(self.max_exponent);
        let mut pause = 2u32
            .checked_pow(exponent)
            .map_or(Duration::MAX, |factor| self.period.saturating_mul(factor));

        if let RetrySignal::RateLimited { reset: Some(hint) } = signal {
            pause = pause.max(hint);
        }

        self.failures = self.failures.saturating_add(1);
        self.pause = pause;
        pause
    }
}

/// What one cycle amounted to, as seen by the poller.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Retry(RetrySignal, anyhow::Error),
    Fatal(anyhow::Error),
}

impl<T> From<anyhow::Result<T>> for Outcome<T> {
    fn from(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(err) => match err.downcast_ref::<FetchError>().and_then(FetchError::retry_signal) {
                Some(signal) => Outcome::Retry(signal, err),
                None => Outcome::Fatal(err),
            },
        }
    }
}

pub struct Poller {
    config: PollerConfig,
    backoff: Backoff,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            backoff: Backoff::new(&config),
            config,
        }
    }

    /// Runs `cycle` until it fails with a non-retryable error.
    ///
    /// Pauses are measured from the start of each cycle. With a zero period
    /// the first cycle's result is returned as is, retryable or not.
    pub async fn run<F, Fut>(&mut self, mut cycle: F) -> anyhow::Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        loop {
            let started = Instant::now();
            let result = cycle().await;

            if self.config.is_once() {
                return result;
            }

            let pause = match Outcome::from(result) {
                Outcome::Ok(()) => self.backoff.record_success(),
                Outcome::Retry(signal, cause) => {
                    let pause = self.backoff.record_failure(signal);
                    error!(
                        error = %cause,
                        failures = self.backoff.failures(),
                        pause_s = pause.as_secs(),
                        "Cycle failed: backing off"
                    );
                    pause
                }
                Outcome::Fatal(err) => return Err(err),
            };

            let remaining = pause.saturating_sub(started.elapsed());
            debug!(?remaining, "Waiting for next cycle");
            tokio::time::sleep(remaining).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const SERVER: RetrySignal = RetrySignal::ServerError;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn server_error() -> anyhow::Error {
        FetchError::ServerError {
            url: "http://api.test/operations".into(),
            status: 500,
        }
        .into()
    }

    #[test]
    fn test_three_failures_then_success() {
        let mut b = Backoff::new(&PollerConfig::default());
        assert_eq!(b.record_failure(SERVER), secs(30));
        assert_eq!(b.record_failure(SERVER), secs(60));
        assert_eq!(b.record_failure(SERVER), secs(120));
        assert_eq!(b.record_success(), secs(30));
        assert_eq!(b.failures(), 0);
        assert_eq!(b.record_failure(SERVER), secs(30));
    }

    #[test]
    fn test_rate_limit_hint_wins_when_longer() {
        let mut b = Backoff::new(&PollerConfig::default());
        b.record_failure(SERVER);
        let pause = b.record_failure(RetrySignal::RateLimited {
            reset: Some(secs(500)),
        });
        assert!(pause >= secs(500));

        // shorter hint than the exponential pause
        let pause = b.record_failure(RetrySignal::RateLimited {
            reset: Some(secs(5)),
        });
        assert_eq!(pause, secs(120));
        assert_eq!(b.pause(), secs(120));
    }

    #[test]
    fn test_exponent_is_capped() {
        let mut b = Backoff::new(&PollerConfig {
            period: secs(1),
            max_exponent: 3,
        });
        let pauses: Vec<_> = (0..6).map(|_| b.record_failure(SERVER).as_secs()).collect();
        assert_eq!(pauses, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn test_outcome_classification() {
        assert!(matches!(Outcome::from(anyhow::Ok(())), Outcome::Ok(())));
        assert!(matches!(
            Outcome::<()>::from(Err(server_error())),
            Outcome::Retry(RetrySignal::ServerError, _)
        ));
        assert!(matches!(
            Outcome::<()>::from(Err(FetchError::Incomplete { pages: 10 }.into())),
            Outcome::Fatal(_)
        ));
        assert!(matches!(
            Outcome::<()>::from(Err(anyhow::anyhow!("disk full"))),
            Outcome::Fatal(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_backs_off_and_stops_on_fatal_error() {
        let results = Mutex::new(VecDeque::from([
            Err(server_error()),
            Err(server_error()),
            Ok(()),
            Err(anyhow::anyhow!("malformed")),
        ]));
        let calls = Mutex::new(Vec::new());
        let t0 = Instant::now();

        let err = Poller::new(PollerConfig::default())
            .run(|| {
                calls.lock().unwrap().push(t0.elapsed().as_secs());
                let result = results.lock().unwrap().pop_front().unwrap();
                async move { result }
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "malformed");
        assert_eq!(*calls.lock().unwrap(), vec![0, 30, 90, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_measured_from_cycle_start() {
        let calls = Mutex::new(Vec::new());
        let t0 = Instant::now();

        Poller::new(PollerConfig::default())
            .run(|| {
                let n = {
                    let mut calls = calls.lock().unwrap();
                    calls.push(t0.elapsed().as_secs());
                    calls.len()
                };
                async move {
                    tokio::time::sleep(secs(10)).await;
                    if n < 3 {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("stop"))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), vec![0, 30, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_mode_runs_a_single_cycle() {
        let calls = Mutex::new(0);
        Poller::new(PollerConfig::once())
            .run(|| {
                *calls.lock().unwrap() += 1;
                async { anyhow::Ok(()) }
            })
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);

        // retryable errors are not retried either
        let err = Poller::new(PollerConfig::once())
            .run(|| async { Err::<(), _>(server_error()) })
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<FetchError>().is_some());
    }
}
