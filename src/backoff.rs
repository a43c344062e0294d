//! Jittered exponential back-off for retried broker requests.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

/// Exponential backoff with jitter
///
/// See <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,

    /// Give up once the accumulated sleep time would exceed this.
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            base: 3.,
            deadline: Some(Duration::from_secs(10)),
        }
    }
}

type SourceError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("Retry exceeded deadline of {deadline:?}: {source}")]
    DeadlineExceeded {
        deadline: Duration,
        source: SourceError,
    },
}

/// Either a retryable error or a broker asking us to slow down.
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle(Duration),
}

impl<E> ErrorOrThrottle<E> {
    /// Turns a response's `throttle_time_ms` into a throttle signal.
    ///
    /// Zero, absent and negative values do not throttle.
    pub fn check_throttle(throttle_time_ms: Option<i32>) -> Result<(), Self> {
        let throttle_time_ms = throttle_time_ms.unwrap_or_default();
        match u64::try_from(throttle_time_ms) {
            Ok(0) => Ok(()),
            Ok(ms) => Err(Self::Throttle(Duration::from_millis(ms))),
            Err(_) => {
                warn!(throttle_time_ms, "Invalid throttle time");
                Ok(())
            }
        }
    }
}

/// [`Backoff`] can be created from a [`BackoffConfig`]
///
/// Consecutive calls to [`Backoff::next`] will return the next backoff interval
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    total: f64,
    deadline: Option<f64>,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .field("total", &self.total)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Backoff {
    /// Create a new [`Backoff`] from the provided [`BackoffConfig`]
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with the optional `rng`
    ///
    /// Uses [`rand::thread_rng()`] if no rng provided
    pub fn new_with_rng(
        config: &BackoffConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            total: 0.0,
            deadline: config.deadline.map(|d| d.as_secs_f64()),
            rng,
        }
    }

    /// Returns the next backoff duration to wait for, `None` once the deadline
    /// would be exceeded.
    fn next(&mut self) -> Option<Duration> {
        let range = self.init_backoff..(self.next_backoff_secs * self.base);

        let rand_backoff = match self.rng.as_mut() {
            Some(rng) => rng.gen_range(range),
            None => thread_rng().gen_range(range),
        };

        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        self.total += next_backoff;
        let res = std::mem::replace(&mut self.next_backoff_secs, next_backoff);

        if let Some(deadline) = self.deadline {
            if self.total >= deadline {
                return None;
            }
        }

        Some(Duration::from_secs_f64(res))
    }

    /// Perform an async operation that retries with a backoff
    pub async fn retry_with_backoff<F, F1, B, E>(
        &mut self,
        request_name: &str,
        do_stuff: F,
    ) -> Result<B, BackoffError>
    where
        F: (Fn() -> F1) + Send + Sync,
        F1: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        loop {
            let e = match do_stuff().await {
                ControlFlow::Break(r) => break Ok(r),
                ControlFlow::Continue(ErrorOrThrottle::Error(e)) => e,
                ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle)) => {
                    info!(
                        request_name,
                        throttle_ms = throttle.as_millis() as u64,
                        "broker asked us to throttle",
                    );
                    tokio::time::sleep(throttle).await;
                    continue;
                }
            };

            let backoff = match self.next() {
                Some(backoff) => backoff,
                None => {
                    return Err(BackoffError::DeadlineExceeded {
                        deadline: Duration::from_secs_f64(self.deadline.unwrap_or_default()),
                        source: Box::new(e),
                    });
                }
            };

            info!(
                e=%e,
                request_name,
                backoff_secs = backoff.as_secs(),
                "request encountered non-fatal error - backing off",
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
