//! Throttling primitives for the batch driver
//!
//! - [`RetryHelper`]: bounded retry with backoff, applied to every external call.
//!   Only errors on the [`Retryable`] allowlist are retried.
//! - [`RotationSchedule`]: countdown of searches until the next identity rotation,
//!   reseeded from a clamped normal draw so the cadence is irregular.
//! - [`FailureWindow`]: sliding window of recent failure times for burst detection.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::{RetryConfig, RotationConfig};

/// Errors that the retry helper may retry
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry helper with configurable backoff
pub struct RetryHelper {
    config: RetryConfig,
}

impl RetryHelper {
    /// Create a new retry helper from config
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Execute an async operation, retrying allowlisted failures with backoff
    pub async fn with_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Debug,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt > self.config.max_retries {
                        warn!(
                            "All {} retry attempts exhausted, giving up",
                            self.config.max_retries
                        );
                        return Err(e);
                    }

                    let delay = self.config.calculate_backoff_delay(attempt);
                    debug!(
                        "Attempt {} failed ({:?}), retrying in {:?} with {:?} backoff",
                        attempt, e, delay, self.config.backoff_strategy
                    );

                    sleep(delay).await;
                }
            }
        }
    }
}

/// Searches remaining before the identity must be rotated
#[derive(Debug)]
pub struct RotationSchedule {
    remaining: i64,
    config: RotationConfig,
    rng: StdRng,
}

impl RotationSchedule {
    pub fn new(config: &RotationConfig, rng: StdRng) -> Self {
        Self {
            remaining: config.initial_countdown,
            config: config.clone(),
            rng,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn is_due(&self) -> bool {
        self.remaining <= 0
    }

    /// One search attempt is about to be made
    pub fn record_search(&mut self) {
        self.remaining -= 1;
    }

    /// A transient failure pulls the next rotation forward
    pub fn penalize(&mut self) {
        self.remaining -= self.config.failure_penalty;
    }

    /// Make the next check rotate
    pub fn force(&mut self) {
        self.remaining = 0;
    }

    /// Reseed after a rotation; returns the new countdown
    pub fn reseed(&mut self) -> i64 {
        let draw = match Normal::new(self.config.mean, self.config.std_dev) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => self.config.mean,
        };
        self.remaining = (draw.floor() as i64).max(self.config.min_countdown);
        self.remaining
    }
}

/// Recent failure times inside a fixed horizon
#[derive(Debug)]
pub struct FailureWindow {
    horizon: Duration,
    failures: VecDeque<Instant>,
}

impl FailureWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            failures: VecDeque::new(),
        }
    }

    pub fn record(&mut self) {
        self.failures.push_back(Instant::now());
    }

    /// Drop failures older than the horizon; returns how many remain
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > self.horizon {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.len()
    }

    /// True when `threshold` or more failures remain inside the horizon
    pub fn is_burst(&mut self, threshold: usize) -> bool {
        threshold > 0 && self.evict_expired() >= threshold
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
