//! Backoff policies for provider calls
//!
//! One policy shape serves every call site: listing page fetches retry any
//! transient failure, mutating calls retry throttling only, and completion
//! polling uses [`PollPolicy`] with a total wait budget instead of an attempt
//! ceiling.

use crate::error::ProviderError;
use backon::{BackoffBuilder, ExponentialBuilder};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Jitter factor (0.0 - 1.0), applied as +/- a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Preset for listing page fetches
    pub fn listing() -> Self {
        Self::default()
    }

    /// Preset for mutating calls
    pub fn mutation() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }

    fn schedule(&self, retries: usize) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier.max(1.0) as f32)
            .with_max_times(retries)
            .build()
            .map(|d| millis(d.as_secs_f64()))
    }

    /// Un-jittered delays, one per permitted retry
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        self.schedule(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Un-jittered delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.schedule(attempt as usize + 1)
            .last()
            .unwrap_or(self.initial_delay)
    }

    /// Delay with jitter applied
    pub fn backoff(&self, attempt: u32) -> Duration {
        jittered(self.delay_for_attempt(attempt), self.jitter)
    }
}

fn millis(secs: f64) -> Duration {
    Duration::from_millis((secs * 1000.0).round() as u64)
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let jitter = jitter.min(1.0);
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    millis((base.as_secs_f64() * factor).max(0.0))
}

/// Completion polling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// First poll interval
    pub initial_interval: Duration,

    /// Interval cap
    pub max_interval: Duration,

    /// Growth factor between polls
    pub multiplier: f64,

    /// Maximum total time spent polling one resource
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(15),
            multiplier: 1.5,
            max_wait: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    /// Interval before poll number `poll` (0-based)
    pub fn interval_for(&self, poll: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(poll.min(63) as i32);
        let secs = self.initial_interval.as_secs_f64() * factor;
        millis(secs.min(self.max_interval.as_secs_f64()))
    }
}

/// Final failure of a retried call
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub error: ProviderError,
    pub attempts: u32,
}

/// Run `call`, retrying errors accepted by `retry_if` with the policy's backoff
///
/// Errors rejected by `retry_if` are returned on the spot with `attempts`
/// set to the number of calls made.
pub async fn retry_call<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    retry_if: fn(&ProviderError) -> bool,
    mut call: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut delays = policy.delays();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempts = attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match delays.next() {
            Some(delay) if retry_if(&error) => {
                let delay = jittered(delay, policy.jitter);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                return Err(RetryExhausted {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}
