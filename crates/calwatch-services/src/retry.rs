//! Bounded retry with exponential backoff for provider calls.
//!
//! Callers decide which errors are transient; everything else fails on the
//! first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use calwatch_core::ChannelsConfig;
use rand::Rng;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Randomize each delay within `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            jitter: false,
        }
    }

    /// Policy for channel creation, from the `[channels]` config section.
    pub fn from_config(config: &ChannelsConfig) -> Self {
        Self {
            max_attempts: config.create_max_attempts,
            initial_delay: Duration::from_millis(config.create_initial_delay_ms),
            max_delay: Duration::from_millis(config.create_max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given retry number (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponential backoff: initial_delay * 2^attempt
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy's attempts are used up. Returns the last error.
pub async fn retry_with<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if !is_retryable(&e) {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(e);
                }
                if attempt >= max_attempts {
                    tracing::error!("All {} attempts exhausted: {}", max_attempts, e);
                    return Err(e);
                }

                let delay = policy.backoff(attempt - 1);
                tracing::warn!(
                    "Retryable error on attempt {} of {}, waiting {:?}: {}",
                    attempt,
                    max_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
