// Retry policy for transient embedding-service failures


use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::RetryConfig;

type SleepFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// Explicit retry policy: bounded attempts with randomized exponential
/// backoff between a minimum and maximum delay.
///
/// The sleep function is injectable so tests can record delays instead of
/// waiting them out.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
    sleep: SleepFn,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay: max_delay.max(min_delay),
            sleep: Arc::new(std::thread::sleep),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Replace the sleep function, e.g. with a recording no-op in tests
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based): uniformly
    /// random between the minimum delay and the capped exponential
    /// `min * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let uncapped = self.min_delay.saturating_mul(1u32 << exponent);
        let cap = uncapped.min(self.max_delay);

        if cap <= self.min_delay {
            return self.min_delay;
        }

        let span = cap - self.min_delay;
        self.min_delay + span.mul_f64(rand::rng().random_range(0.0..=1.0))
    }

    /// Run `op` until it succeeds, the error is not retryable, or attempts
    /// are exhausted. The final error is returned unchanged.
    pub fn run<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, error, delay
                    );
                    (self.sleep)(delay);
                    attempt += 1;
                }
            }
        }
    }
}
