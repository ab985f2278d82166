//! Request pacing for quota-constrained APIs
//!
//! Some APIs enforce request-rate quotas that cannot be detected from response
//! headers. The [`RateLimiter`] paces callers by sleeping for a random duration
//! drawn uniformly from a configured range before each call. It is applied per
//! call rather than as a global bucket, so serial processing paces itself.

use crate::config::RateLimitConfig;
use crate::retry::{Sleeper, TokioSleeper};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Random per-call delay shared by all workers of a pipeline
///
/// Cloning is cheap; clones share the same sleeper.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    min_delay: Duration,
    max_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    /// Create a limiter from configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use papercast::config::RateLimitConfig;
    /// use papercast::rate_limiter::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(&RateLimitConfig::default());
    /// let delay = limiter.next_delay();
    /// assert!(delay.as_secs_f64() >= 1.0 && delay.as_secs_f64() <= 3.0);
    /// ```
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        // Tolerate an inverted range instead of panicking in gen_range
        let (min_delay, max_delay) = if config.min_delay <= config.max_delay {
            (config.min_delay, config.max_delay)
        } else {
            (config.max_delay, config.min_delay)
        };

        Self {
            enabled: config.enabled,
            min_delay,
            max_delay,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// A limiter that never waits
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper (tests inject a fake clock here)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Whether [`throttle`](Self::throttle) waits at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Draw the next delay; zero when disabled
    pub fn next_delay(&self) -> Duration {
        if !self.enabled || self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }

        let secs = rand::thread_rng()
            .gen_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Block the calling unit of work for a random delay before it proceeds
    pub async fn throttle(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Throttling before API call");
        self.sleeper.sleep(delay).await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}
