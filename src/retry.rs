//! Retry logic with exponential backoff
//!
//! This module wraps a single idempotent network or API call with retries on
//! transient failures. Whether to retry is a pure decision over the error's
//! [`RetryClass`] tag, made by [`RetryPolicy::decide`]; sleeping goes through
//! the [`Sleeper`] trait so tests can substitute a fake clock.
//!
//! # Example
//!
//! ```no_run
//! use papercast::config::RetryConfig;
//! use papercast::error::Error;
//! use papercast::retry::{RetryPolicy, RetryingClient};
//!
//! # async fn example() {
//! let client = RetryingClient::new(RetryPolicy::from(&RetryConfig::default()));
//! let attempted = client
//!     .execute("fetch listing", || async { Ok::<_, Error>("body".to_string()) })
//!     .await;
//! assert_eq!(attempted.attempts, 1);
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, RetryClass};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Trait for errors that can be classified for the retry loop
///
/// Transient failures (network timeouts, server busy, connection reset) are
/// [`RetryClass::Transient`]; quota rejections are [`RetryClass::Quota`];
/// everything that will fail the same way again is [`RetryClass::Permanent`].
pub trait IsRetryable {
    /// Retry tag for this error
    fn retry_class(&self) -> RetryClass;

    /// Server-provided wait hint, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Returns true if the operation should be retried
    fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Permanent
    }
}

impl IsRetryable for Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            Error::Transient(_) => RetryClass::Transient,
            Error::QuotaExceeded { .. } => RetryClass::Quota,
            Error::Permanent(_) => RetryClass::Permanent,
            Error::Network(e) => classify_reqwest(e),
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::UnexpectedEof => RetryClass::Transient,
                _ => RetryClass::Permanent,
            },
            // A payload that does not parse will not parse on the next try either
            Error::Serialization(_) => RetryClass::Permanent,
            Error::Config { .. }
            | Error::MissingCredential(_)
            | Error::Enumeration(_)
            | Error::Cancelled
            | Error::Other(_) => RetryClass::Permanent,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        Error::retry_after(self)
    }
}

fn classify_reqwest(e: &reqwest::Error) -> RetryClass {
    if let Some(status) = e.status() {
        return match status.as_u16() {
            429 => RetryClass::Quota,
            408 | 500..=599 => RetryClass::Transient,
            _ => RetryClass::Permanent,
        };
    }
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        return RetryClass::Transient;
    }
    // Decode, builder and redirect errors
    RetryClass::Permanent
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again
    RetryAfter(Duration),
    /// Stop and report the last error
    GiveUp,
}

/// Backoff policy derived from [`RetryConfig`]
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempt ceiling, including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Whether to add random jitter
    pub jitter: bool,
    /// Extra factor applied after a quota rejection
    pub quota_multiplier: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            quota_multiplier: config.quota_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Deterministic delay after failed attempt number `attempt` (1-based):
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        cap(secs, self.max_delay)
    }

    /// Delay to wait after failed attempt `attempt` with the given error tag
    pub fn delay_for(
        &self,
        attempt: u32,
        class: RetryClass,
        retry_after: Option<Duration>,
    ) -> Duration {
        let mut delay = self.base_delay(attempt);

        if class == RetryClass::Quota {
            delay = cap(delay.as_secs_f64() * self.quota_multiplier, self.max_delay);
            if let Some(hint) = retry_after {
                delay = delay.max(hint);
            }
        }

        if self.jitter {
            delay = add_jitter(delay);
        }

        delay.min(self.max_delay)
    }

    /// Decide whether to retry after failed attempt `attempt`
    pub fn decide(
        &self,
        attempt: u32,
        class: RetryClass,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if class == RetryClass::Permanent || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt, class, retry_after))
    }
}

fn cap(secs: f64, max: Duration) -> Duration {
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs.max(0.0))
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Abstraction over waiting, so backoff can be tested without real time passing
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Result of a retried operation together with the number of attempts made
#[derive(Debug)]
pub struct Attempted<T, E = Error> {
    /// Final result: the first success or the last error
    pub result: Result<T, E>,
    /// Attempts made, between 1 and the policy ceiling
    pub attempts: u32,
}

impl<T, E> Attempted<T, E> {
    /// Whether the operation eventually succeeded
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs operations under a [`RetryPolicy`]
///
/// Cheap to clone and safe to share between workers.
#[derive(Clone)]
pub struct RetryingClient {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingClient {
    /// Create a client that sleeps on the tokio timer
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper (tests inject a fake clock here)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it succeeds, fails permanently, or the attempt
    /// ceiling is reached.
    ///
    /// `label` identifies the operation in log lines (usually the item id).
    /// Each failed attempt is logged at WARN when it will be retried and at
    /// ERROR when it is terminal.
    pub async fn execute<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Attempted<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = label,
                            attempts = attempt,
                            "Operation succeeded after retry"
                        );
                    } else {
                        tracing::debug!(operation = label, "Operation succeeded");
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let class = e.retry_class();
                    match self.policy.decide(attempt, class, e.retry_after()) {
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                operation = label,
                                error = %e,
                                attempt,
                                max_attempts = self.policy.max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                quota = class == RetryClass::Quota,
                                "Operation failed, retrying"
                            );
                            self.sleeper.sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            if class == RetryClass::Permanent {
                                tracing::error!(
                                    operation = label,
                                    error = %e,
                                    attempts = attempt,
                                    "Operation failed with non-retryable error"
                                );
                            } else {
                                tracing::error!(
                                    operation = label,
                                    error = %e,
                                    attempts = attempt,
                                    "Operation failed after all retry attempts exhausted"
                                );
                            }
                            return Attempted {
                                result: Err(e),
                                attempts: attempt,
                            };
                        }
                    }
                }
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sleeper that records requested delays instead of waiting
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn policy(max_attempts: u32, initial_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
            quota_multiplier: 2.0,
        }
    }

    fn client_with_recorder(policy: RetryPolicy) -> (RetryingClient, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = RetryingClient::new(policy).with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    #[tokio::test]
    async fn success_on_first_attempt_does_not_sleep() {
        let (client, sleeper) = client_with_recorder(policy(5, 100));

        let attempted = client
            .execute("item", || async { Ok::<_, Error>(42) })
            .await;

        assert_eq!(attempted.result.unwrap(), 42);
        assert_eq!(attempted.attempts, 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_records_three_attempts() {
        let (client, sleeper) = client_with_recorder(policy(5, 100));
        let counter = Arc::new(AtomicU32::new(0));

        let attempted = client
            .execute("item", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Transient("connection reset".into()))
                    } else {
                        Ok("payload")
                    }
                }
            })
            .await;

        assert_eq!(attempted.result.unwrap(), "payload");
        assert_eq!(attempted.attempts, 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn always_transient_stops_at_the_attempt_ceiling() {
        let (client, sleeper) = client_with_recorder(policy(5, 100));
        let counter = Arc::new(AtomicU32::new(0));

        let attempted = client
            .execute("item", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::Transient("503".into()))
                }
            })
            .await;

        assert!(matches!(attempted.result, Err(Error::Transient(_))));
        assert_eq!(attempted.attempts, 5, "attempts must equal the ceiling");
        assert_eq!(counter.load(Ordering::SeqCst), 5, "never more than the ceiling");
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let (client, sleeper) = client_with_recorder(policy(5, 100));
        let counter = Arc::new(AtomicU32::new(0));

        let attempted = client
            .execute("item", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::Permanent("HTTP 404".into()))
                }
            })
            .await;

        assert!(matches!(attempted.result, Err(Error::Permanent(_))));
        assert_eq!(attempted.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let (client, sleeper) = client_with_recorder(policy(1, 100));

        let attempted = client
            .execute("item", || async { Err::<(), _>(Error::Transient("x".into())) })
            .await;

        assert_eq!(attempted.attempts, 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn quota_errors_back_off_longer_and_honor_hint() {
        let (client, sleeper) = client_with_recorder(policy(3, 100));
        let counter = Arc::new(AtomicU32::new(0));

        let attempted = client
            .execute("item", || {
                let counter = counter.clone();
                async move {
                    match counter.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(Error::QuotaExceeded {
                            message: "429".into(),
                            retry_after: None,
                        }),
                        1 => Err(Error::QuotaExceeded {
                            message: "429".into(),
                            retry_after: Some(Duration::from_secs(5)),
                        }),
                        _ => Ok(()),
                    }
                }
            })
            .await;

        assert!(attempted.is_ok());
        assert_eq!(attempted.attempts, 3);
        // 100ms * 2 (quota), then max(200ms * 2, 5s hint)
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(200), Duration::from_secs(5)]
        );
    }

    #[test]
    fn base_delay_grows_exponentially_and_caps() {
        let mut p = policy(10, 1000);
        p.max_delay = Duration::from_secs(3);

        assert_eq!(p.base_delay(1), Duration::from_secs(1));
        assert_eq!(p.base_delay(2), Duration::from_secs(2));
        assert_eq!(p.base_delay(3), Duration::from_secs(3));
        assert_eq!(p.base_delay(4), Duration::from_secs(3));
        assert_eq!(p.base_delay(u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn decide_is_pure_over_the_tag() {
        let p = policy(3, 100);

        assert_eq!(
            p.decide(1, RetryClass::Transient, None),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(p.decide(1, RetryClass::Permanent, None), RetryDecision::GiveUp);
        assert_eq!(p.decide(3, RetryClass::Transient, None), RetryDecision::GiveUp);
        assert_eq!(
            p.decide(2, RetryClass::Quota, None),
            RetryDecision::RetryAfter(Duration::from_millis(400))
        );
    }

    #[test]
    fn retry_after_hint_is_capped_by_max_delay() {
        let mut p = policy(3, 100);
        p.max_delay = Duration::from_secs(2);
        assert_eq!(
            p.delay_for(1, RetryClass::Quota, Some(Duration::from_secs(30))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let mut p = policy(5, 50);
        p.jitter = true;

        for i in 0..200 {
            let d = p.delay_for(1, RetryClass::Transient, None);
            assert!(d >= Duration::from_millis(50), "iteration {i}: {d:?} too short");
            assert!(d <= Duration::from_millis(100), "iteration {i}: {d:?} too long");
        }
    }

    #[test]
    fn add_jitter_on_zero_delay_returns_zero() {
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn policy_from_config_clamps_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn real_sleeper_waits_between_attempts() {
        let client = RetryingClient::new(policy(3, 20));
        let start = std::time::Instant::now();

        let attempted = client
            .execute("item", || async { Err::<(), _>(Error::Transient("x".into())) })
            .await;

        let elapsed = start.elapsed();
        assert_eq!(attempted.attempts, 3);
        // 20ms + 40ms; upper bound is generous for slow CI machines
        assert!(elapsed >= Duration::from_millis(60), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[test]
    fn io_errors_are_classified_by_kind() {
        let transient = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(transient.retry_class(), RetryClass::Transient);

        let permanent = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(permanent.retry_class(), RetryClass::Permanent);
    }

    #[test]
    fn tagged_variants_map_to_their_class() {
        assert_eq!(Error::Transient("x".into()).retry_class(), RetryClass::Transient);
        assert_eq!(
            Error::QuotaExceeded {
                message: "x".into(),
                retry_after: None
            }
            .retry_class(),
            RetryClass::Quota
        );
        assert_eq!(Error::Permanent("x".into()).retry_class(), RetryClass::Permanent);
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Enumeration("x".into()).is_retryable());

        let malformed = Error::Serialization(serde_json::from_str::<u32>("nope").unwrap_err());
        assert_eq!(malformed.retry_class(), RetryClass::Permanent);
    }
}
