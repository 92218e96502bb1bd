//! Retry logic with exponential backoff for handling transient failures.
//!
//! [`RetryingTransport`] wraps any [`Transport`] and retries calls that fail
//! below the application layer (connection refused, timeouts, malformed
//! bodies). Application errors are answers, not glitches, and are returned on
//! the first attempt.
//!
//! # Example
//!
//! ```rust,no_run
//! use slate_runtime::http::{HttpTransport, HttpTransportConfig};
//! use slate_runtime::retry::{RetryPolicy, RetryingTransport};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let http = HttpTransport::new(HttpTransportConfig::new("https://skyportal.example.org"))?;
//! let transport = RetryingTransport::new(http, policy);
//! # Ok(())
//! # }
//! ```

use crate::metrics::RetryMetrics;
use slate_core::{Transport, TransportFailure, TransportFuture, TransportRequest};
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^attempt`, capped
    /// at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}

/// Retry an async operation, consulting `is_retryable` after each failure.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `policy.max_retries` retries are spent.
///
/// # Errors
///
/// Returns the operation's error when it is not retryable or retries are exhausted.
///
/// # Example
///
/// ```rust
/// use slate_runtime::retry::{RetryPolicy, retry_with_predicate};
///
/// # async fn example() -> Result<(), String> {
/// let policy = RetryPolicy::default();
///
/// let result = retry_with_predicate(
///     policy,
///     || async { Ok::<_, String>(42) },
///     |err: &String| err.contains("transient"),
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    RetryMetrics::record_exhausted();
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );
                RetryMetrics::record_attempt();

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Transport decorator that retries transport-level failures.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The wrapped transport.
    #[must_use]
    pub const fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    fn request(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(retry_with_predicate(
            self.policy.clone(),
            move || self.inner.request(request.clone()),
            TransportFailure::is_transport,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use serde_json::json;
    use slate_core::Method;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .build();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(usize::MAX), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .build();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(format!("transient failure {attempt}"))
                    } else {
                        Ok(42)
                    }
                }
            },
            |_: &String| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_with_predicate_skips_non_retryable() {
        let policy = RetryPolicy::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            policy,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent error")
                }
            },
            |err: &&str| err.contains("transient"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Fails with the scripted failures in order, then succeeds.
    struct Flaky {
        failures: std::sync::Mutex<Vec<TransportFailure>>,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(mut failures: Vec<TransportFailure>) -> Self {
            failures.reverse();
            Self {
                failures: std::sync::Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for Flaky {
        fn request(&self, _request: TransportRequest) -> TransportFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.failures.lock().unwrap().pop();
            Box::pin(async move {
                match next {
                    Some(failure) => Err(failure),
                    None => Ok(json!({"ok": true})),
                }
            })
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn test_retrying_transport_retries_transport_failures() {
        let transport = RetryingTransport::new(
            Flaky::new(vec![
                TransportFailure::Transport("connection reset".into()),
                TransportFailure::Transport("connection reset".into()),
            ]),
            fast_policy(3),
        );

        let result = transport
            .request(TransportRequest::new(Method::Get, "/api/candidates/1", None))
            .await;

        assert_eq!(result, Ok(json!({"ok": true})));
        assert_eq!(transport.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_transport_returns_application_errors_immediately() {
        let not_found = TransportFailure::Application {
            status: Some(404),
            message: "not found".into(),
        };
        let transport = RetryingTransport::new(Flaky::new(vec![not_found.clone()]), fast_policy(3));

        let result = transport
            .request(TransportRequest::new(Method::Get, "/api/candidates/1", None))
            .await;

        assert_eq!(result, Err(not_found));
        assert_eq!(transport.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrying_transport_gives_up() {
        let transport = RetryingTransport::new(
            Flaky::new(vec![TransportFailure::Transport("down".into()); 5]),
            fast_policy(1),
        );

        let result = transport
            .request(TransportRequest::new(Method::Get, "/api/candidates/1", None))
            .await;

        assert_eq!(result, Err(TransportFailure::Transport("down".into())));
        assert_eq!(transport.inner().calls.load(Ordering::SeqCst), 2);
    }
}
