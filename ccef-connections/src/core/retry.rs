//! Retry policies with deterministic exponential backoff.
//!
//! Every upstream service gets a named preset differing only in attempt
//! count, wait bounds, and which error kinds are considered transient.
//! The schedule is `min(max_wait, min_wait * multiplier^(n-1))` for the
//! n-th failure; there is no jitter. The server-suggested `Retry-After`
//! value is carried on the rate-limit error for callers but is not
//! consumed here.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Which error kinds a policy retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Connection, rate-limit, and generic request failures.
    Transient,
    /// Rate-limit failures only; everything else fails immediately so
    /// callers see the real error without waiting through backoff.
    RateLimitOnly,
}

impl RetryOn {
    fn matches(self, kind: ErrorKind) -> bool {
        match self {
            RetryOn::Transient => matches!(
                kind,
                ErrorKind::Connection | ErrorKind::RateLimit | ErrorKind::Request
            ),
            RetryOn::RateLimitOnly => matches!(kind, ErrorKind::RateLimit),
        }
    }
}

/// An exponential-backoff retry policy.
///
/// Credential, authentication, and configuration errors are never retried,
/// regardless of the [`RetryOn`] class: misconfiguration should surface
/// immediately rather than hide behind a retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: f64,
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            RetryOn::Transient,
        )
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        min_wait: Duration,
        max_wait: Duration,
        multiplier: f64,
        retry_on: RetryOn,
    ) -> Self {
        Self {
            max_attempts,
            min_wait,
            max_wait,
            multiplier,
            retry_on,
        }
    }

    /// Airtable allows 5 requests per second per base; short waits with a
    /// gentle multiplier keep throughput up across bursts.
    pub fn airtable() -> Self {
        Self::new(
            5,
            Duration::from_millis(200),
            Duration::from_secs(10),
            1.5,
            RetryOn::Transient,
        )
    }

    pub fn openai() -> Self {
        Self::new(
            5,
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            RetryOn::Transient,
        )
    }

    /// Shared by the Sheets and BigQuery connectors.
    pub fn google() -> Self {
        Self::openai()
    }

    pub fn helpscout() -> Self {
        Self::openai()
    }

    pub fn zoom() -> Self {
        Self::openai()
    }

    pub fn roi_crm() -> Self {
        Self::openai()
    }

    pub fn ptv() -> Self {
        Self::openai()
    }

    /// Action Network enforces 4 requests per second. Only 429s are
    /// retried; other failures surface immediately.
    pub fn action_network() -> Self {
        Self::new(
            5,
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            RetryOn::RateLimitOnly,
        )
    }

    /// Same policy as Action Network; the APIs share rate-limit behavior.
    pub fn action_builder() -> Self {
        Self::action_network()
    }

    /// The wait before retrying after the n-th failure (1-based).
    pub fn wait_before(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let wait = self.min_wait.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(wait.min(self.max_wait.as_secs_f64()))
    }

    /// Start an attempt sequence for call sites that drive their own loop
    /// (needed where each attempt re-borrows `&mut self`).
    pub fn attempts(&self) -> Attempts {
        Attempts {
            policy: self.clone(),
            failures: 0,
        }
    }

    /// Run `op`, retrying per this policy. Returns the operation's value
    /// unmodified on success; re-raises the final error unchanged after
    /// exhausting attempts.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempts = self.attempts();
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => attempts.backoff(err).await?,
            }
        }
    }
}

/// Attempt tracker produced by [`RetryPolicy::attempts`].
#[derive(Debug)]
pub struct Attempts {
    policy: RetryPolicy,
    failures: u32,
}

impl Attempts {
    /// Record a failure. Sleeps and returns `Ok(())` when the operation
    /// should be retried; hands the error back when attempts are exhausted
    /// or the error is not retryable under the policy.
    pub async fn backoff(&mut self, err: Error) -> Result<(), Error> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts || !self.policy.retry_on.matches(err.kind()) {
            return Err(err);
        }
        let wait = self.policy.wait_before(self.failures);
        tracing::warn!(
            attempt = self.failures,
            max_attempts = self.policy.max_attempts,
            wait_secs = wait.as_secs_f64(),
            error = %err,
            "operation failed, backing off before retry"
        );
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32, retry_on: RetryOn) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(10),
            2.0,
            retry_on,
        )
    }

    fn transient_error() -> Error {
        Error::ConnectionFailure {
            service: "test".into(),
            message: "boom".into(),
            source: None,
        }
    }

    #[test]
    fn backoff_schedule_is_exponential_and_capped() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            RetryOn::Transient,
        );
        assert_eq!(policy.wait_before(1), Duration::from_secs(1));
        assert_eq!(policy.wait_before(2), Duration::from_secs(2));
        assert_eq!(policy.wait_before(3), Duration::from_secs(4));
        assert_eq!(policy.wait_before(4), Duration::from_secs(8));
        assert_eq!(policy.wait_before(100), Duration::from_secs(60));
    }

    #[test]
    fn airtable_preset_uses_gentler_multiplier() {
        let policy = RetryPolicy::airtable();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.wait_before(1), Duration::from_millis(200));
        assert_eq!(policy.wait_before(2), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_k_plus_one_calls() {
        let policy = fast_policy(5, RetryOn::Transient);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(transient_error())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_and_returns_original_error() {
        let policy = fast_policy(3, RetryOn::Transient);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::RateLimitExceeded {
                        service: "test".into(),
                        retry_after: 7,
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RateLimitExceeded { retry_after, .. }) => assert_eq!(retry_after, 7),
            other => panic!("expected the original rate-limit error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn credential_errors_never_retried() {
        let policy = fast_policy(5, RetryOn::Transient);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::MissingCredential {
                        var: "FOO_PASSWORD".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::MissingCredential { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_only_skips_request_failures() {
        let policy = fast_policy(5, RetryOn::RateLimitOnly);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::RequestFailure {
                        service: "test".into(),
                        status: 500,
                        body: "oops".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::RequestFailure { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_only_still_retries_429() {
        let policy = fast_policy(3, RetryOn::RateLimitOnly);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::RateLimitExceeded {
                            service: "test".into(),
                            retry_after: 1,
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
