//! Oracle retry wrapper: per-call timeout and bounded retries with
//! exponential backoff.
//!
//! Every attempt is raced against the timeout. Retryable failures
//! (timeouts, network errors, 5xx, rate limits, unparseable bodies) are
//! retried up to `max_retries` times; anything else returns immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tutorlink_core::error::OracleError;
use tutorlink_core::provider::*;

/// Wraps an oracle with a timeout and retry budget.
pub struct RetryingOracle {
    inner: Arc<dyn Oracle>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn Oracle>, timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Build from the `[oracle]` config section.
    pub fn from_config(inner: Arc<dyn Oracle>, config: &tutorlink_config::OracleConfig) -> Self {
        Self::new(
            inner,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            Duration::from_millis(config.backoff_ms),
        )
    }

    /// Delay before retry number `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

#[async_trait]
impl Oracle for RetryingOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError> {
        let total = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, self.inner.complete(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(format!(
                    "Oracle '{}' timed out after {}s",
                    self.inner.name(),
                    self.timeout.as_secs()
                ))),
            };

            match result {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(oracle = %self.inner.name(), attempt, "Oracle call succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < total => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        oracle = %self.inner.name(),
                        attempt,
                        total,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Oracle call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(oracle = %self.inner.name(), attempt, error = %e, "Oracle call failed");
                    return Err(e);
                }
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, OracleError> {
        match tokio::time::timeout(self.timeout, self.inner.health_check()).await {
            Ok(result) => result,
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails with the given errors in order, then succeeds.
    struct FlakyOracle {
        errors: Mutex<Vec<OracleError>>,
        calls: Mutex<usize>,
    }

    impl FlakyOracle {
        fn new(mut errors: Vec<OracleError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            _request: OracleRequest,
        ) -> std::result::Result<OracleResponse, OracleError> {
            *self.calls.lock().unwrap() += 1;
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(OracleResponse::text("ok")),
            }
        }
    }

    /// Never answers.
    struct HangingOracle;

    #[async_trait]
    impl Oracle for HangingOracle {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: OracleRequest,
        ) -> std::result::Result<OracleResponse, OracleError> {
            std::future::pending().await
        }
    }

    fn request() -> OracleRequest {
        OracleRequest::json("m", "s", "p")
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let inner = Arc::new(FlakyOracle::new(vec![
            OracleError::Network("reset".into()),
            OracleError::Api { status_code: 502, message: String::new() },
        ]));
        let oracle = RetryingOracle::new(inner.clone(), Duration::from_secs(5), 2, Duration::from_millis(100));

        let response = oracle.complete(request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let inner = Arc::new(FlakyOracle::new(vec![
            OracleError::Network("a".into()),
            OracleError::Network("b".into()),
            OracleError::Network("c".into()),
        ]));
        let oracle = RetryingOracle::new(inner.clone(), Duration::from_secs(5), 1, Duration::from_millis(10));

        let err = oracle.complete(request()).await.unwrap_err();
        assert!(matches!(err, OracleError::Network(ref m) if m == "b"));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyOracle::new(vec![OracleError::AuthenticationFailed("bad".into())]));
        let oracle = RetryingOracle::new(inner.clone(), Duration::from_secs(5), 3, Duration::from_millis(10));

        assert!(oracle.complete(request()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_oracle_times_out() {
        let oracle = RetryingOracle::new(Arc::new(HangingOracle), Duration::from_secs(2), 1, Duration::from_millis(10));
        let err = oracle.complete(request()).await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }

    #[test]
    fn backoff_doubles() {
        let oracle = RetryingOracle::new(Arc::new(HangingOracle), Duration::from_secs(1), 3, Duration::from_millis(250));
        assert_eq!(oracle.delay_for(1), Duration::from_millis(250));
        assert_eq!(oracle.delay_for(2), Duration::from_millis(500));
        assert_eq!(oracle.delay_for(3), Duration::from_millis(1000));
    }
}
