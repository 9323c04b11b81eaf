//! Retry layer for transient provider failures.

use async_trait::async_trait;
use std::time::Duration;
use tokio_retry2::{strategy::jitter, strategy::ExponentialBackoff, Retry, RetryError};
use tracing::warn;

use crate::{Error, GenerationRequest, LlmClient, Provider};

/// Wraps a client and retries transient failures with exponential backoff.
///
/// `max_attempts` counts the first call, so a value of 3 allows two retries.
/// Delays grow as roughly 1s, 2s, 4s (jittered) and are capped at one minute.
pub struct Retrying<C> {
    inner: C,
    max_attempts: usize,
}

impl<C: LlmClient> Retrying<C> {
    pub fn new(inner: C, max_attempts: usize) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for Retrying<C> {
    async fn generate(&self, request: GenerationRequest) -> Result<String, Error> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(500)
            .max_delay(Duration::from_secs(60))
            .map(jitter)
            .take(self.max_attempts - 1);

        let inner = &self.inner;
        Retry::spawn(strategy, || {
            let request = request.clone();
            async move {
                match inner.generate(request).await {
                    Ok(text) => Ok(text),
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, provider = %inner.provider(), "Transient error, will retry");
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => {
                        warn!(error = %e, "Permanent error, failing immediately");
                        Err(RetryError::Permanent(e))
                    }
                }
            }
        })
        .await
    }

    fn provider(&self) -> Provider {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct Flaky {
        failures: Mutex<Vec<Error>>,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: Vec<Error>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for Flaky {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.failures.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => Ok("done".to_string()),
            }
        }

        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        fn model(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let client = Retrying::new(
            Flaky::new(vec![Error::Api {
                status: 401,
                message: "unauthorized".into(),
            }]),
            3,
        );
        let result = client.generate(GenerationRequest::new("hi")).await;
        assert!(matches!(result, Err(Error::Api { status: 401, .. })));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_gives_up_immediately() {
        let client = Retrying::new(Flaky::new(vec![Error::Network("reset".into())]), 1);
        let result = client.generate(GenerationRequest::new("hi")).await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let client = Retrying::new(Flaky::new(vec![Error::Network("reset".into())]), 2);
        let result = client.generate(GenerationRequest::new("hi")).await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let client = Retrying::new(Flaky::new(vec![]), 0);
        assert_eq!(client.max_attempts(), 1);
        assert_eq!(client.model(), "flaky");
    }
}
