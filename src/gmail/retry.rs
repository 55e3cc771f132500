use std::future::Future;

use async_trait::async_trait;
use tracing::info;

use super::EmailSource;
use crate::config::RetryPolicy;
use crate::errors::IngestResult;
use crate::types::{MessageFilter, MessageSummary, RawMessage};

/// Retries transient failures of the wrapped source with exponential backoff.
/// Authorization and protocol failures are returned on the first attempt.
#[derive(Clone, Debug)]
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> IngestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    info!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient upstream failure; retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: EmailSource> EmailSource for RetryingSource<S> {
    async fn list_candidates(
        &self,
        access_token: &str,
        filter: &MessageFilter,
        max_results: u32,
    ) -> IngestResult<Vec<MessageSummary>> {
        self.run("list_candidates", move || {
            self.inner.list_candidates(access_token, filter, max_results)
        })
        .await
    }

    async fn fetch_full(&self, access_token: &str, id: &str) -> IngestResult<RawMessage> {
        self.run("fetch_full", move || self.inner.fetch_full(access_token, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IngestError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures: Vec<IngestError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmailSource for Flaky {
        async fn list_candidates(
            &self,
            _access_token: &str,
            _filter: &MessageFilter,
            _max_results: u32,
        ) -> IngestResult<Vec<MessageSummary>> {
            unreachable!("not exercised")
        }

        async fn fetch_full(&self, _access_token: &str, id: &str) -> IngestResult<RawMessage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some(err) => Err(err.clone()),
                None => Ok(RawMessage(serde_json::json!({ "id": id }))),
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let source = RetryingSource::new(
            Flaky {
                failures: vec![
                    IngestError::Transient("503".into()),
                    IngestError::Transient("429".into()),
                ],
                calls: AtomicU32::new(0),
            },
            policy(3),
        );
        let raw = source.fetch_full("tok", "m1").await.unwrap();
        assert_eq!(raw.0["id"], "m1");
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let source = RetryingSource::new(
            Flaky {
                failures: vec![IngestError::Transient("503".into()); 5],
                calls: AtomicU32::new(0),
            },
            policy(2),
        );
        let err = source.fetch_full("tok", "m1").await.unwrap_err();
        assert!(matches!(err, IngestError::Transient(_)));
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let source = RetryingSource::new(
            Flaky {
                failures: vec![IngestError::Auth("401".into())],
                calls: AtomicU32::new(0),
            },
            policy(3),
        );
        let err = source.fetch_full("tok", "m1").await.unwrap_err();
        assert!(matches!(err, IngestError::Auth(_)));
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 1);
    }
}
