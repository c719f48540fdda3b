use crate::domain::RetryPolicy;
use async_trait::async_trait;
use common::domain::{
    CommitFrameRepoInput, DomainError, DomainResult, GetLastParsedReadingRepoInput, IngestedFrame,
    ParsedReading, TelemetryRepository,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Telemetry repository decorator that retries transient storage failures.
///
/// Only `DomainError::StorageUnavailable` is retried. Once the policy is
/// exhausted the last failure is reported as
/// `DomainError::StorageRetriesExhausted`; every other error is returned
/// untouched on first sight.
pub struct RetryingTelemetryRepository {
    inner: Arc<dyn TelemetryRepository>,
    policy: RetryPolicy,
}

impl RetryingTelemetryRepository {
    pub fn new(inner: Arc<dyn TelemetryRepository>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if !self.policy.should_retry(attempt) {
                        error!(
                            operation,
                            attempts = attempt,
                            error = %err,
                            "storage still unavailable, giving up"
                        );
                        return Err(DomainError::StorageRetriesExhausted {
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "storage unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TelemetryRepository for RetryingTelemetryRepository {
    async fn commit_frame(&self, input: CommitFrameRepoInput) -> DomainResult<IngestedFrame> {
        self.with_retry("commit_frame", || self.inner.commit_frame(input.clone()))
            .await
    }

    async fn get_last_parsed_reading(
        &self,
        input: GetLastParsedReadingRepoInput,
    ) -> DomainResult<Option<ParsedReading>> {
        self.with_retry("get_last_parsed_reading", || {
            self.inner.get_last_parsed_reading(input.clone())
        })
        .await
    }
}
