// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for LLM API calls with exponential backoff

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::settings::ResilienceConfig;
use crate::error::{ApiError, Error, Result};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        let jitter_range = (capped_ms as f64 * self.jitter.clamp(0.0, 1.0)) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }

    /// Backoff for `error`, stretched to a server-provided retry-after hint
    fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match error {
            Error::Api(ApiError::RateLimited(secs)) => {
                let hinted = Duration::from_secs(u64::from(*secs))
                    .min(Duration::from_millis(self.max_delay_ms));
                backoff.max(hinted)
            }
            _ => backoff,
        }
    }
}

/// Determine if an error is retryable
pub fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Api(api_error) => match api_error {
            ApiError::Network(_) => true,
            ApiError::RateLimited(_) => true,
            ApiError::Timeout => true,
            ApiError::ServerError { status, .. } => (500..600).contains(status),

            ApiError::AuthenticationFailed => false,
            ApiError::ModelNotFound(_) => false,
            ApiError::ContextTooLong { .. } => false,
            ApiError::InvalidResponse(_) => false,
        },
        Error::Http(err) => err.is_timeout() || err.is_connect(),
        _ => false,
    }
}

/// Retry an async operation with exponential backoff
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        target: "sqlsage.retry",
                        operation = operation_name,
                        attempts = attempt + 1,
                        "succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(
                        target: "sqlsage.retry",
                        operation = operation_name,
                        error = %error,
                        "non-retryable failure"
                    );
                    return Err(error);
                }

                if attempt >= config.max_retries {
                    tracing::warn!(
                        target: "sqlsage.retry",
                        operation = operation_name,
                        retries = config.max_retries,
                        error = %error,
                        "retries exhausted"
                    );
                    return Err(error);
                }

                let delay = config.delay_for(attempt, &error);
                tracing::warn!(
                    target: "sqlsage.retry",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Provider decorator that retries transient failures of the inner provider
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    /// Wrap `inner` with the given retry policy
    pub fn new(inner: Arc<dyn LlmProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let operation_name = format!("{}.complete", self.inner.name());
        with_retry(
            || self.inner.complete(request.clone()),
            &self.config,
            &operation_name,
        )
        .await
    }
}
