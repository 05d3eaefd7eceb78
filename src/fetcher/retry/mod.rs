//! Budgeted retry fetch layer
//!
//! Each failed (or suspicious) fetch is checked against the configured
//! conditions in order. The first matching condition charges its weight to
//! the retry budget, pauses according to its backoff shape and triggers
//! another attempt. Retrying stops when no condition matches or when the
//! consumed weight reaches `max_retry_weight`.

mod backoff;
mod check;

pub use backoff::{pause_duration, PauseIntervalType};
pub use check::{RetryCondition, RetryDecision, RetryKind};

use crate::config::RetryConfig;
use crate::fetcher::{FetchResult, Fetcher};
use crate::{ConfigError, FetchError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Wraps a fetcher with condition-driven retries
pub struct RetryFetcher<F> {
    inner: F,
    max_retry_weight: u32,
    conditions: Vec<RetryCondition>,
}

impl<F> RetryFetcher<F> {
    pub fn new(max_retry_weight: u32, conditions: Vec<RetryCondition>, inner: F) -> Self {
        Self {
            inner,
            max_retry_weight,
            conditions,
        }
    }

    /// Builds the retry layer from a site's retry section
    pub fn from_config(config: &RetryConfig, inner: F) -> Result<Self, ConfigError> {
        let conditions = config
            .conditions
            .iter()
            .map(RetryCondition::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(config.max_retry_weight, conditions, inner))
    }

    pub fn max_retry_weight(&self) -> u32 {
        self.max_retry_weight
    }

    pub fn conditions(&self) -> &[RetryCondition] {
        &self.conditions
    }

    /// First condition in configured order that wants `result` retried
    fn decide(&self, attempt: u32, result: &FetchResult) -> Option<RetryDecision> {
        self.conditions
            .iter()
            .find_map(|condition| condition.evaluate(attempt, result))
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryFetcher<F> {
    /// Fetches `url`, retrying while conditions match and budget remains
    ///
    /// The budget is only checked before an attempt, so the final retry may
    /// push the consumed weight past `max_retry_weight`. The last result is
    /// returned as-is once the budget is spent.
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        let mut consumed: u32 = 0;
        let mut attempt: u32 = 0;

        loop {
            let result = self.inner.fetch(cancel, url).await;
            if matches!(result, Err(FetchError::Cancelled)) {
                return result;
            }

            let Some(decision) = self.decide(attempt, &result) else {
                return result;
            };

            consumed = consumed.saturating_add(decision.weight);
            tracing::debug!(
                "Retrying {} (attempt {}, weight {}/{}, pause {:?}): {:?}",
                url,
                attempt,
                consumed,
                self.max_retry_weight,
                decision.pause,
                result.as_ref().err()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(decision.pause) => {}
            }
            attempt += 1;

            if consumed >= self.max_retry_weight {
                tracing::debug!("Retry budget exhausted for {} after {} attempts", url, attempt);
                return result;
            }
        }
    }
}
