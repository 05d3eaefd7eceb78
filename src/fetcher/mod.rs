//! Fetcher layers for pulling pages off novel sites
//!
//! This module contains the composable fetch stack:
//! - `BaseFetcher`: HTTP GET, error classification and body decoding
//! - `CircuitBreakerFetcher`: weighted admission, tripping and staged recovery
//! - `RetryFetcher`: condition-driven retries under a weight budget
//!
//! Every layer implements [`Fetcher`], so a stack is built by wrapping:
//! `RetryFetcher<CircuitBreakerFetcher<BaseFetcher>>`.

mod base;
mod circuit_breaker;
mod decoder;
mod retry;

pub use base::{build_http_client, BaseFetcher};
pub use circuit_breaker::{CircuitBreakerFetcher, FailCheck};
pub use decoder::{DecodeMethod, Decoder};
pub use retry::{
    pause_duration, PauseIntervalType, RetryCondition, RetryDecision, RetryFetcher, RetryKind,
};

use crate::config::SiteConfig;
use crate::state::CircuitSnapshot;
use crate::{ConfigError, FetchError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of a single fetch: decoded body text or a typed failure
pub type FetchResult = Result<String, FetchError>;

/// The capability every fetch layer provides
///
/// Implementations must be safe to call concurrently. Once `cancel` fires,
/// a fetch returns `FetchError::Cancelled` promptly, including while it is
/// waiting for admission or backing off between retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        (**self).fetch(cancel, url).await
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Box<F> {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        (**self).fetch(cancel, url).await
    }
}

/// Derives a token that is cancelled with `parent` or after `after` elapses
///
/// A timer task runs until the token is cancelled, so callers that finish
/// early should cancel it themselves, e.g. by holding
/// `token.clone().drop_guard()` for the duration of the work.
///
/// Must be called from within a Tokio runtime.
pub fn with_deadline(parent: &CancellationToken, after: Duration) -> CancellationToken {
    let token = parent.child_token();
    spawn_deadline_timer(token.clone(), after);
    token
}

fn spawn_deadline_timer(token: CancellationToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(after) => token.cancel(),
        }
    })
}

/// The assembled fetch stack for one upstream site
///
/// Keeps a handle on the circuit breaker so its state can be inspected
/// while the (optionally retrying) stack is in use.
pub struct SiteFetcher {
    name: String,
    breaker: Arc<CircuitBreakerFetcher<BaseFetcher>>,
    stack: Box<dyn Fetcher>,
}

impl SiteFetcher {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current circuit breaker state for this site
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        self.stack.fetch(cancel, url).await
    }
}

/// Builds `Retry(CircuitBreaker(Base))` for a site
///
/// The retry layer is left out when the site has no `retry` section.
/// Must be called from within a Tokio runtime if the breaker may trip.
pub fn build_site_fetcher(site: &SiteConfig) -> Result<SiteFetcher, ConfigError> {
    let base = BaseFetcher::from_config(&site.fetcher, &site.decoder)?;
    let breaker = Arc::new(CircuitBreakerFetcher::new(
        site.circuit_breaker.clone(),
        base,
    )?);

    let stack: Box<dyn Fetcher> = match &site.retry {
        Some(retry) => Box::new(RetryFetcher::from_config(retry, Arc::clone(&breaker))?),
        None => Box::new(Arc::clone(&breaker)),
    };

    tracing::debug!(
        "Built fetch stack for site '{}' (retry layer: {})",
        site.name,
        site.retry.is_some()
    );

    Ok(SiteFetcher {
        name: site.name.clone(),
        breaker,
        stack,
    })
}
