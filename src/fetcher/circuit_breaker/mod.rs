//! Circuit breaker fetch layer
//!
//! The breaker throttles a site through a weighted semaphore. Every request
//! acquires a weight that depends on the circuit status:
//!
//! | Status | Weight | Concurrent requests |
//! |--------|--------|---------------------|
//! | Closed | 1 | `max_concurrency` |
//! | Open | `max_concurrency + 1` | none |
//! | HalfOpen | `max_concurrency / ladder[level]` | `ladder[level]` |
//!
//! Failures matched by the configured checks trip the circuit open. A
//! background task then holds it open for `open_duration` and walks the
//! recovery ladder one stage per `recover_stage_duration`, re-opening on
//! any failure and closing once the ladder is exhausted.

mod fail_check;

pub use fail_check::FailCheck;

use crate::config::CircuitBreakerConfig;
use crate::fetcher::{FetchResult, Fetcher};
use crate::state::{CircuitSnapshot, CircuitState, CircuitStatus};
use crate::{ConfigError, FetchError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wraps a fetcher with admission control and staged recovery
///
/// One instance per upstream site, shared by every concurrent fetch against
/// that site. Dropping the breaker aborts any running recovery task.
pub struct CircuitBreakerFetcher<F> {
    inner: F,
    breaker: Arc<Breaker>,
}

/// State shared between fetch calls and the recovery task
struct Breaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    semaphore: Semaphore,
    failure_checks: Vec<FailCheck>,
    recovery: Mutex<Option<JoinHandle<()>>>,
}

impl<F> CircuitBreakerFetcher<F> {
    /// Wraps `inner` with a closed circuit breaker
    ///
    /// Fails only when a failure check has a malformed value.
    pub fn new(config: CircuitBreakerConfig, inner: F) -> Result<Self, ConfigError> {
        let failure_checks = config
            .failure_checks
            .iter()
            .map(FailCheck::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let breaker = Breaker {
            semaphore: Semaphore::new(config.max_concurrency as usize),
            state: CircuitState::new(),
            failure_checks,
            recovery: Mutex::new(None),
            config,
        };

        Ok(Self {
            inner,
            breaker: Arc::new(breaker),
        })
    }

    pub fn status(&self) -> CircuitStatus {
        self.breaker.state.status()
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        self.breaker
            .state
            .snapshot(self.breaker.semaphore.available_permits())
    }

    /// Weight the next admission would have to acquire
    pub fn request_weight(&self) -> u32 {
        self.breaker.request_weight()
    }
}

impl<F> Drop for CircuitBreakerFetcher<F> {
    fn drop(&mut self) {
        if let Some(task) = self.breaker.take_recovery() {
            task.abort();
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for CircuitBreakerFetcher<F> {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        let _permit = self.breaker.acquire(cancel).await?;

        let result = self.inner.fetch(cancel, url).await;
        if !matches!(result, Err(FetchError::Cancelled)) {
            self.breaker.record_outcome(&result);
        }

        result
    }
}

impl Breaker {
    fn request_weight(&self) -> u32 {
        let max = self.config.max_concurrency;

        let weight = match self.state.status() {
            CircuitStatus::Closed => 1,
            CircuitStatus::Open => max.saturating_add(1),
            CircuitStatus::HalfOpen => {
                let ladder = &self.config.recover_ladder;
                // The level sits one past the ladder between the last stage and closing
                let target = ladder
                    .get(self.state.half_open_level())
                    .or_else(|| ladder.last());
                match target {
                    Some(&target) if target > 0 => max / target,
                    _ => max,
                }
            }
        };

        weight.max(1)
    }

    /// Admission loop
    ///
    /// Each attempt is bounded by `acquire_timeout`; on timeout the weight is
    /// recomputed, so a caller blocked while open resumes once recovery
    /// lowers the weight.
    ///
    /// A weight above capacity never joins the semaphore queue; it would sit
    /// at the head of the FIFO and hold back smaller waiters.
    async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SemaphorePermit<'_>, FetchError> {
        loop {
            let weight = self.request_weight();
            if weight > self.config.max_concurrency {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(self.config.acquire_timeout()) => {}
                }
                tracing::trace!(
                    "Admission of weight {} refused (circuit {}), retrying",
                    weight,
                    self.state.status()
                );
                tokio::task::yield_now().await;
                continue;
            }

            let attempt = tokio::time::timeout(
                self.config.acquire_timeout(),
                self.semaphore.acquire_many(weight),
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = attempt => match result {
                    Ok(Ok(permit)) => return Ok(permit),
                    Ok(Err(_)) => {
                        return Err(FetchError::Other(
                            "circuit breaker semaphore closed".to_string(),
                        ))
                    }
                    Err(_) => {
                        tracing::trace!(
                            "Admission of weight {} timed out (circuit {}), retrying",
                            weight,
                            self.state.status()
                        );
                        tokio::task::yield_now().await;
                    }
                },
            }
        }
    }

    fn take_recovery(&self) -> Option<JoinHandle<()>> {
        self.recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Hands the new recovery task its slot, aborting any previous one
    fn replace_recovery(&self, task: JoinHandle<()>) {
        let previous = self
            .recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn record_outcome(self: &Arc<Self>, result: &FetchResult) {
        if self.failure_checks.iter().any(|check| check.matches(result)) {
            let count = self.state.record_failure();
            tracing::debug!(
                "Fetch counted as failure ({}/{})",
                count,
                self.config.open_threshold
            );
            if count >= self.config.open_threshold {
                self.open_circuit();
            }
        } else if self.state.status() != CircuitStatus::HalfOpen {
            // A lone success while probing must not hide ongoing failures
            self.state.reset_failures();
        }
    }

    fn open_circuit(self: &Arc<Self>) {
        if !self.state.trip() {
            return;
        }

        tracing::warn!(
            "Circuit opened after {} failures, blocking for {:?}",
            self.config.open_threshold,
            self.config.open_duration()
        );

        let task = tokio::spawn(recover(Arc::clone(self)));
        self.replace_recovery(task);
    }
}

/// Recovery task: Open -> HalfOpen -> ladder walk -> Closed
///
/// Exits silently whenever a compare-and-swap shows another actor has
/// already moved the state on.
async fn recover(breaker: Arc<Breaker>) {
    let ladder_len = breaker.config.recover_ladder.len();

    'open: loop {
        tokio::time::sleep(breaker.config.open_duration()).await;

        if !breaker.state.begin_recovery() {
            return;
        }
        tracing::info!("Circuit half-open, walking {} recovery stages", ladder_len);

        for stage in 0..ladder_len {
            tokio::time::sleep(breaker.config.recover_stage_duration()).await;

            if breaker.state.failure_count() > 0 {
                if !breaker.state.trip() {
                    return;
                }
                tracing::warn!(
                    "Failure during recovery stage {}, circuit re-opened",
                    stage
                );
                continue 'open;
            }

            if !breaker.state.advance_half_open_level(stage) {
                return;
            }
            tracing::debug!(
                "Recovery stage {} passed, admitting up to {} requests",
                stage,
                breaker
                    .config
                    .recover_ladder
                    .get(stage + 1)
                    .copied()
                    .unwrap_or(breaker.config.max_concurrency)
            );
        }

        if breaker.state.close() {
            tracing::info!("Circuit closed, recovery complete");
        }
        break;
    }
}
