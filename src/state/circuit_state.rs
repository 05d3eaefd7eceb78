use crate::state::CircuitStatus;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

/// Lock-free state shared by every fetch going through one circuit breaker
///
/// Each field is an independent atomic. Transitions that must happen once
/// (tripping, entering recovery, closing) are compare-and-swap on the
/// status, so exactly one concurrent actor wins each of them.
#[derive(Debug)]
pub struct CircuitState {
    status: AtomicU8,
    failure_count: AtomicU32,
    half_open_level: AtomicUsize,
}

/// A point-in-time copy of a circuit breaker's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub half_open_level: usize,
    pub available_permits: usize,
}

impl CircuitState {
    /// Creates a closed circuit with no recorded failures
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(CircuitStatus::Closed.as_u8()),
            failure_count: AtomicU32::new(0),
            half_open_level: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> CircuitStatus {
        CircuitStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Overwrites the status without resetting anything else
    pub fn store_status(&self, status: CircuitStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    /// Atomically moves the status from `current` to `new`
    ///
    /// Returns false if another actor changed the status first.
    pub fn compare_and_swap_status(&self, current: CircuitStatus, new: CircuitStatus) -> bool {
        self.status
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Records one failure and returns the new count
    pub fn record_failure(&self) -> u32 {
        self.failure_count
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
    }

    pub fn reset_failures(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub fn half_open_level(&self) -> usize {
        self.half_open_level.load(Ordering::SeqCst)
    }

    pub fn store_half_open_level(&self, level: usize) {
        self.half_open_level.store(level, Ordering::SeqCst);
    }

    /// Moves the recovery level from `stage` to `stage + 1`
    ///
    /// Returns false if the level no longer equals `stage`.
    pub fn advance_half_open_level(&self, stage: usize) -> bool {
        self.half_open_level
            .compare_exchange(stage, stage + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Moves any non-open status to `Open`
    ///
    /// Returns true only for the actor that performed the transition; the
    /// winner resets the recovery level and the failure count and is
    /// responsible for scheduling recovery.
    pub fn trip(&self) -> bool {
        loop {
            let current = self.status();
            if current == CircuitStatus::Open {
                return false;
            }
            if self.compare_and_swap_status(current, CircuitStatus::Open) {
                self.store_half_open_level(0);
                self.reset_failures();
                return true;
            }
        }
    }

    /// Moves `Open` to `HalfOpen` and clears the recovery counters
    pub fn begin_recovery(&self) -> bool {
        if !self.compare_and_swap_status(CircuitStatus::Open, CircuitStatus::HalfOpen) {
            return false;
        }
        self.store_half_open_level(0);
        self.reset_failures();
        true
    }

    /// Moves `HalfOpen` to `Closed` once the recovery ladder is exhausted
    pub fn close(&self) -> bool {
        if !self.compare_and_swap_status(CircuitStatus::HalfOpen, CircuitStatus::Closed) {
            return false;
        }
        self.store_half_open_level(0);
        true
    }

    /// Copies the current state; `available_permits` comes from the semaphore
    pub fn snapshot(&self, available_permits: usize) -> CircuitSnapshot {
        CircuitSnapshot {
            status: self.status(),
            failure_count: self.failure_count(),
            half_open_level: self.half_open_level(),
            available_permits,
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::new()
    }
}
