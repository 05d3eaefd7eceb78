//! State module for circuit breaker bookkeeping
//!
//! This module holds the lock-free state a circuit breaker shares between
//! every concurrent fetch against one upstream site.
//!
//! # Components
//!
//! - `CircuitStatus`: Closed, Open or HalfOpen
//! - `CircuitState`: atomic status, failure counter and recovery level
//! - `CircuitSnapshot`: a point-in-time copy for logging and inspection

mod circuit_state;
mod circuit_status;

// Re-export main types
pub use circuit_state::{CircuitSnapshot, CircuitState};
pub use circuit_status::CircuitStatus;
