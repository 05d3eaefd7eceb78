/// Circuit status definitions
///
/// This module defines the three states a circuit breaker moves between.
use std::fmt;

/// Represents the current status of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitStatus {
    /// Requests flow normally
    Closed = 0,

    /// Every admission attempt is refused until recovery starts
    Open = 1,

    /// Recovery in progress; admission ramps up stage by stage
    HalfOpen = 2,
}

impl CircuitStatus {
    /// Returns the raw representation stored in the atomic status cell
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a raw status value back into a status
    ///
    /// Unknown values map to `Closed`; the atomic cell is only ever written
    /// through `as_u8`, so this never happens in practice.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }

    /// Returns a short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }

    /// Returns true if requests are admitted at full concurrency
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
