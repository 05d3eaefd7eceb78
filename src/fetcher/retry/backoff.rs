use std::time::Duration;

/// Shape of the pause inserted before a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseIntervalType {
    /// Same pause every time
    Const,
    /// Pause grows with the attempt number
    Linear,
    /// Pause grows with the square of the attempt number
    Exponential,
    /// Unrecognised config value; no pause
    Unknown,
}

impl PauseIntervalType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "const" => Self::Const,
            "linear" => Self::Linear,
            "exponential" => Self::Exponential,
            _ => Self::Unknown,
        }
    }
}

/// Computes the pause before retrying after the given 0-indexed attempt
///
/// With `n = attempt + 1`: const is `base`, linear is `n * base`,
/// exponential is `n² * base`. Unknown types never pause.
pub fn pause_duration(attempt: u32, base: Duration, interval_type: PauseIntervalType) -> Duration {
    let n = attempt.saturating_add(1);
    match interval_type {
        PauseIntervalType::Const => base,
        PauseIntervalType::Linear => base.saturating_mul(n),
        PauseIntervalType::Exponential => base.saturating_mul(n.saturating_mul(n)),
        PauseIntervalType::Unknown => Duration::ZERO,
    }
}
