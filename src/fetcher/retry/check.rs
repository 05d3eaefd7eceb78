use crate::config::{pattern_from_value, status_codes_from_value, RetryConditionConfig};
use crate::fetcher::retry::backoff::{pause_duration, PauseIntervalType};
use crate::fetcher::FetchResult;
use crate::{ConfigError, FetchError};
use regex::Regex;
use std::time::Duration;

/// What a retry condition looks for in a fetch result
#[derive(Debug, Clone)]
pub enum RetryKind {
    /// The fetch failed with one of these status codes
    StatusCodeIn(Vec<u16>),
    /// The fetch timed out
    Timeout,
    /// The peer reset the connection
    ConnectionReset,
    /// The body contains a non-empty match for this pattern, regardless of error
    BodyMatches(Regex),
    /// A config kind this crate does not know; never retries
    Unknown(String),
}

impl RetryKind {
    pub fn matches(&self, result: &FetchResult) -> bool {
        match self {
            Self::StatusCodeIn(codes) => matches!(
                result,
                Err(FetchError::StatusCode(code)) if codes.contains(code)
            ),
            Self::Timeout => matches!(result, Err(FetchError::Timeout)),
            Self::ConnectionReset => matches!(result, Err(FetchError::ConnectionReset)),
            Self::BodyMatches(pattern) => pattern
                .find(result.as_deref().unwrap_or_default())
                .is_some_and(|m| !m.as_str().is_empty()),
            Self::Unknown(_) => false,
        }
    }
}

/// A retry condition with its cost and backoff schedule
#[derive(Debug, Clone)]
pub struct RetryCondition {
    pub kind: RetryKind,
    pub weight: u32,
    pub pause_interval: Duration,
    pub pause_interval_type: PauseIntervalType,
}

/// The cost and pause of one retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub weight: u32,
    pub pause: Duration,
}

impl RetryCondition {
    pub const STATUS_CODES: &'static str = "status-codes";
    pub const TIMEOUT: &'static str = "timeout";
    pub const CONNECTION_RESET: &'static str = "connection-reset";
    pub const BODY_CONTAINS: &'static str = "body-contains";

    /// Builds a condition from its config entry
    ///
    /// Unknown kinds become [`RetryKind::Unknown`]; malformed values and
    /// invalid body patterns are errors.
    pub fn from_config(config: &RetryConditionConfig) -> Result<Self, ConfigError> {
        let kind = match config.kind.as_str() {
            Self::STATUS_CODES => {
                RetryKind::StatusCodeIn(status_codes_from_value(config.value.as_ref())?)
            }
            // "error" is the older name for timeout retries
            Self::TIMEOUT | "error" => RetryKind::Timeout,
            Self::CONNECTION_RESET => RetryKind::ConnectionReset,
            Self::BODY_CONTAINS => {
                let pattern = pattern_from_value(config.value.as_ref())?;
                let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                RetryKind::BodyMatches(regex)
            }
            other => {
                tracing::warn!("Unknown retry condition kind '{}', condition disabled", other);
                RetryKind::Unknown(other.to_string())
            }
        };

        if config.weight < 1 {
            return Err(ConfigError::Validation(format!(
                "retry condition '{}' must have weight >= 1",
                config.kind
            )));
        }

        let pause_interval_type = PauseIntervalType::from_name(&config.pause_interval_type);
        if pause_interval_type == PauseIntervalType::Unknown {
            tracing::warn!(
                "Unknown pause interval type '{}', retries will not pause",
                config.pause_interval_type
            );
        }

        Ok(Self {
            kind,
            weight: config.weight,
            pause_interval: config.pause_interval(),
            pause_interval_type,
        })
    }

    /// Decides whether `result` of the given 0-indexed attempt is retried
    pub fn evaluate(&self, attempt: u32, result: &FetchResult) -> Option<RetryDecision> {
        if !self.kind.matches(result) {
            return None;
        }

        Some(RetryDecision {
            weight: self.weight,
            pause: pause_duration(attempt, self.pause_interval, self.pause_interval_type),
        })
    }
}
