use crate::config::{status_codes_from_value, CheckConfig};
use crate::fetcher::FetchResult;
use crate::{ConfigError, FetchError};

/// Predicate deciding whether a fetch result counts against the circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailCheck {
    /// Fails when the fetch returned one of these status codes
    StatusCodes(Vec<u16>),

    /// Never fails; built for check kinds this crate does not know
    Never,
}

impl FailCheck {
    /// Config kind for [`FailCheck::StatusCodes`]
    pub const STATUS_CODES: &'static str = "status-codes";

    /// Builds a check from its config entry
    ///
    /// Unknown kinds degrade to [`FailCheck::Never`]; a malformed value for
    /// a known kind is an error.
    pub fn from_config(config: &CheckConfig) -> Result<Self, ConfigError> {
        match config.kind.as_str() {
            Self::STATUS_CODES => Ok(Self::StatusCodes(status_codes_from_value(
                config.value.as_ref(),
            )?)),
            other => {
                tracing::warn!("Unknown failure check kind '{}', check disabled", other);
                Ok(Self::Never)
            }
        }
    }

    pub fn matches(&self, result: &FetchResult) -> bool {
        match (self, result) {
            (Self::StatusCodes(codes), Err(FetchError::StatusCode(code))) => codes.contains(code),
            _ => false,
        }
    }
}
