//! Novel-Fetch: a resilient fetch stack for novel sites
//!
//! This crate implements the HTTP client layers a crawl pipeline sits on:
//! a bare fetcher with body decoding, a circuit breaker with staged
//! recovery, and a budgeted retry engine. Every layer implements the same
//! [`fetcher::Fetcher`] trait so they compose by wrapping.

pub mod config;
pub mod fetcher;
pub mod state;

use thiserror::Error;

/// Failure taxonomy shared by every fetch layer
///
/// The base fetcher is the only place transport errors are translated into
/// these variants; outer layers match on them directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status code: {0}")]
    StatusCode(u16),

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Returns the status code if this is a `StatusCode` failure
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::StatusCode(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the caller cancelled the fetch
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Invalid body pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetcher::{
    build_site_fetcher, with_deadline, BaseFetcher, CircuitBreakerFetcher, Decoder, FetchResult,
    Fetcher, RetryFetcher, SiteFetcher,
};
pub use state::{CircuitSnapshot, CircuitStatus};
