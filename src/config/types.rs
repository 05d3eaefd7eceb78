use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Novel-Fetch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// One entry per upstream site; each gets its own fetch stack
    #[serde(default)]
    pub site: Vec<SiteConfig>,
}

impl Config {
    /// Looks up a site by name
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.site.iter().find(|site| site.name == name)
    }
}

/// Fetch stack configuration for a single upstream site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier, used in logs and on the command line
    pub name: String,

    /// Body decoding
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Base HTTP fetcher settings
    pub fetcher: FetcherConfig,

    /// Circuit breaker settings
    #[serde(rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy; no retry layer is built when absent
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

/// Body decoder configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecoderConfig {
    /// One of "utf8", "big5", "gbk", or "" for pass-through
    #[serde(default)]
    pub method: String,
}

/// Base fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,
}

impl FetcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of matched failures that trips the breaker
    #[serde(rename = "open-threshold")]
    pub open_threshold: u32,

    /// Maximum wait per admission attempt (milliseconds)
    #[serde(rename = "acquire-timeout")]
    pub acquire_timeout: u64,

    /// Total semaphore capacity
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: u32,

    /// Concurrency targets walked in order during recovery
    #[serde(rename = "recover-ladder")]
    pub recover_ladder: Vec<u32>,

    /// Time fully blocked before the first recovery stage (milliseconds)
    #[serde(rename = "open-duration")]
    pub open_duration: u64,

    /// Time spent at each ladder stage (milliseconds)
    #[serde(rename = "recover-stage-duration")]
    pub recover_stage_duration: u64,

    /// Predicates that count a fetch result as a failure
    #[serde(rename = "failure-checks", default)]
    pub failure_checks: Vec<CheckConfig>,
}

impl CircuitBreakerConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout)
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration)
    }

    pub fn recover_stage_duration(&self) -> Duration {
        Duration::from_millis(self.recover_stage_duration)
    }
}

/// A circuit breaker failure check
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// Check kind, e.g. "status-codes"
    pub kind: String,

    /// Kind-specific value
    #[serde(default)]
    pub value: Option<toml::Value>,
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total weight retries of one fetch may consume
    #[serde(rename = "max-retry-weight")]
    pub max_retry_weight: u32,

    /// Conditions evaluated in order; the first match decides the retry
    #[serde(default)]
    pub conditions: Vec<RetryConditionConfig>,
}

/// A single retry condition
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConditionConfig {
    /// One of "status-codes", "timeout", "connection-reset", "body-contains"
    pub kind: String,

    /// Kind-specific value (status code list or body regex)
    #[serde(default)]
    pub value: Option<toml::Value>,

    /// Budget consumed by one retry under this condition
    pub weight: u32,

    /// Base backoff interval (milliseconds)
    #[serde(rename = "pause-interval")]
    pub pause_interval: u64,

    /// One of "const", "linear", "exponential"
    #[serde(rename = "pause-interval-type")]
    pub pause_interval_type: String,
}

impl RetryConditionConfig {
    pub fn pause_interval(&self) -> Duration {
        Duration::from_millis(self.pause_interval)
    }
}

/// Reads a list of HTTP status codes out of a check or condition value
pub(crate) fn status_codes_from_value(
    value: Option<&toml::Value>,
) -> Result<Vec<u16>, ConfigError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let items = value.as_array().ok_or_else(|| {
        ConfigError::Validation(format!("status code list expected, got {}", value))
    })?;

    items
        .iter()
        .map(|item| {
            item.as_integer()
                .filter(|code| (100..=599).contains(code))
                .map(|code| code as u16)
                .ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "status codes must be integers between 100 and 599, got {}",
                        item
                    ))
                })
        })
        .collect()
}

/// Reads a regex pattern string out of a condition value
pub(crate) fn pattern_from_value(value: Option<&toml::Value>) -> Result<&str, ConfigError> {
    value.and_then(|v| v.as_str()).ok_or_else(|| {
        ConfigError::Validation("body pattern must be a string".to_string())
    })
}
