use crate::config::types::{
    CircuitBreakerConfig, Config, DecoderConfig, FetcherConfig, RetryConfig, SiteConfig,
};
use crate::fetcher::{DecodeMethod, FailCheck, RetryCondition};
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.site.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] entry is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for site in &config.site {
        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate site name '{}'",
                site.name
            )));
        }
        validate_site(site)?;
    }

    Ok(())
}

/// Validates a single site entry
pub(crate) fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "site name cannot be empty".to_string(),
        ));
    }

    validate_decoder_config(&site.decoder)?;
    validate_fetcher_config(&site.fetcher)?;
    validate_circuit_breaker_config(&site.circuit_breaker)?;
    if let Some(retry) = &site.retry {
        validate_retry_config(retry)?;
    }

    Ok(())
}

fn validate_decoder_config(config: &DecoderConfig) -> Result<(), ConfigError> {
    if DecodeMethod::from_name(&config.method).is_none() {
        return Err(ConfigError::Validation(format!(
            "decoder method must be one of \"utf8\", \"big5\", \"gbk\" or empty, got '{}'",
            config.method
        )));
    }
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1ms, got {}ms",
            config.request_timeout
        )));
    }
    Ok(())
}

fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.open_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "open_threshold must be >= 1, got {}",
            config.open_threshold
        )));
    }

    if config.max_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be >= 1, got {}",
            config.max_concurrency
        )));
    }

    if config.recover_ladder.is_empty() {
        return Err(ConfigError::Validation(
            "recover_ladder must contain at least one stage".to_string(),
        ));
    }

    if config.recover_ladder.iter().any(|&rung| rung < 1) {
        return Err(ConfigError::Validation(format!(
            "recover_ladder stages must be >= 1, got {:?}",
            config.recover_ladder
        )));
    }

    if config.recover_ladder.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(ConfigError::Validation(format!(
            "recover_ladder must be non-decreasing, got {:?}",
            config.recover_ladder
        )));
    }

    if config
        .recover_ladder
        .iter()
        .any(|&rung| rung > config.max_concurrency)
    {
        tracing::warn!(
            "recover_ladder {:?} has stages above max_concurrency {}; they admit at full concurrency",
            config.recover_ladder,
            config.max_concurrency
        );
    }

    for check in &config.failure_checks {
        FailCheck::from_config(check)?;
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retry_weight < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retry_weight must be >= 1, got {}",
            config.max_retry_weight
        )));
    }

    for condition in &config.conditions {
        RetryCondition::from_config(condition)?;
    }

    Ok(())
}
