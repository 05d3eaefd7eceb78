//! Configuration module for Novel-Fetch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Each `[[site]]` entry describes the fetch stack for one upstream site.
//!
//! # Example
//!
//! ```no_run
//! use novel_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sites.toml")).unwrap();
//! for site in &config.site {
//!     println!("{}: threshold {}", site.name, site.circuit_breaker.open_threshold);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckConfig, CircuitBreakerConfig, Config, DecoderConfig, FetcherConfig, RetryConditionConfig,
    RetryConfig, SiteConfig,
};
pub(crate) use types::{pattern_from_value, status_codes_from_value};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
