//! HTTP fetcher implementation
//!
//! This module performs the actual network request for the fetch stack:
//! - Building the HTTP client with the site's timeout and user agent
//! - GET requests for page content
//! - Error classification into the `FetchError` taxonomy
//! - Body decoding through the site's `Decoder`

use crate::config::{DecoderConfig, FetcherConfig};
use crate::fetcher::{Decoder, FetchResult, Fetcher};
use crate::{ConfigError, FetchError};
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use tokio_util::sync::CancellationToken;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The site's fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use novel_fetch::config::FetcherConfig;
/// use novel_fetch::fetcher::build_http_client;
///
/// let config = FetcherConfig {
///     request_timeout: 30_000,
///     user_agent: Some("novel-fetch/0.1".to_string()),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(config.request_timeout())
        .gzip(true)
        .brotli(true);

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }

    builder.build()
}

/// The innermost fetch layer: one HTTP GET per call
#[derive(Debug, Clone)]
pub struct BaseFetcher {
    client: Client,
    decoder: Decoder,
}

impl BaseFetcher {
    pub fn new(client: Client, decoder: Decoder) -> Self {
        Self { client, decoder }
    }

    /// Builds the client and decoder from a site's configuration
    pub fn from_config(
        fetcher: &FetcherConfig,
        decoder: &DecoderConfig,
    ) -> Result<Self, ConfigError> {
        let client = build_http_client(fetcher)?;
        let decoder = Decoder::from_config(decoder)?;
        Ok(Self::new(client, decoder))
    }

    /// Fetches a URL and decodes the body
    ///
    /// # Error Mapping
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Request timeout | `Timeout` |
    /// | Connection reset by peer | `ConnectionReset` |
    /// | Other transport error | `Other` |
    /// | Status outside 200..300 | `StatusCode(code)` |
    /// | Body read fails | `Timeout` or `Other` |
    async fn get(&self, url: &str) -> FetchResult {
        let response = self.client.get(url).send().await.map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::StatusCode(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify_error)?;
        self.decoder.decode(&body)
    }
}

#[async_trait]
impl Fetcher for BaseFetcher {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> FetchResult {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(url) => {
                if let Err(e) = &result {
                    tracing::trace!("GET {} failed: {}", url, e);
                }
                result
            }
        }
    }
}

/// Classifies a transport error
fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if is_connection_reset(&error) {
        FetchError::ConnectionReset
    } else {
        FetchError::Other(error.to_string())
    }
}

/// Walks the error source chain looking for a reset connection
fn is_connection_reset(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        current = err.source();
    }
    false
}
