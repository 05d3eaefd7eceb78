//! Response body decoding
//!
//! Many novel sites still serve Big5 or GBK pages. The decoder turns the raw
//! response bytes into UTF-8 text according to the site's configuration.

use crate::config::DecoderConfig;
use crate::{ConfigError, FetchError};
use encoding_rs::{Encoding, BIG5, GBK};

/// Text encoding a site serves its pages in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMethod {
    /// No configured encoding; bytes are taken as UTF-8, lossily
    #[default]
    Passthrough,
    /// UTF-8; behaves exactly like pass-through
    Utf8,
    /// Traditional Chinese (Big5)
    Big5,
    /// Simplified Chinese (GBK)
    Gbk,
}

impl DecodeMethod {
    /// Parses a configured method name
    ///
    /// Returns None for names outside "utf8", "big5", "gbk" and "".
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" => Some(Self::Passthrough),
            "utf8" => Some(Self::Utf8),
            "big5" => Some(Self::Big5),
            "gbk" => Some(Self::Gbk),
            _ => None,
        }
    }
}

/// Converts raw response bytes into text
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    method: DecodeMethod,
}

impl Decoder {
    pub fn new(method: DecodeMethod) -> Self {
        Self { method }
    }

    /// Builds a decoder from the site's decoder section
    pub fn from_config(config: &DecoderConfig) -> Result<Self, ConfigError> {
        DecodeMethod::from_name(&config.method)
            .map(Self::new)
            .ok_or_else(|| {
                ConfigError::Validation(format!("unknown decode method '{}'", config.method))
            })
    }

    pub fn method(&self) -> DecodeMethod {
        self.method
    }

    /// Decodes a response body
    ///
    /// Malformed sequences become U+FFFD instead of failing the fetch; a
    /// page with a few stray bytes is still worth returning.
    pub fn decode(&self, raw: &[u8]) -> Result<String, FetchError> {
        let text = match self.method {
            DecodeMethod::Passthrough | DecodeMethod::Utf8 => {
                String::from_utf8_lossy(raw).into_owned()
            }
            DecodeMethod::Big5 => decode_with(BIG5, raw),
            DecodeMethod::Gbk => decode_with(GBK, raw),
        };
        Ok(text)
    }
}

fn decode_with(encoding: &'static Encoding, raw: &[u8]) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(raw);
    if had_errors {
        tracing::debug!("Replaced malformed {} sequences in body", encoding.name());
    }
    text.into_owned()
}
