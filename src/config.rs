//! Client configuration.

use std::time::Duration;

use crate::types::LineBase;

/// Validator base URL used when nothing else is configured.
pub const DEFAULT_VALIDATOR_URL: &str = "http://localhost:4567";

/// Environment variable overriding the validator base URL.
pub const VALIDATOR_URL_ENV: &str = "EXTERNAL_VALIDATOR_URL";

/// Default timeout for HTTP requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for talking to the external validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the validator service; endpoint paths are appended to it.
    pub base_url: String,
    pub timeout: Duration,
    /// How the validator numbers the lines in its issue-line extension.
    pub line_base: LineBase,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            line_base: LineBase::default(),
        }
    }

    /// Configuration from `EXTERNAL_VALIDATOR_URL`, falling back to the default URL.
    pub fn from_env() -> Self {
        match std::env::var(VALIDATOR_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn line_base(mut self, line_base: LineBase) -> Self {
        self.line_base = line_base;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATOR_URL)
    }
}
