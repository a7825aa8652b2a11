use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub const API_KEY_ENV: &str = "ERUDITE_API_KEY";
pub const CONCURRENCY_ENV: &str = "ERUDITE_CONCURRENCY";
pub const MAX_RETRIES_ENV: &str = "ERUDITE_MAX_RETRIES";

/// Connection and batching settings for the target store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `http://localhost:8080`
    pub url: String,
    /// Sent as a bearer token when present
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub connect_timeout_seconds: u32,
    pub request_timeout_seconds: u32,
    /// Deadline for one operation including the client's own timeouts
    pub operation_timeout_seconds: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Upserts and links in flight at once
    pub concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_key: None,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 60,
            operation_timeout_seconds: 90,
            max_retries: 3,
            retry_base_delay_ms: 250,
            concurrency: 8,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Settings for `url` with environment overrides applied.
    ///
    /// Unparseable numeric values are ignored.
    #[must_use]
    pub fn from_env(url: impl Into<String>) -> Self {
        Self::from_lookup(url, |key| std::env::var(key).ok())
    }

    fn from_lookup(url: impl Into<String>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(url);
        config.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
        if let Some(n) = lookup(CONCURRENCY_ENV).and_then(|v| v.trim().parse().ok()) {
            config.concurrency = n;
        }
        if let Some(n) = lookup(MAX_RETRIES_ENV).and_then(|v| v.trim().parse().ok()) {
            config.max_retries = n;
        }
        config
    }

    /// Replace the key unless `key` is `None`.
    #[must_use]
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        if key.is_some() {
            self.api_key = key;
        }
        self
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_retry_base_delay_ms(mut self, delay: u64) -> Self {
        self.retry_base_delay_ms = delay;
        self
    }

    #[must_use]
    pub const fn with_operation_timeout_seconds(mut self, seconds: u32) -> Self {
        self.operation_timeout_seconds = seconds;
        self
    }

    pub fn base_url(&self) -> Result<Url, StoreConfigError> {
        let parsed = Url::parse(&self.url).map_err(|e| StoreConfigError::InvalidUrl(format!("{}: {e}", self.url)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        if parsed.host_str().is_none() {
            return Err(StoreConfigError::InvalidUrl(format!("{}: no host", self.url)));
        }
        Ok(parsed)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds as u64)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds as u64)
    }

    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds as u64)
    }

    pub fn validate(&self) -> Result<(), StoreConfigError> {
        self.base_url()?;
        if self.concurrency == 0 {
            return Err(StoreConfigError::ZeroConcurrency);
        }
        if self.operation_timeout_seconds == 0 {
            return Err(StoreConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreConfigError {
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported URL scheme: {0} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("Operation timeout must be at least 1 second")]
    ZeroTimeout,
}
