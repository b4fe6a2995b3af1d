use std::{num::NonZeroU64, path::Path};

use serde::Deserialize;

use crate::{
    KeyPrefix, PredictionTtlSeconds, RequestThreshold, StoreTimeoutMs, TurnstileError,
    WindowSizeSeconds,
};

/// Options for the [`RateLimiter`](crate::RateLimiter).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimiterOptions {
    /// Window length. Default 60 seconds.
    pub window_size_seconds: WindowSizeSeconds,
    /// Requests allowed per window. Default 5.
    pub threshold: RequestThreshold,
}

/// Options for the prediction resolver and warmer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionOptions {
    /// Cache TTL for a prediction. Default 600 seconds.
    pub ttl_seconds: PredictionTtlSeconds,
    /// Deadline for the warmer's bulk query. Default 30 seconds.
    pub warm_timeout_ms: StoreTimeoutMs,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: PredictionTtlSeconds::default(),
            warm_timeout_ms: StoreTimeoutMs::WARM_DEFAULT,
        }
    }
}

/// Options for the request log.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestLogOptions {
    /// Trim the log to this many newest entries after each write. `None`
    /// (the default) never trims.
    pub max_entries: Option<NonZeroU64>,
    /// Entries returned by [`AdminView::recent_logs_default`](crate::AdminView::recent_logs_default). Default 50.
    pub read_limit: u64,
}

impl Default for RequestLogOptions {
    fn default() -> Self {
        Self {
            max_entries: None,
            read_limit: 50,
        }
    }
}

/// Top-level configuration for [`Turnstile`](crate::Turnstile).
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration:
///
/// ```toml
/// prefix = "gateway"
/// store_timeout_ms = 1500
///
/// [rate_limit]
/// window_size_seconds = 60
/// threshold = 5
///
/// [prediction]
/// ttl_seconds = 600
///
/// [request_log]
/// max_entries = 10000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurnstileOptions {
    /// Namespace for every Fast Store key. Default `turnstile`.
    pub prefix: KeyPrefix,
    /// Deadline for a single store call. Default 2000 ms.
    pub store_timeout_ms: StoreTimeoutMs,
    /// Rate limiter options.
    pub rate_limit: RateLimiterOptions,
    /// Prediction cache options.
    pub prediction: PredictionOptions,
    /// Request log options.
    pub request_log: RequestLogOptions,
}

impl TurnstileOptions {
    /// Parse options from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, TurnstileError> {
        toml::from_str(content).map_err(|err| TurnstileError::InvalidConfig(err.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, TurnstileError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            TurnstileError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        let options = Self::from_toml_str(&content)?;
        let prefix: &str = &options.prefix;
        tracing::info!(path = %path.display(), prefix, "options, loaded configuration");
        Ok(options)
    }
}
