use std::{fmt, ops::Deref, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::TurnstileError;

/// Longest expiry accepted for a window or a cached prediction (one year).
pub const MAX_EXPIRY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Length of a rate-limit window.
///
/// A user's counter is created on the first request of a window and expires
/// this many seconds later; the next request after that starts a fresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u64")]
pub struct WindowSizeSeconds(u64);

impl WindowSizeSeconds {
    /// Window as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for WindowSizeSeconds {
    fn default() -> Self {
        Self(60)
    }
}

impl Deref for WindowSizeSeconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSizeSeconds {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Window size must be at least 1")
        } else if value > MAX_EXPIRY_SECONDS {
            Err("Window size must not exceed one year")
        } else {
            Ok(Self(value))
        }
    }
}

/// Number of requests a user may make inside one window.
///
/// The request whose post-increment count exceeds this value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u64")]
pub struct RequestThreshold(u64);

impl Default for RequestThreshold {
    fn default() -> Self {
        Self(5)
    }
}

impl Deref for RequestThreshold {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RequestThreshold {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Request threshold must be at least 1")
        } else {
            Ok(Self(value))
        }
    }
}

/// Time-to-live of a cached prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u64")]
pub struct PredictionTtlSeconds(u64);

impl PredictionTtlSeconds {
    /// TTL as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for PredictionTtlSeconds {
    fn default() -> Self {
        Self(600)
    }
}

impl Deref for PredictionTtlSeconds {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for PredictionTtlSeconds {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Prediction TTL must be at least 1")
        } else if value > MAX_EXPIRY_SECONDS {
            Err("Prediction TTL must not exceed one year")
        } else {
            Ok(Self(value))
        }
    }
}

/// Deadline applied to a single external store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u64")]
pub struct StoreTimeoutMs(u64);

impl StoreTimeoutMs {
    /// Deadline for the warmer's bulk authoritative query.
    pub const WARM_DEFAULT: Self = Self(30_000);

    /// Timeout as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for StoreTimeoutMs {
    fn default() -> Self {
        Self(2_000)
    }
}

impl Deref for StoreTimeoutMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for StoreTimeoutMs {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Store timeout must be greater than 0")
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated namespace prepended to every Fast Store key.
///
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct KeyPrefix(Arc<str>);

impl Default for KeyPrefix {
    fn default() -> Self {
        Self(Arc::from("turnstile"))
    }
}

impl Deref for KeyPrefix {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = TurnstileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(TurnstileError::InvalidKeyPrefix(
                "Key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(TurnstileError::InvalidKeyPrefix(
                "Key prefix must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(TurnstileError::InvalidKeyPrefix(
                "Key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

/// Opaque, validated request identity. The partition key for all state.
///
/// Identities must be non-blank, at most 255 bytes, and free of commas and
/// control characters so that they survive the request-log wire format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(Arc<str>);

impl UserId {
    /// Build an identity from an optional header value.
    ///
    /// A missing or blank header is a [`TurnstileError::Validation`] with the
    /// message `"Missing user ID"`.
    pub fn from_header(value: Option<&str>) -> Result<Self, TurnstileError> {
        match value.map(str::trim) {
            None | Some("") => Err(TurnstileError::Validation("Missing user ID".to_string())),
            Some(value) => Self::try_from(value),
        }
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for UserId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl Deref for UserId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<&str> for UserId {
    type Error = TurnstileError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err(TurnstileError::Validation("Missing user ID".to_string()))
        } else if value.len() > 255 {
            Err(TurnstileError::Validation(
                "User ID must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(',') {
            Err(TurnstileError::Validation(
                "User ID must not contain commas".to_string(),
            ))
        } else if value.chars().any(char::is_control) {
            Err(TurnstileError::Validation(
                "User ID must not contain control characters".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<String> for UserId {
    type Error = TurnstileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// One row of the authoritative prediction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    /// Scored user.
    pub user_id: UserId,
    /// When the upstream job produced the row, in unix milliseconds.
    pub timestamp: i64,
    /// The predicted decision.
    pub allowed: bool,
}

/// Result of one rate-limiter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    /// Post-increment request count in the current window.
    pub count: u64,
    /// `count` is above the configured threshold.
    pub limit_exceeded: bool,
}

/// Encode a prediction for the cache.
pub(crate) fn encode_cached_prediction(allowed: bool) -> &'static str {
    if allowed { "true" } else { "false" }
}

/// Decode a cached prediction. Anything unrecognised (including an empty
/// string) is a data-integrity error, never `false`.
pub(crate) fn decode_cached_prediction(value: &str) -> Result<bool, TurnstileError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(TurnstileError::DataIntegrity(format!(
            "unrecognised cached prediction {other:?}"
        ))),
    }
}

#[derive(Clone, Debug)]
pub(crate) struct KeyGenerator {
    rate_key_prefix: Arc<str>,
    prediction_key_prefix: Arc<str>,
    request_log_key: Arc<str>,
}

impl KeyGenerator {
    pub(crate) fn new(prefix: &KeyPrefix) -> Self {
        Self {
            rate_key_prefix: Arc::from(format!("{}:rate:", **prefix)),
            prediction_key_prefix: Arc::from(format!("{}:prediction:", **prefix)),
            request_log_key: Arc::from(format!("{}:requests_log", **prefix)),
        }
    }

    pub(crate) fn rate_key(&self, user_id: &UserId) -> String {
        format!("{}{}", self.rate_key_prefix, user_id)
    }

    pub(crate) fn prediction_key(&self, user_id: &UserId) -> String {
        format!("{}{}", self.prediction_key_prefix, user_id)
    }

    pub(crate) fn request_log_key(&self) -> &str {
        &self.request_log_key
    }

    pub(crate) fn rate_key_prefix(&self) -> &str {
        &self.rate_key_prefix
    }

    /// Recover the identity from a rate key found by a prefix scan.
    pub(crate) fn user_from_rate_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&*self.rate_key_prefix)
    }
}
