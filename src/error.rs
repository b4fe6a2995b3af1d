use std::fmt;

/// Which external store a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// The shared key-value store holding counters, cached predictions and the request log.
    Fast,
    /// The queryable store holding the timestamped prediction history.
    Authoritative,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Fast => f.write_str("fast"),
            StoreKind::Authoritative => f.write_str("authoritative"),
        }
    }
}

/// Error type for this crate.
///
/// Store faults ([`TurnstileError::is_store_failure`]) are never folded into an
/// allow/block decision. Rate limiting and prediction blocks are not errors at
/// all; they are [`AdmissionOutcome`](crate::AdmissionOutcome)s.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    /// The request identity (or another caller-supplied value) is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A store reported itself unavailable.
    #[error("{store} store unavailable: {reason}")]
    StoreUnavailable {
        /// Store that failed.
        store: StoreKind,
        /// Human readable cause.
        reason: String,
    },

    /// A store call did not complete within its deadline.
    #[error("{store} store call timed out after {timeout_ms}ms")]
    Timeout {
        /// Store that was being called.
        store: StoreKind,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// Redis error.
    #[cfg(feature = "redis-tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// SQL error from the prediction store.
    #[error("sql error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// A cached value, log entry or prediction row could not be decoded.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Invalid key prefix.
    #[error("invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    /// Invalid Redis client connection count.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// Configuration could not be read or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TurnstileError {
    /// `true` when the error means a store could not be reached or did not answer.
    ///
    /// Callers map these to an internal failure (HTTP 500), never to a decision.
    pub fn is_store_failure(&self) -> bool {
        match self {
            TurnstileError::StoreUnavailable { .. } | TurnstileError::Timeout { .. } => true,
            #[cfg(feature = "redis-tokio")]
            TurnstileError::RedisError(_) => true,
            TurnstileError::SqlError(_) => true,
            _ => false,
        }
    }

    /// `true` for malformed stored data.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, TurnstileError::DataIntegrity(_))
    }
}
