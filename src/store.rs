//! The two external store seams every admission component is built on.
//!
//! [`FastStore`] is the shared key-value store (Redis in production, the
//! [`local`](crate::local) provider in single-process deployments and tests).
//! [`PredictionSource`] is the read side of the authoritative prediction
//! history (the [`sql`](crate::sql) provider, or an in-memory history).
//!
//! Both are shared as `Arc<dyn ...>` handles and must be safe for concurrent
//! use; all cross-request serialization happens inside the store's own
//! per-key atomic operations.

use std::time::Duration;

use async_trait::async_trait;

use crate::{Prediction, TurnstileError, UserId};

/// Rows returned by a bulk prediction read.
///
/// The outer `Result` of [`PredictionSource::latest_predictions`] reports a
/// store that could not be queried at all; each inner `Result` is one row that
/// may individually fail to decode.
pub type PredictionRows = Vec<Result<Prediction, TurnstileError>>;

/// Shared key-value store with TTLs and atomic per-key primitives.
///
/// List indices follow Redis `LRANGE`/`LTRIM` semantics: inclusive `stop`,
/// negative indices count from the tail.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Round-trip health check.
    async fn ping(&self) -> Result<(), TurnstileError>;

    /// Atomically increment the counter at `key`, giving it `ttl` when the
    /// increment created it (result `1`) or when it is found without an expiry.
    ///
    /// Returns the post-increment value.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, TurnstileError>;

    /// Read a string value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, TurnstileError>;

    /// Overwrite `key` with `value`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TurnstileError>;

    /// Prepend `value` to the list at `key`, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<u64, TurnstileError>;

    /// Keep only the elements between `start` and `stop`.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), TurnstileError>;

    /// Read the elements between `start` and `stop`.
    async fn lrange(&self, key: &str, start: i64, stop: i64)
    -> Result<Vec<String>, TurnstileError>;

    /// All live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TurnstileError>;

    /// Remaining time to live. `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TurnstileError>;
}

/// Read access to the authoritative, timestamped prediction history.
///
/// The current prediction for a user is the row with the greatest timestamp,
/// regardless of insertion order.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    /// Current prediction for `user_id`, or `None` when the user has never been scored.
    async fn latest_prediction(&self, user_id: &UserId) -> Result<Option<bool>, TurnstileError>;

    /// Current prediction for every scored user, in a single pass.
    async fn latest_predictions(&self) -> Result<PredictionRows, TurnstileError>;
}
