use std::sync::Arc;

use crate::{
    FastStore, PredictionOptions, PredictionSource, PredictionTtlSeconds, StoreKind,
    StoreTimeoutMs, TurnstileError, UserId,
    common::{KeyGenerator, decode_cached_prediction, encode_cached_prediction},
    runtime,
};

/// Resolves the current allow/block prediction for a user.
///
/// # Lookup
///
/// - **Hit:** the cached value exists, has not expired and decodes; it is
///   returned without touching the authoritative store
/// - **Miss:** absent, expired or malformed; the authoritative store is
///   queried, the answer is cached for the prediction TTL and returned
///
/// # Policies
///
/// - A user with no authoritative record is allowed (and that answer is cached)
/// - Authoritative store failures are returned as errors, never as "allowed"
/// - A failed cache read is returned as an error; a failed cache write after a
///   successful authoritative read is logged and the authoritative answer is
///   still returned
/// - The cache is never invalidated on new upstream rows; staleness is bounded
///   by the TTL
#[derive(Clone)]
pub struct PredictionResolver {
    fast: Arc<dyn FastStore>,
    source: Arc<dyn PredictionSource>,
    keys: KeyGenerator,
    ttl: PredictionTtlSeconds,
    timeout: StoreTimeoutMs,
}

impl PredictionResolver {
    pub(crate) fn new(
        fast: Arc<dyn FastStore>,
        source: Arc<dyn PredictionSource>,
        keys: KeyGenerator,
        options: &PredictionOptions,
        timeout: StoreTimeoutMs,
    ) -> Self {
        Self {
            fast,
            source,
            keys,
            ttl: options.ttl_seconds,
            timeout,
        }
    }

    /// `true` when `user_id` is currently predicted to be allowed.
    pub async fn resolve(&self, user_id: &UserId) -> Result<bool, TurnstileError> {
        let key = self.keys.prediction_key(user_id);

        if let Some(allowed) = self.cached(&key).await? {
            return Ok(allowed);
        }

        let allowed = match runtime::bounded(
            StoreKind::Authoritative,
            self.timeout,
            self.source.latest_prediction(user_id),
        )
        .await
        {
            Ok(Some(allowed)) => allowed,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "prediction.resolve, no record found, defaulting to allow");
                true
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = ?err, "prediction.resolve.error, authoritative lookup failed");
                return Err(err);
            }
        };

        if let Err(err) = runtime::bounded(
            StoreKind::Fast,
            self.timeout,
            self.fast.set_ex(
                &key,
                encode_cached_prediction(allowed),
                self.ttl.as_duration(),
            ),
        )
        .await
        {
            tracing::warn!(user_id = %user_id, error = ?err, "prediction.cache.error, failed to cache prediction");
        }

        Ok(allowed)
    } // end method resolve

    async fn cached(&self, key: &str) -> Result<Option<bool>, TurnstileError> {
        let value = match runtime::bounded(StoreKind::Fast, self.timeout, self.fast.get(key)).await
        {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(err) if err.is_data_integrity() => {
                tracing::debug!(key, error = ?err, "prediction.cache, unreadable value treated as miss");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        match decode_cached_prediction(&value) {
            Ok(allowed) => Ok(Some(allowed)),
            Err(err) => {
                tracing::debug!(key, error = ?err, "prediction.cache, malformed value treated as miss");
                Ok(None)
            }
        }
    }
}
