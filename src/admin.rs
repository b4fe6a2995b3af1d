use std::sync::Arc;

use serde::Serialize;

use crate::{
    FastStore, RequestLogEntry, StoreKind, StoreTimeoutMs, TurnstileError, UserId,
    common::{KeyGenerator, decode_cached_prediction},
    runtime,
};

/// Current window state for one user, as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateStatus {
    /// User owning the counter.
    pub user_id: String,
    /// Requests counted in the current window.
    pub requests: u64,
    /// Cached prediction, `None` when nothing usable is cached.
    pub ai_allowed: Option<bool>,
    /// Seconds until the window resets, `None` when the counter has no expiry.
    pub ttl_seconds: Option<u64>,
}

/// Read-only view over the state the admission pipeline produces.
///
/// Nothing here writes to the Fast Store. Entries that disappear or turn out
/// malformed between listing and reading are skipped, never reported as errors.
#[derive(Clone)]
pub struct AdminView {
    store: Arc<dyn FastStore>,
    keys: KeyGenerator,
    timeout: StoreTimeoutMs,
    default_log_limit: u64,
}

impl AdminView {
    pub(crate) fn new(
        store: Arc<dyn FastStore>,
        keys: KeyGenerator,
        timeout: StoreTimeoutMs,
        default_log_limit: u64,
    ) -> Self {
        Self {
            store,
            keys,
            timeout,
            default_log_limit,
        }
    }

    /// Every live rate counter with its TTL and the user's cached prediction.
    pub async fn rate_status(&self) -> Result<Vec<RateStatus>, TurnstileError> {
        let rate_keys = runtime::bounded(
            StoreKind::Fast,
            self.timeout,
            self.store.scan_prefix(self.keys.rate_key_prefix()),
        )
        .await?;

        let mut statuses = Vec::with_capacity(rate_keys.len());

        for key in rate_keys {
            let Some(user) = self.keys.user_from_rate_key(&key) else {
                continue;
            };
            let Ok(user_id) = UserId::try_from(user) else {
                tracing::debug!(key = %key, "admin.rate_status, skipping key with invalid user id");
                continue;
            };

            let count = match runtime::bounded(StoreKind::Fast, self.timeout, self.store.get(&key))
                .await
            {
                Ok(Some(count)) => count,
                Ok(None) => continue,
                Err(err) if err.is_data_integrity() => continue,
                Err(err) => return Err(err),
            };
            let Ok(requests) = count.parse::<u64>() else {
                tracing::debug!(key = %key, count = %count, "admin.rate_status, skipping non-numeric counter");
                continue;
            };

            let ttl = runtime::bounded(StoreKind::Fast, self.timeout, self.store.ttl(&key)).await?;

            let prediction_key = self.keys.prediction_key(&user_id);
            let ai_allowed = match runtime::bounded(
                StoreKind::Fast,
                self.timeout,
                self.store.get(&prediction_key),
            )
            .await
            {
                Ok(value) => value.and_then(|value| decode_cached_prediction(&value).ok()),
                Err(err) if err.is_data_integrity() => None,
                Err(err) => return Err(err),
            };

            statuses.push(RateStatus {
                user_id: user_id.to_string(),
                requests,
                ai_allowed,
                ttl_seconds: ttl.map(|ttl| ttl.as_secs()),
            });
        }

        Ok(statuses)
    } // end method rate_status

    /// The newest `limit` request-log entries, newest first.
    ///
    /// Entries that do not parse are excluded from the result.
    pub async fn recent_logs(&self, limit: u64) -> Result<Vec<RequestLogEntry>, TurnstileError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let stop = i64::try_from(limit).unwrap_or(i64::MAX) - 1;
        let raw = runtime::bounded(
            StoreKind::Fast,
            self.timeout,
            self.store.lrange(self.keys.request_log_key(), 0, stop),
        )
        .await?;

        Ok(raw
            .iter()
            .filter_map(|line| match line.parse::<RequestLogEntry>() {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(line = %line, error = ?err, "admin.recent_logs, skipping malformed entry");
                    None
                }
            })
            .collect())
    }

    /// [`recent_logs`](AdminView::recent_logs) with the configured default limit (50).
    pub async fn recent_logs_default(&self) -> Result<Vec<RequestLogEntry>, TurnstileError> {
        self.recent_logs(self.default_log_limit).await
    }
}
