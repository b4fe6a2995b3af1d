use std::{fmt, num::NonZeroU64, str::FromStr, sync::Arc};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;

use crate::{
    FastStore, RequestLogOptions, StoreKind, StoreTimeoutMs, TurnstileError, UserId,
    common::KeyGenerator, runtime,
};

/// One admission decision as stored in the request log.
///
/// Wire form: `timestamp,user_id,endpoint,allowed` with an RFC 3339 UTC
/// timestamp, e.g. `2024-05-01T12:00:00Z,alice,/api/predict,true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLogEntry {
    /// When the decision was made.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Requesting user.
    pub user_id: String,
    /// Endpoint the request targeted.
    pub endpoint: String,
    /// Final admission decision.
    pub allowed: bool,
}

fn serialize_timestamp<S: serde::Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl RequestLogEntry {
    /// An entry stamped with the current time, truncated to whole seconds.
    pub fn now(user_id: &UserId, endpoint: &str, allowed: bool) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(0),
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            allowed,
        }
    }
}

impl fmt::Display for RequestLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.user_id,
            self.endpoint,
            self.allowed
        )
    }
}

impl FromStr for RequestLogEntry {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();

        let [timestamp, user_id, endpoint, allowed] = parts.as_slice() else {
            return Err(TurnstileError::DataIntegrity(format!(
                "log entry has {} fields, expected 4",
                parts.len()
            )));
        };

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|err| TurnstileError::DataIntegrity(format!("bad log timestamp: {err}")))?
            .with_timezone(&Utc);

        let allowed = allowed.parse::<bool>().map_err(|_| {
            TurnstileError::DataIntegrity(format!("bad log decision {allowed:?}"))
        })?;

        Ok(Self {
            timestamp,
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            allowed,
        })
    }
}

/// Appends admission decisions to the shared, newest-first request log.
///
/// The log is best-effort: a failed write is returned to the caller so it can
/// be observed, but it is never retried and never changes a decision. When
/// `max_entries` is configured the list is trimmed after every write;
/// otherwise it grows without bound.
#[derive(Clone)]
pub struct RequestLogger {
    store: Arc<dyn FastStore>,
    keys: KeyGenerator,
    max_entries: Option<NonZeroU64>,
    timeout: StoreTimeoutMs,
}

impl RequestLogger {
    pub(crate) fn new(
        store: Arc<dyn FastStore>,
        keys: KeyGenerator,
        options: &RequestLogOptions,
        timeout: StoreTimeoutMs,
    ) -> Self {
        Self {
            store,
            keys,
            max_entries: options.max_entries,
            timeout,
        }
    }

    /// Record one decision.
    pub async fn record(
        &self,
        user_id: &UserId,
        endpoint: &str,
        allowed: bool,
    ) -> Result<(), TurnstileError> {
        self.append(&RequestLogEntry::now(user_id, endpoint, allowed))
            .await
    }

    /// Record a pre-built entry.
    ///
    /// Entries whose user or endpoint contain `,` are rejected since they could
    /// not be read back.
    pub async fn append(&self, entry: &RequestLogEntry) -> Result<(), TurnstileError> {
        if entry.user_id.contains(',') || entry.endpoint.contains(',') {
            return Err(TurnstileError::Validation(format!(
                "log entry fields must not contain commas: {entry}"
            )));
        }

        let key = self.keys.request_log_key();
        let encoded = entry.to_string();

        let len = runtime::bounded(StoreKind::Fast, self.timeout, self.store.lpush(key, &encoded))
            .await?;

        if let Some(max_entries) = self.max_entries
            && len > max_entries.get()
        {
            let stop = i64::try_from(max_entries.get()).unwrap_or(i64::MAX) - 1;
            runtime::bounded(
                StoreKind::Fast,
                self.timeout,
                self.store.ltrim(key, 0, stop),
            )
            .await?;
        }

        Ok(())
    } // end method append
}
