use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{FastStore, TurnstileError};

#[derive(Debug)]
enum LocalValue {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct LocalEntry {
    value: LocalValue,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`FastStore`] for single-process deployments and tests.
///
/// # Semantics
///
/// - **Per-key atomicity:** every operation runs under the [`DashMap`] shard
///   lock for its key, so increments never lose updates.
/// - **Lazy expiry:** expired entries are dropped when next touched. Use
///   [`purge_expired`](LocalFastStore::purge_expired) to reclaim memory for keys
///   that are never read again.
/// - **Type errors:** reading a list as a string (or the reverse) is a
///   [`TurnstileError::DataIntegrity`], mirroring Redis `WRONGTYPE`.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> Result<(), turnstile::TurnstileError> {
/// use std::time::Duration;
/// use turnstile::{FastStore, local::LocalFastStore};
///
/// let store = LocalFastStore::new();
/// assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await?, 1);
/// assert_eq!(store.incr_with_expiry("k", Duration::from_secs(60)).await?, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct LocalFastStore {
    entries: DashMap<String, LocalEntry>,
}

impl LocalFastStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_if_expired(&self, key: &str, now: Instant) {
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

fn wrong_type(key: &str, expected: &str) -> TurnstileError {
    TurnstileError::DataIntegrity(format!("key {key:?} does not hold a {expected}"))
}

fn expiry(key: &str, now: Instant, ttl: Duration) -> Result<Instant, TurnstileError> {
    now.checked_add(ttl).ok_or_else(|| {
        TurnstileError::Validation(format!("ttl {ttl:?} for key {key:?} is out of range"))
    })
}

/// Resolve Redis-style inclusive `[start, stop]` indices against `len`.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl FastStore for LocalFastStore {
    async fn ping(&self) -> Result<(), TurnstileError> {
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, TurnstileError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| LocalEntry {
                value: LocalValue::Text("0".to_string()),
                expires_at: None,
            });

        if entry.is_expired(now) {
            entry.value = LocalValue::Text("0".to_string());
            entry.expires_at = None;
        }

        let current: i64 = match &entry.value {
            LocalValue::Text(text) => text.parse().map_err(|_| {
                TurnstileError::DataIntegrity(format!("key {key:?} does not hold an integer"))
            })?,
            LocalValue::List(_) => return Err(wrong_type(key, "counter")),
        };

        let next = current.checked_add(1).ok_or_else(|| {
            TurnstileError::DataIntegrity(format!("counter at key {key:?} would overflow"))
        })?;

        if next == 1 || entry.expires_at.is_none() {
            entry.expires_at = Some(expiry(key, now, ttl)?);
        }

        entry.value = LocalValue::Text(next.to_string());

        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TurnstileError> {
        self.purge_if_expired(key, Instant::now());

        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                LocalValue::Text(text) => Ok(Some(text.clone())),
                LocalValue::List(_) => Err(wrong_type(key, "string")),
            },
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TurnstileError> {
        let expires_at = expiry(key, Instant::now(), ttl)?;
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value: LocalValue::Text(value.to_string()),
                expires_at: Some(expires_at),
            },
        );

        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, TurnstileError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| LocalEntry {
                value: LocalValue::List(VecDeque::new()),
                expires_at: None,
            });

        if entry.is_expired(now) {
            entry.value = LocalValue::List(VecDeque::new());
            entry.expires_at = None;
        }

        match &mut entry.value {
            LocalValue::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len() as u64)
            }
            LocalValue::Text(_) => Err(wrong_type(key, "list")),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), TurnstileError> {
        self.purge_if_expired(key, Instant::now());

        let emptied = match self.entries.get_mut(key) {
            None => return Ok(()),
            Some(mut entry) => match &mut entry.value {
                LocalValue::List(list) => match normalize_range(list.len(), start, stop) {
                    Some((from, to)) => {
                        list.truncate(to + 1);
                        list.drain(..from);
                        list.is_empty()
                    }
                    None => true,
                },
                LocalValue::Text(_) => return Err(wrong_type(key, "list")),
            },
        };

        if emptied {
            self.entries.remove(key);
        }

        Ok(())
    }

    async fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, TurnstileError> {
        self.purge_if_expired(key, Instant::now());

        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                LocalValue::List(list) => Ok(match normalize_range(list.len(), start, stop) {
                    Some((from, to)) => list.range(from..=to).cloned().collect(),
                    None => Vec::new(),
                }),
                LocalValue::Text(_) => Err(wrong_type(key, "list")),
            },
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TurnstileError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now) && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TurnstileError> {
        let now = Instant::now();
        self.purge_if_expired(key, now);

        Ok(self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}
