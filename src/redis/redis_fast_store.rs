use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, ErrorKind, RedisError};

use crate::{FastStore, TurnstileError, redis::TurnstileRedisClient};

const SCAN_BATCH: usize = 200;

/// [`FastStore`] backed by Redis.
///
/// # Requirements
///
/// - **Redis version:** >= 6.0
/// - **Runtime:** Tokio (via the `redis-tokio` feature)
///
/// # Consistency Semantics
///
/// - The increment-with-expiry step runs as one Lua script, so the window TTL
///   is set in the same atomic step that creates the counter.
/// - Prefix listing uses `SCAN`, never `KEYS`; keys created or expired while a
///   scan is running may or may not be reported.
///
/// # Examples
///
/// ```ignore
/// use turnstile::redis::{RedisFastStore, TurnstileRedisClient};
///
/// let client = TurnstileRedisClient::open("redis://127.0.0.1:6379/", 4).await?;
/// let store = RedisFastStore::new(client);
/// store.ping().await?;
/// ```
#[derive(Clone, Debug)]
pub struct RedisFastStore {
    client: TurnstileRedisClient,
    incr_script: redis::Script,
}

impl RedisFastStore {
    /// Wrap a connected client.
    pub fn new(client: TurnstileRedisClient) -> Self {
        let incr_script = redis::Script::new(
            r#"
            local count = redis.call("INCR", KEYS[1])

            if count == 1 or redis.call("TTL", KEYS[1]) == -1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end

            return count
        "#,
        );

        Self {
            client,
            incr_script,
        }
    }
}

/// Escape glob metacharacters so a literal prefix can be used in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// Type mismatches are stored-data problems, not connectivity problems.
fn store_error(err: RedisError) -> TurnstileError {
    if err.kind() == ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
        TurnstileError::DataIntegrity(err.to_string())
    } else {
        TurnstileError::RedisError(err)
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn ping(&self) -> Result<(), TurnstileError> {
        let mut connection_manager = self.client.get();
        redis::cmd("PING")
            .query_async::<()>(&mut connection_manager)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, TurnstileError> {
        let mut connection_manager = self.client.get();

        let count: i64 = self
            .incr_script
            .key(key)
            .arg(ttl_seconds(ttl))
            .invoke_async(&mut connection_manager)
            .await
            .map_err(store_error)?;

        Ok(count)
    } // end method incr_with_expiry

    async fn get(&self, key: &str) -> Result<Option<String>, TurnstileError> {
        let mut connection_manager = self.client.get();
        let value: Option<String> = connection_manager.get(key).await.map_err(store_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TurnstileError> {
        let mut connection_manager = self.client.get();
        let _: () = connection_manager
            .set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, TurnstileError> {
        let mut connection_manager = self.client.get();
        let len: u64 = connection_manager.lpush(key, value).await.map_err(store_error)?;
        Ok(len)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), TurnstileError> {
        let mut connection_manager = self.client.get();
        redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<()>(&mut connection_manager)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, TurnstileError> {
        let mut connection_manager = self.client.get();
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut connection_manager)
            .await
            .map_err(store_error)?;
        Ok(values)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TurnstileError> {
        let mut connection_manager = self.client.get();
        let pattern = escape_glob(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection_manager)
                .await
                .map_err(store_error)?;

            keys.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();

        Ok(keys)
    } // end method scan_prefix

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TurnstileError> {
        let mut connection_manager = self.client.get();
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut connection_manager)
            .await
            .map_err(store_error)?;

        // -2: missing, -1: no expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}
