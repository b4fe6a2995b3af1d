use std::sync::Arc;

use crate::{
    FastStore, RateCheck, RateLimiterOptions, RequestThreshold, StoreKind, StoreTimeoutMs,
    TurnstileError, UserId, WindowSizeSeconds, common::KeyGenerator, runtime,
};

/// Fixed-window request counter per user.
///
/// # Algorithm
///
/// 1. **Increment:** atomically bump `<prefix>:rate:<user>` in the Fast Store
/// 2. **Window start:** the increment that creates the counter (count `1`) also
///    gives it a TTL of one window
/// 3. **Decision:** `limit_exceeded` when the post-increment count is above the
///    threshold
/// 4. **Reset:** purely by TTL expiry; the next request starts a new window
///
/// Rejected requests still count: a user hammering the gateway keeps the
/// counter climbing until the window expires. Counters are never decremented.
///
/// Store failures are returned as errors. The limiter never guesses a count.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn FastStore>,
    keys: KeyGenerator,
    window_size_seconds: WindowSizeSeconds,
    threshold: RequestThreshold,
    timeout: StoreTimeoutMs,
}

impl RateLimiter {
    pub(crate) fn new(
        store: Arc<dyn FastStore>,
        keys: KeyGenerator,
        options: &RateLimiterOptions,
        timeout: StoreTimeoutMs,
    ) -> Self {
        Self {
            store,
            keys,
            window_size_seconds: options.window_size_seconds,
            threshold: options.threshold,
            timeout,
        }
    }

    /// Count one request for `user_id` and report whether it is over the limit.
    pub async fn check_and_increment(&self, user_id: &UserId) -> Result<RateCheck, TurnstileError> {
        let key = self.keys.rate_key(user_id);

        let count = runtime::bounded(
            StoreKind::Fast,
            self.timeout,
            self.store
                .incr_with_expiry(&key, self.window_size_seconds.as_duration()),
        )
        .await?;

        let count = u64::try_from(count).ok().filter(|count| *count > 0).ok_or_else(|| {
            TurnstileError::DataIntegrity(format!("rate counter {key:?} holds {count}"))
        })?;

        Ok(RateCheck {
            count,
            limit_exceeded: count > *self.threshold,
        })
    } // end method check_and_increment

    /// Configured window length.
    pub fn window_size_seconds(&self) -> WindowSizeSeconds {
        self.window_size_seconds
    }

    /// Configured per-window threshold.
    pub fn threshold(&self) -> RequestThreshold {
        self.threshold
    }
}
