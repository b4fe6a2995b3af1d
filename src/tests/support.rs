use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    FastStore, PredictionRows, PredictionSource, PredictionTtlSeconds, RequestThreshold,
    StoreKind, StoreTimeoutMs, Turnstile, TurnstileError, TurnstileOptions, UserId,
    WindowSizeSeconds,
    local::{LocalFastStore, LocalPredictionSource},
};

pub(super) fn user(s: &str) -> UserId {
    UserId::try_from(s).unwrap()
}

fn unavailable(store: StoreKind) -> TurnstileError {
    TurnstileError::StoreUnavailable {
        store,
        reason: "injected failure".to_string(),
    }
}

/// Local fast store with switchable failures per operation.
#[derive(Default)]
pub(super) struct FlakyFastStore {
    pub inner: LocalFastStore,
    pub fail_ping: AtomicBool,
    pub fail_incr: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_lpush: AtomicBool,
    pub fail_ltrim: AtomicBool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

impl FlakyFastStore {
    fn check(&self, flag: &AtomicBool) -> Result<(), TurnstileError> {
        if flag.load(Ordering::SeqCst) {
            Err(unavailable(StoreKind::Fast))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FastStore for FlakyFastStore {
    async fn ping(&self) -> Result<(), TurnstileError> {
        self.check(&self.fail_ping)?;
        self.inner.ping().await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, TurnstileError> {
        self.check(&self.fail_incr)?;
        self.inner.incr_with_expiry(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TurnstileError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TurnstileError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_set)?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, TurnstileError> {
        self.check(&self.fail_lpush)?;
        self.inner.lpush(key, value).await
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), TurnstileError> {
        self.check(&self.fail_ltrim)?;
        self.inner.ltrim(key, start, stop).await
    }

    async fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, TurnstileError> {
        self.inner.lrange(key, start, stop).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, TurnstileError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TurnstileError> {
        self.inner.ttl(key).await
    }
}

/// In-memory prediction history that counts queries and can fail or stall.
#[derive(Default)]
pub(super) struct CountingSource {
    pub inner: LocalPredictionSource,
    pub single_queries: AtomicUsize,
    pub bulk_queries: AtomicUsize,
    pub fail: AtomicBool,
    pub bad_rows: AtomicUsize,
    pub stall: AtomicBool,
}

impl CountingSource {
    pub fn record(&self, user_id: &str, timestamp: i64, allowed: bool) {
        self.inner.record(user(user_id), timestamp, allowed);
    }

    pub fn single_queries(&self) -> usize {
        self.single_queries.load(Ordering::SeqCst)
    }

    async fn maybe_fail(&self) -> Result<(), TurnstileError> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            Err(unavailable(StoreKind::Authoritative))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PredictionSource for CountingSource {
    async fn latest_prediction(&self, user_id: &UserId) -> Result<Option<bool>, TurnstileError> {
        self.single_queries.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail().await?;
        self.inner.latest_prediction(user_id).await
    }

    async fn latest_predictions(&self) -> Result<PredictionRows, TurnstileError> {
        self.bulk_queries.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail().await?;

        let mut rows = self.inner.latest_predictions().await?;
        for i in 0..self.bad_rows.load(Ordering::SeqCst) {
            rows.push(Err(TurnstileError::DataIntegrity(format!("bad row {i}"))));
        }
        Ok(rows)
    }
}

pub(super) fn options(window_size_seconds: u64, threshold: u64) -> TurnstileOptions {
    let mut options = TurnstileOptions::default();
    options.rate_limit.window_size_seconds = WindowSizeSeconds::try_from(window_size_seconds).unwrap();
    options.rate_limit.threshold = RequestThreshold::try_from(threshold).unwrap();
    options
}

pub(super) fn short_timeouts(mut options: TurnstileOptions) -> TurnstileOptions {
    options.store_timeout_ms = StoreTimeoutMs::try_from(100).unwrap();
    options.prediction.warm_timeout_ms = StoreTimeoutMs::try_from(100).unwrap();
    options
}

pub(super) fn short_prediction_ttl(mut options: TurnstileOptions) -> TurnstileOptions {
    options.prediction.ttl_seconds = PredictionTtlSeconds::try_from(1).unwrap();
    options
}

pub(super) struct Harness {
    pub gate: Turnstile,
    pub fast: Arc<FlakyFastStore>,
    pub source: Arc<CountingSource>,
}

pub(super) fn harness(options: TurnstileOptions) -> Harness {
    let fast = Arc::new(FlakyFastStore::default());
    let source = Arc::new(CountingSource::default());
    let gate = Turnstile::new(options, fast.clone(), source.clone());

    Harness { gate, fast, source }
}
