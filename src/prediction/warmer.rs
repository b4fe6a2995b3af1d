use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::{
    FastStore, PredictionOptions, PredictionSource, PredictionTtlSeconds, StoreKind,
    StoreTimeoutMs, TurnstileError,
    common::{KeyGenerator, encode_cached_prediction},
    runtime,
};

/// Outcome of one bulk warm-up pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Predictions written to the cache.
    pub warmed: u64,
    /// Rows that failed to decode or to be written, and were skipped.
    pub skipped: u64,
}

/// Pre-populates the prediction cache for every scored user.
///
/// Run [`warm_all`](PredictionWarmer::warm_all) once before accepting traffic
/// so the first request per user does not fall through to the authoritative
/// store.
///
/// # Failure handling
///
/// - **Hard failures abort the pass:** the Fast Store does not answer a ping,
///   or the bulk query against the authoritative store fails or times out
/// - **Row failures are skipped:** a row that does not decode, or a single
///   cache write that fails, is logged and counted in
///   [`WarmReport::skipped`]
///
/// Whether startup proceeds after an aborted pass is left to the caller.
pub struct PredictionWarmer {
    fast: Arc<dyn FastStore>,
    source: Arc<dyn PredictionSource>,
    keys: KeyGenerator,
    ttl: PredictionTtlSeconds,
    timeout: StoreTimeoutMs,
    bulk_timeout: StoreTimeoutMs,
    warm_loop: Mutex<Option<JoinHandle<()>>>,
}

impl PredictionWarmer {
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
            bulk_timeout: options.warm_timeout_ms,
            warm_loop: Mutex::new(None),
        }
    }

    /// Copy the current prediction of every user into the cache.
    pub async fn warm_all(&self) -> Result<WarmReport, TurnstileError> {
        runtime::bounded(StoreKind::Fast, self.timeout, self.fast.ping())
            .await
            .inspect_err(|err| {
                tracing::error!(error = ?err, "prediction.warm.error, fast store unreachable");
            })?;

        let rows = runtime::bounded(
            StoreKind::Authoritative,
            self.bulk_timeout,
            self.source.latest_predictions(),
        )
        .await
        .inspect_err(|err| {
            tracing::error!(error = ?err, "prediction.warm.error, bulk prediction query failed");
        })?;

        let mut report = WarmReport::default();

        for row in rows {
            let prediction = match row {
                Ok(prediction) => prediction,
                Err(err) => {
                    tracing::warn!(error = ?err, "prediction.warm, skipping unreadable row");
                    report.skipped += 1;
                    continue;
                }
            };

            let key = self.keys.prediction_key(&prediction.user_id);
            let written = runtime::bounded(
                StoreKind::Fast,
                self.timeout,
                self.fast.set_ex(
                    &key,
                    encode_cached_prediction(prediction.allowed),
                    self.ttl.as_duration(),
                ),
            )
            .await;

            match written {
                Ok(()) => report.warmed += 1,
                Err(err) => {
                    tracing::warn!(user_id = %prediction.user_id, error = ?err, "prediction.warm, failed to cache prediction");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            warmed = report.warmed,
            skipped = report.skipped,
            "prediction.warm, cached predictions"
        );

        Ok(report)
    } // end method warm_all

    /// Re-run [`warm_all`](PredictionWarmer::warm_all) every `period`, starting immediately.
    ///
    /// Failed passes are logged and the loop keeps going. Calling this while a
    /// loop is already running does nothing. Must be called from within a
    /// Tokio runtime.
    pub fn run_warm_loop(self: &Arc<Self>, period: Duration) {
        let period = period.max(Duration::from_millis(1));
        let mut slot = self
            .warm_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let warmer = Arc::downgrade(self);
        *slot = Some(runtime::spawn_task(async move {
            let mut interval = runtime::new_interval(period);

            loop {
                runtime::tick(&mut interval).await;

                let Some(warmer) = warmer.upgrade() else {
                    break;
                };

                if let Err(err) = warmer.warm_all().await {
                    tracing::warn!(error = ?err, "prediction.warm_loop, pass failed");
                }
            }
        }));
    }

    /// Stop the loop started by [`run_warm_loop`](PredictionWarmer::run_warm_loop).
    ///
    /// Safe to call when no loop is running.
    pub fn stop_warm_loop(&self) {
        let mut slot = self
            .warm_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// `true` while a periodic warm loop is running.
    pub fn is_warm_loop_running(&self) -> bool {
        self.warm_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PredictionWarmer {
    fn drop(&mut self) {
        self.stop_warm_loop();
    }
}
