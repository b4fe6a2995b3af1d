use std::{future::Future, time::Duration};

use crate::{StoreKind, StoreTimeoutMs, TurnstileError};

pub(crate) type Interval = tokio::time::Interval;

pub(crate) fn new_interval(period: Duration) -> Interval {
    tokio::time::interval(period)
}

pub(crate) fn spawn_task<F>(fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut)
}

pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

/// Run a store call under a deadline. An elapsed deadline is a store failure.
pub(crate) async fn bounded<T, F>(
    store: StoreKind,
    timeout: StoreTimeoutMs,
    fut: F,
) -> Result<T, TurnstileError>
where
    F: Future<Output = Result<T, TurnstileError>>,
{
    match tokio::time::timeout(timeout.as_duration(), fut).await {
        Ok(result) => result,
        Err(_) => Err(TurnstileError::Timeout {
            store,
            timeout_ms: *timeout,
        }),
    }
}
