#![cfg(feature = "redis-tokio")]

use std::{
    env,
    sync::Arc,
    time::Duration,
};

use turnstile::{
    AdmissionOutcome, FastStore, KeyPrefix, RequestThreshold, Turnstile, TurnstileOptions, UserId,
    WindowSizeSeconds,
    local::LocalPredictionSource,
    redis::{RedisFastStore, TurnstileRedisClient},
    response::ApiResponse,
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> KeyPrefix {
    let n: u64 = rand::random();
    KeyPrefix::try_from(format!("turnstile_test_{n}")).unwrap()
}

fn user(s: &str) -> UserId {
    UserId::try_from(s).unwrap()
}

struct Gateway {
    gate: Turnstile,
    store: Arc<RedisFastStore>,
    prefix: KeyPrefix,
}

async fn build_gateway(
    url: &str,
    window_size_seconds: u64,
    threshold: u64,
    source: LocalPredictionSource,
) -> Gateway {
    let client = TurnstileRedisClient::open(url, 2).await.unwrap();
    let store = Arc::new(RedisFastStore::new(client));
    let prefix = unique_prefix();

    let mut options = TurnstileOptions::default();
    options.prefix = prefix.clone();
    options.rate_limit.window_size_seconds =
        WindowSizeSeconds::try_from(window_size_seconds).unwrap();
    options.rate_limit.threshold = RequestThreshold::try_from(threshold).unwrap();

    Gateway {
        gate: Turnstile::new(options, store.clone(), Arc::new(source)),
        store,
        prefix,
    }
}

#[test]
fn rejects_after_threshold_then_recovers_after_window() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let source = LocalPredictionSource::new();
        source.record(user("alice"), 1_000, true);
        let g = build_gateway(&url, 1, 3, source).await;
        let pipeline = g.gate.pipeline();

        for _ in 0..3 {
            let d = pipeline.admit(&user("alice"), "/api/predict").await.unwrap();
            assert_eq!(d.outcome, AdmissionOutcome::Allowed);
        }
        let d = pipeline.admit(&user("alice"), "/api/predict").await.unwrap();
        assert_eq!(d.outcome, AdmissionOutcome::RateLimited);

        tokio::time::sleep(Duration::from_millis(1_200)).await;

        let d = pipeline.admit(&user("alice"), "/api/predict").await.unwrap();
        assert_eq!(d.outcome, AdmissionOutcome::Allowed);
        assert_eq!(d.request_count, 1);
    });
}

#[test]
fn prediction_block_and_cached_answer() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let source = LocalPredictionSource::new();
        source.record(user("bob"), 2_000, false);
        source.record(user("bob"), 1_000, true);
        let g = build_gateway(&url, 60, 5, source).await;

        let result = g.gate.pipeline().admit(&user("bob"), "/api/predict").await;
        let (status, body) = ApiResponse::from_admission(&result);
        assert_eq!(status, 429);
        assert_eq!(body.message, "AI model blocked user bob");

        let cached = g
            .store
            .get(&format!("{}:prediction:bob", &**g.prefix))
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some("false"));
    });
}

#[test]
fn warm_up_and_admin_view() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let source = LocalPredictionSource::new();
        for i in 0..20 {
            source.record(user(&format!("user_{i:02}")), 1_000, i % 2 == 0);
        }
        let g = build_gateway(&url, 60, 5, source).await;

        let report = g.gate.warmer().warm_all().await.unwrap();
        assert_eq!(report.warmed, 20);

        for i in 0..5 {
            g.gate
                .pipeline()
                .admit(&user(&format!("user_{i:02}")), "/api/predict")
                .await
                .unwrap();
        }

        let statuses = g.gate.admin().rate_status().await.unwrap();
        assert_eq!(statuses.len(), 5);
        assert_eq!(statuses[0].user_id, "user_00");
        assert_eq!(statuses[0].ai_allowed, Some(true));
        assert_eq!(statuses[1].ai_allowed, Some(false));
        assert!(statuses.iter().all(|s| s.requests == 1));

        let logs = g.gate.admin().recent_logs(3).await.unwrap();
        let users: Vec<&str> = logs.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, ["user_04", "user_03", "user_02"]);
    });
}

#[test]
fn concurrent_requests_across_connections_respect_threshold() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let g = build_gateway(&url, 60, 10, LocalPredictionSource::new()).await;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let pipeline = g.gate.pipeline().clone();
            handles.push(tokio::spawn(async move {
                pipeline.admit(&user("hot"), "/api/predict").await.unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().outcome.is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
    });
}
