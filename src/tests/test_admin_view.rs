use std::time::Duration;

use crate::{FastStore, RateStatus};

use super::{
    runtime::block_on,
    support::{harness, options, user},
};

#[test]
fn rate_status_reports_counters_ttls_and_cached_predictions() {
    block_on(async {
        let h = harness(options(60, 5));
        h.source.record("bob", 10, false);

        let pipeline = h.gate.pipeline();
        for _ in 0..3 {
            pipeline.admit(&user("alice"), "/api/predict").await.unwrap();
        }
        pipeline.admit(&user("bob"), "/api/predict").await.unwrap();

        let statuses = h.gate.admin().rate_status().await.unwrap();
        assert_eq!(statuses.len(), 2);

        let alice = &statuses[0];
        assert_eq!(alice.user_id, "alice");
        assert_eq!(alice.requests, 3);
        assert_eq!(alice.ai_allowed, Some(true));
        assert!(matches!(alice.ttl_seconds, Some(58..=60)));

        assert_eq!(
            statuses[1],
            RateStatus {
                user_id: "bob".to_string(),
                requests: 1,
                ai_allowed: Some(false),
                ttl_seconds: statuses[1].ttl_seconds,
            }
        );
    });
}

#[test]
fn rate_status_without_cached_prediction() {
    block_on(async {
        let h = harness(options(60, 1));

        h.gate
            .pipeline()
            .rate_limiter()
            .check_and_increment(&user("carol"))
            .await
            .unwrap();

        let statuses = h.gate.admin().rate_status().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].ai_allowed, None);
        assert_eq!(statuses[0].requests, 1);
    });
}

#[test]
fn rate_status_skips_unreadable_counters() {
    block_on(async {
        let h = harness(options(60, 5));
        h.fast
            .set_ex("turnstile:rate:mallory", "NaN", Duration::from_secs(60))
            .await
            .unwrap();
        h.fast
            .set_ex("other:rate:alice", "1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(h.gate.admin().rate_status().await.unwrap().is_empty());
    });
}

#[test]
fn recent_logs_newest_first_with_limit() {
    block_on(async {
        let h = harness(options(60, 5));
        let logger = h.gate.pipeline().logger();

        for name in ["u1", "u2", "u3", "u4"] {
            logger.record(&user(name), "/api/predict", true).await.unwrap();
        }

        let admin = h.gate.admin();
        let logs = admin.recent_logs(2).await.unwrap();
        let users: Vec<&str> = logs.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, ["u4", "u3"]);

        assert_eq!(admin.recent_logs(100).await.unwrap().len(), 4);
        assert!(admin.recent_logs(0).await.unwrap().is_empty());
        assert_eq!(admin.recent_logs_default().await.unwrap().len(), 4);
    });
}

#[test]
fn recent_logs_default_limit_is_fifty() {
    block_on(async {
        let h = harness(options(60, 5));
        let logger = h.gate.pipeline().logger();

        for _ in 0..60 {
            logger.record(&user("alice"), "/api/predict", true).await.unwrap();
        }

        assert_eq!(h.gate.admin().recent_logs_default().await.unwrap().len(), 50);
    });
}

#[test]
fn recent_logs_skip_malformed_entries() {
    block_on(async {
        let h = harness(options(60, 5));

        h.gate
            .pipeline()
            .logger()
            .record(&user("alice"), "/api/predict", true)
            .await
            .unwrap();
        h.fast
            .lpush("turnstile:requests_log", "garbage")
            .await
            .unwrap();

        let logs = h.gate.admin().recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id, "alice");
    });
}

#[test]
fn admin_reads_do_not_write() {
    block_on(async {
        let h = harness(options(60, 5));
        h.gate
            .pipeline()
            .admit(&user("alice"), "/api/predict")
            .await
            .unwrap();

        let sets_before = h.fast.sets.load(std::sync::atomic::Ordering::SeqCst);
        let admin = h.gate.admin();
        admin.rate_status().await.unwrap();
        admin.recent_logs_default().await.unwrap();

        assert_eq!(
            h.fast.sets.load(std::sync::atomic::Ordering::SeqCst),
            sets_before
        );
        assert_eq!(
            h.fast.get("turnstile:rate:alice").await.unwrap().as_deref(),
            Some("1")
        );
    });
}
