use std::{sync::atomic::Ordering, time::Duration};

use crate::{FastStore, TurnstileError};

use super::{
    runtime::{async_sleep, block_on},
    support::{harness, options, short_timeouts, user},
};

#[test]
fn rejects_request_after_threshold() {
    block_on(async {
        let h = harness(options(60, 5));
        let limiter = h.gate.pipeline().rate_limiter();
        let alice = user("alice");

        for expected in 1..=5u64 {
            let check = limiter.check_and_increment(&alice).await.unwrap();
            assert_eq!(check.count, expected);
            assert!(!check.limit_exceeded, "request {expected} should pass");
        }

        let check = limiter.check_and_increment(&alice).await.unwrap();
        assert_eq!(check.count, 6);
        assert!(check.limit_exceeded);
    });
}

#[test]
fn rejected_requests_keep_counting() {
    block_on(async {
        let h = harness(options(60, 1));
        let limiter = h.gate.pipeline().rate_limiter();
        let bob = user("bob");

        for _ in 0..4 {
            limiter.check_and_increment(&bob).await.unwrap();
        }

        let check = limiter.check_and_increment(&bob).await.unwrap();
        assert_eq!(check.count, 5);
        assert!(check.limit_exceeded);
    });
}

#[test]
fn window_resets_after_expiry() {
    block_on(async {
        let h = harness(options(1, 2));
        let limiter = h.gate.pipeline().rate_limiter();
        let alice = user("alice");

        for _ in 0..3 {
            limiter.check_and_increment(&alice).await.unwrap();
        }
        assert!(limiter.check_and_increment(&alice).await.unwrap().limit_exceeded);

        async_sleep(Duration::from_millis(1_100)).await;

        let check = limiter.check_and_increment(&alice).await.unwrap();
        assert_eq!(check.count, 1);
        assert!(!check.limit_exceeded);
    });
}

#[test]
fn window_is_anchored_at_first_request() {
    block_on(async {
        let h = harness(options(1, 100));
        let limiter = h.gate.pipeline().rate_limiter();
        let alice = user("alice");

        limiter.check_and_increment(&alice).await.unwrap();
        async_sleep(Duration::from_millis(600)).await;
        limiter.check_and_increment(&alice).await.unwrap();
        async_sleep(Duration::from_millis(600)).await;

        // A sliding window would still hold both requests here.
        assert_eq!(limiter.check_and_increment(&alice).await.unwrap().count, 1);
    });
}

#[test]
fn users_are_counted_independently() {
    block_on(async {
        let h = harness(options(60, 2));
        let limiter = h.gate.pipeline().rate_limiter();

        for _ in 0..3 {
            limiter.check_and_increment(&user("alice")).await.unwrap();
        }

        let check = limiter.check_and_increment(&user("bob")).await.unwrap();
        assert_eq!(check.count, 1);
        assert!(!check.limit_exceeded);
    });
}

#[test]
fn counter_is_stored_under_rate_key_with_window_ttl() {
    block_on(async {
        let h = harness(options(30, 5));
        let limiter = h.gate.pipeline().rate_limiter();

        limiter.check_and_increment(&user("alice")).await.unwrap();

        assert_eq!(
            h.fast.get("turnstile:rate:alice").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(h.fast.get("turnstile:prediction:alice").await.unwrap(), None);

        let ttl = h.fast.ttl("turnstile:rate:alice").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(28));

        assert_eq!(*limiter.window_size_seconds(), 30);
        assert_eq!(*limiter.threshold(), 5);
    });
}

#[test]
fn store_failure_is_returned_not_guessed() {
    block_on(async {
        let h = harness(short_timeouts(options(60, 5)));
        h.fast.fail_incr.store(true, Ordering::SeqCst);

        let err = h
            .gate
            .pipeline()
            .rate_limiter()
            .check_and_increment(&user("alice"))
            .await
            .unwrap_err();

        assert!(err.is_store_failure());
        assert!(matches!(err, TurnstileError::StoreUnavailable { .. }));
    });
}

#[test]
fn non_numeric_counter_is_integrity_error() {
    block_on(async {
        let h = harness(options(60, 5));
        h.fast
            .set_ex("turnstile:rate:alice", "lots", Duration::from_secs(60))
            .await
            .unwrap();

        let err = h
            .gate
            .pipeline()
            .rate_limiter()
            .check_and_increment(&user("alice"))
            .await
            .unwrap_err();

        assert!(err.is_data_integrity());
    });
}

#[test]
fn concurrent_requests_admit_exactly_threshold() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let h = harness(options(60, 10));
        let limiter = h.gate.pipeline().rate_limiter().clone();
        let mut handles = Vec::new();

        for _ in 0..50 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_and_increment(&user("alice")).await.unwrap()
            }));
        }

        let mut passed = 0;
        for handle in handles {
            if !handle.await.unwrap().limit_exceeded {
                passed += 1;
            }
        }

        assert_eq!(passed, 10);
    });
}
