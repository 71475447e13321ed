use super::*;

const T0: u64 = 1_700_000_000_000;

fn limiter() -> RateLimiter {
    RateLimiter::in_memory(RateLimitConfig::default())
}

fn window_ms() -> u64 {
    DEFAULT_WINDOW_SECS * 1000
}

#[tokio::test]
async fn anonymous_allows_ten_then_denies() {
    let rl = limiter();

    for i in 0..DEFAULT_ANONYMOUS_LIMIT {
        let d = rl.check_and_consume_at("u1", Tier::Anonymous, T0).await.unwrap();
        assert!(d.allowed, "request {i} should succeed");
    }
    let d = rl.check_and_consume_at("u1", Tier::Anonymous, T0).await.unwrap();
    assert!(!d.allowed);
    assert_eq!(d.remaining, 0);
}

#[tokio::test]
async fn remaining_decreases_by_one_to_zero() {
    let rl = limiter();
    let mut last = None;

    for _ in 0..DEFAULT_AUTHENTICATED_LIMIT {
        let d = rl
            .check_and_consume_at("u2", Tier::Authenticated, T0)
            .await
            .unwrap();
        if let Some(prev) = last {
            assert_eq!(d.remaining + 1, prev);
        }
        last = Some(d.remaining);
    }
    assert_eq!(last, Some(0));
}

#[tokio::test]
async fn first_request_reports_limit_minus_one() {
    let rl = limiter();
    let d = rl.check_and_consume_at("fresh", Tier::Anonymous, T0).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, DEFAULT_ANONYMOUS_LIMIT - 1);
    assert_eq!(d.limit, DEFAULT_ANONYMOUS_LIMIT);
    assert_eq!(d.resets_at_ms, T0 + window_ms());
}

#[tokio::test]
async fn denied_requests_do_not_increment() {
    let store = Arc::new(MemoryRateStore::new());
    let rl = RateLimiter::new(store.clone(), RateLimitConfig::default());

    for _ in 0..DEFAULT_ANONYMOUS_LIMIT + 5 {
        rl.check_and_consume_at("u3", Tier::Anonymous, T0).await.unwrap();
    }
    let record = store.get("u3").await.unwrap().unwrap();
    assert_eq!(record.count, DEFAULT_ANONYMOUS_LIMIT);
}

#[tokio::test]
async fn window_expiry_resets_count() {
    let store = Arc::new(MemoryRateStore::new());
    let rl = RateLimiter::new(store.clone(), RateLimitConfig::default());

    for _ in 0..DEFAULT_ANONYMOUS_LIMIT {
        rl.check_and_consume_at("u4", Tier::Anonymous, T0).await.unwrap();
    }
    assert!(!rl.check_and_consume_at("u4", Tier::Anonymous, T0).await.unwrap().allowed);

    let after_window = T0 + window_ms() + 1;
    let d = rl
        .check_and_consume_at("u4", Tier::Anonymous, after_window)
        .await
        .unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, DEFAULT_ANONYMOUS_LIMIT - 1);

    let record = store.get("u4").await.unwrap().unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.window_start_ms, after_window);
}

#[tokio::test]
async fn window_boundary_is_still_inside_window() {
    let rl = limiter();
    for _ in 0..DEFAULT_ANONYMOUS_LIMIT {
        rl.check_and_consume_at("edge", Tier::Anonymous, T0).await.unwrap();
    }
    let d = rl
        .check_and_consume_at("edge", Tier::Anonymous, T0 + window_ms())
        .await
        .unwrap();
    assert!(!d.allowed);
}

#[tokio::test]
async fn authenticated_limit_dominates_shared_counter() {
    let rl = limiter();

    for _ in 0..DEFAULT_ANONYMOUS_LIMIT {
        rl.check_and_consume_at("same", Tier::Anonymous, T0).await.unwrap();
    }
    assert!(!rl.check_and_consume_at("same", Tier::Anonymous, T0).await.unwrap().allowed);

    let d = rl
        .check_and_consume_at("same", Tier::Authenticated, T0)
        .await
        .unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, DEFAULT_AUTHENTICATED_LIMIT - DEFAULT_ANONYMOUS_LIMIT - 1);
}

#[tokio::test]
async fn distinct_identifiers_do_not_interfere() {
    let rl = limiter();

    for _ in 0..DEFAULT_ANONYMOUS_LIMIT {
        rl.check_and_consume_at("a", Tier::Anonymous, T0).await.unwrap();
    }
    assert!(!rl.check_and_consume_at("a", Tier::Anonymous, T0).await.unwrap().allowed);
    assert!(rl.check_and_consume_at("b", Tier::Anonymous, T0).await.unwrap().allowed);
}

#[tokio::test]
async fn empty_identifier_fails_fast() {
    let rl = limiter();
    assert!(matches!(
        rl.check_and_consume_at("", Tier::Anonymous, T0).await,
        Err(RateLimitError::EmptyIdentifier)
    ));
    assert!(matches!(
        rl.check_and_consume_at("   ", Tier::Authenticated, T0).await,
        Err(RateLimitError::EmptyIdentifier)
    ));
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_the_limit() {
    let rl = limiter();
    let mut handles = Vec::new();
    for _ in 0..50 {
        let rl = rl.clone();
        handles.push(tokio::spawn(async move { rl.check_and_consume_at("burst", Tier::Anonymous, T0).await }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().allowed {
            admitted += 1;
        }
    }
    assert_eq!(admitted, DEFAULT_ANONYMOUS_LIMIT);
}

#[tokio::test]
async fn peek_does_not_consume() {
    let rl = limiter();
    rl.check_and_consume_at("p", Tier::Anonymous, T0).await.unwrap();

    for _ in 0..3 {
        let usage = rl.peek_at("p", Tier::Anonymous, T0 + 10).await.unwrap();
        assert_eq!(usage.used, 1);
        assert_eq!(usage.remaining, DEFAULT_ANONYMOUS_LIMIT - 1);
        assert_eq!(usage.resets_at_ms, Some(T0 + window_ms()));
    }
}

#[tokio::test]
async fn peek_unknown_or_expired_reports_full_quota() {
    let rl = limiter();
    let usage = rl.peek_at("nobody", Tier::Authenticated, T0).await.unwrap();
    assert_eq!(usage.used, 0);
    assert_eq!(usage.remaining, DEFAULT_AUTHENTICATED_LIMIT);
    assert_eq!(usage.resets_at_ms, None);

    rl.check_and_consume_at("old", Tier::Anonymous, T0).await.unwrap();
    let usage = rl
        .peek_at("old", Tier::Anonymous, T0 + window_ms() + 1)
        .await
        .unwrap();
    assert_eq!(usage.used, 0);
    assert_eq!(usage.remaining, DEFAULT_ANONYMOUS_LIMIT);
}

#[test]
fn tier_from_logged_in() {
    assert_eq!(Tier::from_logged_in(true), Tier::Authenticated);
    assert_eq!(Tier::from_logged_in(false), Tier::Anonymous);
}

#[test]
fn store_error_codes_flow_through() {
    let err = RateLimitError::Store(StoreError::Corrupt { identifier: "x".into(), detail: "bad".into() });
    assert_eq!(err.error_code(), "E_STORE_CORRUPT");
    assert!(!err.retryable());
    assert_eq!(RateLimitError::EmptyIdentifier.error_code(), "E_EMPTY_IDENTIFIER");
}
