//! Failure injection tests for the load balancer.

use std::time::Duration;
use axum::http::StatusCode;
use l7lb::config::RateLimiterKind;

mod common;

#[tokio::test]
async fn test_retry_on_failure() {
    let backend = common::start_programmable_backend(|n| async move {
        if n < 2 {
            (500, "Internal Server Error".into())
        } else {
            (200, "Success".into())
        }
    })
    .await;

    let proxy = common::start_proxy(common::config_for(&[&backend])).await;
    proxy.wait_healthy("/", 1).await;

    let res = common::client().get(proxy.url("/")).send().await.expect("proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK, "should succeed after retries");
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(backend.hits(), 3, "should have attempted 3 times");
}

#[tokio::test]
async fn test_exhausted_retries_return_last_status() {
    let backend = common::start_programmable_backend(|_| async { (503, "busy".into()) }).await;

    let proxy = common::start_proxy(common::config_for(&[&backend])).await;
    proxy.wait_healthy("/", 1).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let backend = common::start_programmable_backend(|_| async { (404, "not here".into()) }).await;

    let proxy = common::start_proxy(common::config_for(&[&backend])).await;
    proxy.wait_healthy("/", 1).await;

    let res = common::client().get(proxy.url("/missing?x=1")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "not here");
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_health_check_eviction() {
    let b1 = common::start_mock_backend("b1").await;
    let b2 = common::start_mock_backend("b2").await;

    let proxy = common::start_proxy(common::config_for(&[&b1, &b2])).await;
    proxy.wait_healthy("/", 2).await;

    let client = common::client();
    let mut b1_hits = 0;
    let mut b2_hits = 0;
    for _ in 0..10 {
        let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
        if body == "b1" { b1_hits += 1; }
        if body == "b2" { b2_hits += 1; }
    }
    assert_eq!(b1_hits, 5, "round robin should alternate");
    assert_eq!(b2_hits, 5, "round robin should alternate");

    b2.set_healthy(false);
    proxy.wait_healthy("/", 1).await;
    let b2_before = b2.hits();

    for _ in 0..10 {
        let body = client.get(proxy.url("/")).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "b1", "only b1 should be hit after b2 eviction");
    }
    assert_eq!(b2.hits(), b2_before);

    b2.set_healthy(true);
    proxy.wait_healthy("/", 2).await;
}

#[tokio::test]
async fn test_no_healthy_backend_is_503() {
    let backend = common::start_mock_backend("never").await;
    backend.set_healthy(false);

    let proxy = common::start_proxy(common::config_for(&[&backend])).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.probes.load(std::sync::atomic::Ordering::SeqCst) > 0);

    let res = common::client().get(proxy.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "no healthy backends available");
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let backend = common::start_mock_backend("api").await;
    let mut config = common::config_for(&[&backend]);
    config.routes[0].path = "/api".into();
    config.routes[0].match_kind = l7lb::config::MatchKind::Exact;

    let proxy = common::start_proxy(config).await;
    proxy.wait_healthy("/api", 1).await;

    let client = common::client();
    let res = client.get(proxy.url("/other")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "no route for path");

    let res = client.get(proxy.url("/api/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let backend = common::start_mock_backend("ok").await;
    let mut config = common::config_for(&[&backend]);
    config.rate_limit.kind = RateLimiterKind::FixedWindow;
    config.rate_limit.limit = 2;
    config.rate_limit.window_ms = 60_000;

    let proxy = common::start_proxy(config).await;
    proxy.wait_healthy("/", 1).await;

    let client = common::client();
    let statuses = [
        client.get(proxy.url("/")).send().await.unwrap().status(),
        client.get(proxy.url("/")).send().await.unwrap().status(),
        client.get(proxy.url("/")).send().await.unwrap().status(),
    ];

    assert_eq!(statuses, [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_request_id_is_returned() {
    let backend = common::start_mock_backend("ok").await;
    let proxy = common::start_proxy(common::config_for(&[&backend])).await;
    proxy.wait_healthy("/", 1).await;

    let res = common::client()
        .get(proxy.url("/"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_hung_backend_hits_request_deadline_as_502() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        (200, "too late".into())
    })
    .await;

    let mut config = common::config_for(&[&backend]);
    config.upstream = Default::default();
    config.retries = Default::default();
    config.timeouts.request_secs = 1;

    let proxy = common::start_proxy(config).await;
    proxy.wait_healthy("/", 1).await;

    let started = std::time::Instant::now();
    let res = common::client().get(proxy.url("/slow")).send().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "backend request failed");
    assert!(elapsed >= Duration::from_secs(1), "answered before the deadline: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "deadline not enforced: {:?}", elapsed);
    assert_eq!(backend.hits(), 1);
}
