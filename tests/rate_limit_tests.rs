//! Request limiting through the full router.

mod test_utils;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use test_utils::{FakeAuthProvider, TestApp};

fn version_request(client_ip: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri("/api/version?version=1.0.0");
    if let Some(ip) = client_ip {
        builder = builder.header("X-Forwarded-For", ip);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn hundred_and_first_request_is_rejected() {
    let app = TestApp::new(FakeAuthProvider::default()).await.unwrap();

    for n in 1..=100u32 {
        let response = app.send(version_request(Some("203.0.113.7"))).await;
        assert_eq!(response.status, StatusCode::OK, "request {n}");
        assert_eq!(response.headers["x-ratelimit-limit"], "100");
        assert_eq!(
            response.headers["x-ratelimit-remaining"],
            (100 - n).to_string().as_str()
        );
    }

    let response = app.send(version_request(Some("203.0.113.7"))).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["code"], "RATE_LIMITED");

    let retry_after: u64 = response.headers["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 3600, "retry-after {retry_after}");
    assert_eq!(response.body["retry_after"], retry_after);

    // Another client still has its own window.
    let response = app.send(version_request(Some("198.51.100.1"))).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn clients_without_proxy_headers_share_a_bucket() {
    let config = rolodink::config::AppConfig {
        rate_limit_max_requests: 2,
        ..Default::default()
    };
    let app = TestApp::with_config(config, FakeAuthProvider::default())
        .await
        .unwrap();

    assert_eq!(app.send(version_request(None)).await.status, StatusCode::OK);
    assert_eq!(app.send(version_request(None)).await.status, StatusCode::OK);
    assert_eq!(
        app.send(version_request(None)).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn health_and_docs_are_not_limited() {
    let config = rolodink::config::AppConfig {
        rate_limit_max_requests: 1,
        ..Default::default()
    };
    let app = TestApp::with_config(config, FakeAuthProvider::default())
        .await
        .unwrap();

    for _ in 0..3 {
        let response = app
            .send(Request::get("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.headers.get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn unauthenticated_requests_still_count() {
    let config = rolodink::config::AppConfig {
        rate_limit_max_requests: 1,
        ..Default::default()
    };
    let app = TestApp::with_config(config, FakeAuthProvider::default())
        .await
        .unwrap();

    let response = app.call(Method::GET, "/api/connections", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.call(Method::GET, "/api/connections", None, None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}
