mod common;

use axum::http::{HeaderValue, StatusCode};
use common::{multipart_request, multipart_request_from, test_router, Behavior, TestApp};
use tower::ServiceExt;

fn limited(config: &mut markitdown_service::config::ServiceConfig) {
    config.rate_limit.enabled = true;
    config.rate_limit.limit = "1/minute".to_string();
}

#[tokio::test]
async fn second_upload_within_window_is_rejected() {
    let app = TestApp::spawn_with(Behavior::Echo, limited).await;

    let first = app.upload(Some("a.txt"), b"first".to_vec()).await;
    assert_eq!(first.status(), reqwest::StatusCode::OK);

    let second = app.upload(Some("b.txt"), b"second".to_vec()).await;
    assert_eq!(second.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = second.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60, "{}", retry_after);

    let body: serde_json::Value = second.json().await.unwrap();
    assert!(body["error"].is_string());
    assert_eq!(app.converter.seen().len(), 1);
}

#[tokio::test]
async fn health_and_root_are_not_limited() {
    let app = TestApp::spawn_with(Behavior::Echo, limited).await;

    for _ in 0..5 {
        let health = app
            .client
            .get(format!("{}/health", app.address))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);

        let root = app.client.get(&app.address).send().await.unwrap();
        assert_eq!(root.status(), reqwest::StatusCode::OK);
    }
}

#[tokio::test]
async fn health_reports_active_limit() {
    let app = TestApp::spawn_with(Behavior::Echo, limited).await;

    let body: serde_json::Value = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["rate_limit_enabled"], true);
    assert_eq!(body["rate_limit"], "1/minute");
}

#[tokio::test]
async fn invalid_limit_leaves_service_unlimited() {
    let app = TestApp::spawn_with(Behavior::Echo, |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.limit = "lots/fortnight".to_string();
    })
    .await;

    for name in ["a.txt", "b.txt", "c.txt"] {
        let response = app.upload(Some(name), b"content".to_vec()).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let body: serde_json::Value = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["rate_limit_enabled"], false);
}

#[tokio::test]
async fn clients_are_limited_independently() {
    let (app, converter, _temp_dir) = test_router(Behavior::Echo, limited);

    let first = app
        .clone()
        .oneshot(multipart_request_from([198, 51, 100, 7], "a.txt", b"one"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let repeat = app
        .clone()
        .oneshot(multipart_request_from([198, 51, 100, 7], "a.txt", b"one"))
        .await
        .unwrap();
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .oneshot(multipart_request_from([203, 0, 113, 9], "a.txt", b"one"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    assert_eq!(converter.seen().len(), 2);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_budget() {
    let (app, converter, _temp_dir) = test_router(Behavior::Echo, limited);

    let mut statuses = Vec::new();
    for hop in 1..=5 {
        let mut request = multipart_request("a.txt", b"one");
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_str(&format!("10.9.9.{}", hop)).unwrap(),
        );
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }

    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses[1..]
        .iter()
        .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(converter.seen().len(), 1);
}

#[tokio::test]
async fn trusted_proxy_header_keys_clients() {
    let (app, converter, _temp_dir) = test_router(Behavior::Echo, |config| {
        limited(config);
        config.rate_limit.trust_forwarded_for = true;
    });

    for (hop, expected) in [
        ("10.9.9.1", StatusCode::OK),
        ("10.9.9.2", StatusCode::OK),
        ("10.9.9.1", StatusCode::TOO_MANY_REQUESTS),
    ] {
        let mut request = multipart_request("a.txt", b"one");
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static(hop));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected, "{}", hop);
    }

    assert_eq!(converter.seen().len(), 2);
}
