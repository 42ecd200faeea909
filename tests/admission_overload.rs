mod common;

use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;

async fn slow_classify(Json(_body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Json(json!([{"category": "info", "forward_to": "archive"}]))
}

/// With only one concurrency slot, a second request arriving while the
/// first is still in flight is rejected immediately with 503.
#[tokio::test]
async fn rejects_when_concurrency_cap_exceeded() {
    let mut guard = common::EnvGuard::new();
    let (upstream_url, _upstream) =
        common::spawn_mock_upstream(Router::new().route("/classify", post(slow_classify))).await;

    guard.set_many(&[
        ("AI_API_ENDPOINT", &upstream_url),
        ("AI_API_KEY", "upstream-secret"),
        ("MAX_CONCURRENT_REQUESTS", "1"),
        ("PER_ATTEMPT_TIMEOUT_MS", "2000"),
        ("REQUEST_DEADLINE_MS", "2000"),
    ]);

    let (base_url, _app, _state) = common::spawn_app().await;
    let body = json!({"items": [{"type": "log", "content": {"message": "x"}}]});
    let client = Client::new();

    let base_url_2 = base_url.clone();
    let body_2 = body.clone();
    let client_2 = client.clone();
    let first = tokio::spawn(async move {
        client_2
            .post(format!("{base_url_2}/sort"))
            .json(&body_2)
            .send()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client
        .post(format!("{base_url}/sort"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 503);
    assert!(second.headers().contains_key("retry-after"));

    let first_resp = first.await.unwrap();
    assert_eq!(first_resp.status(), 200);

    let metrics_body = client
        .get(format!("{base_url}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics_body.contains(r#"ai_sorter_requests_total{status="rejected"} 1"#));
}
