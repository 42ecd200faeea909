mod common;

use axum::routing::post;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;

async fn classify_ok(Json(_body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!([
        {"category": "critical", "forward_to": "alerting"},
        {"category": "info", "forward_to": "archive"},
    ]))
}

#[tokio::test]
async fn sort_returns_upstream_classifications() {
    let mut guard = common::EnvGuard::new();
    let (upstream_url, _upstream) =
        common::spawn_mock_upstream(Router::new().route("/classify", post(classify_ok))).await;

    guard.set_many(&[
        ("AI_API_ENDPOINT", &upstream_url),
        ("AI_API_KEY", "upstream-secret"),
        ("MAX_RETRIES", "1"),
        ("REQUEST_DEADLINE_MS", "2000"),
        ("PER_ATTEMPT_TIMEOUT_MS", "1000"),
    ]);

    let (base_url, _app, _state) = common::spawn_app().await;
    let body = json!({
        "items": [
            {"type": "error", "content": {"message": "disk full"}},
            {"type": "log", "content": {"message": "user logged in"}},
        ]
    });

    let resp = Client::new()
        .post(format!("{base_url}/sort"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = resp.json().await.unwrap();
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["category"], "critical");
    assert_eq!(items[0]["forward_to"], "alerting");
    assert_eq!(items[1]["category"], "info");
    assert_eq!(items[1]["forward_to"], "archive");
}
