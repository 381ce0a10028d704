use axum::http::StatusCode;
use serde_json::json;
use std::future::IntoFuture;

use crate::common::{monitor_body, test_url, TestContext, TestOptions};
use pagewatch::services::monitor::engine::{ALERT_SUBJECT, READY_SUBJECT};

#[tokio::test]
async fn test_create_with_valid_data_returns_created() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "SOLD OUT", 3))
        .await;

    response.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["created"], true);
    let id = body["monitor_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert_eq!(body["monitor_url"], format!("/monitor/{}", id));
}

#[tokio::test]
async fn test_create_runs_an_immediate_check() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "SOLD OUT", 1))
        .await;
    let body: serde_json::Value = response.json();
    let id = body["monitor_id"].as_str().unwrap();

    assert_eq!(ctx.fetcher.calls(), 1);
    assert!(ctx.engine.is_running(id).await);

    let logs = ctx.engine.registry().recent(id, 100).await;
    assert!(logs.iter().any(|e| e.message.starts_with("monitor created for")));
    assert!(logs.iter().any(|e| e.message.starts_with("schedule started for")));
    assert!(logs
        .iter()
        .any(|e| e.message.contains("no match") && e.message.contains("text 'SOLD OUT'")));
}

#[tokio::test]
async fn test_duplicate_url_reuses_monitor_and_loop() {
    let ctx = TestContext::new();
    let url = test_url();

    let first: serde_json::Value = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&url, "SOLD OUT", 1))
        .await
        .json();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&url, "Back in stock", 12))
        .await;

    response.assert_status_ok();
    let second: serde_json::Value = response.json();
    assert_eq!(second["created"], false);
    assert_eq!(second["monitor_id"], first["monitor_id"]);

    // The original definition is kept, checked again, and still has one loop
    let id = first["monitor_id"].as_str().unwrap();
    let status: serde_json::Value = ctx.server.get(&format!("/status/{}", id)).await.json();
    assert_eq!(status["match"], "SOLD OUT");
    assert_eq!(status["interval_hours"], 1);
    assert_eq!(ctx.fetcher.calls(), 2);
    assert!(ctx.engine.is_running(id).await);

    let logs = ctx.engine.registry().recent(id, 100).await;
    let schedules = logs
        .iter()
        .filter(|e| e.message.starts_with("schedule started for"))
        .count();
    assert_eq!(schedules, 1);
    let checks = logs
        .iter()
        .filter(|e| e.message.contains("text 'SOLD OUT'"))
        .count();
    assert_eq!(checks, 2);
}

#[tokio::test]
async fn test_concurrent_creation_yields_single_monitor() {
    let ctx = TestContext::new();
    let url = test_url();

    let a = ctx.server.post("/monitor").json(&monitor_body(&url, "x", 6));
    let b = ctx.server.post("/monitor").json(&monitor_body(&url, "y", 6));
    let (a, b) = tokio::join!(a.into_future(), b.into_future());

    let a: serde_json::Value = a.json();
    let b: serde_json::Value = b.json();
    assert_eq!(a["monitor_id"], b["monitor_id"]);

    let created = [&a, &b].iter().filter(|r| r["created"] == true).count();
    assert_eq!(created, 1);

    // One check per submission, one loop in total
    assert_eq!(ctx.fetcher.calls(), 2);
    let id = a["monitor_id"].as_str().unwrap();
    let logs = ctx.engine.registry().recent(id, 100).await;
    let schedules = logs
        .iter()
        .filter(|e| e.message.starts_with("schedule started for"))
        .count();
    assert_eq!(schedules, 1);
}

#[tokio::test]
async fn test_match_sends_ready_notice_then_alert() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&json!({
            "url": test_url(),
            "selector": "h1.price",
            "interval_hours": 6,
            "email_to": "owner@example.com",
            "email_message": "Price is up!"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let sent = ctx.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject, READY_SUBJECT);
    assert_eq!(sent[1].subject, ALERT_SUBJECT);
    assert_eq!(sent[1].body, "Price is up!");
    assert_eq!(sent[1].recipient, "owner@example.com");
}

#[tokio::test]
async fn test_match_without_transport_logs_skipped() {
    let ctx = TestContext::with_options(TestOptions {
        smtp_configured: false,
        ..TestOptions::default()
    });

    let body: serde_json::Value = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "In stock", 1))
        .await
        .json();
    let id = body["monitor_id"].as_str().unwrap();

    let logs: serde_json::Value = ctx.server.get(&format!("/logs/{}", id)).await.json();
    let logs = logs.as_array().unwrap();
    assert!(logs.iter().any(|e| e["level"] == "match"));
    assert!(logs
        .iter()
        .any(|e| e["level"] == "error" && e["message"].as_str().unwrap().starts_with("email skipped")));
    assert!(ctx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_is_logged_not_returned() {
    let ctx = TestContext::new();
    ctx.fetcher.set_page(None);

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "SOLD OUT", 1))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    let id = body["monitor_id"].as_str().unwrap();
    let logs = ctx.engine.registry().recent(id, 100).await;
    let last = logs.last().unwrap();
    assert_eq!(last.level.as_str(), "error");
    assert!(last.message.contains("502"));
}

// =============================================================================
// VALIDATION
// =============================================================================

#[tokio::test]
async fn test_create_with_invalid_interval_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "SOLD OUT", 2))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_interval");
    assert_eq!(ctx.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_create_with_empty_pattern_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "", 1))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "empty_pattern");
}

#[tokio::test]
async fn test_create_with_invalid_selector_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&json!({
            "url": test_url(),
            "selector": "h1[[[",
            "interval_hours": 1,
            "email_to": "owner@example.com"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_selector");
}

#[tokio::test]
async fn test_create_with_invalid_email_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&json!({
            "url": test_url(),
            "match": "x",
            "interval_hours": 1,
            "email_to": "invalid-email"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_create_with_non_http_url_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body("ftp://files.example.com/list", "x", 1))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_with_malformed_json_returns_bad_request() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/monitor")
        .json(&json!({ "url": test_url(), "interval_hours": "soon" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

// =============================================================================
// ACCESS PASSWORD
// =============================================================================

#[tokio::test]
async fn test_create_with_wrong_password_returns_unauthorized() {
    let ctx = TestContext::with_options(TestOptions {
        access_password: Some("hunter2"),
        ..TestOptions::default()
    });

    let mut body = monitor_body(&test_url(), "SOLD OUT", 1);
    body["access_password"] = json!("wrong");
    let response = ctx.server.post("/monitor").json(&body).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.fetcher.calls(), 0);

    let response = ctx
        .server
        .post("/monitor")
        .json(&monitor_body(&test_url(), "SOLD OUT", 1))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_with_correct_password_succeeds() {
    let ctx = TestContext::with_options(TestOptions {
        access_password: Some("hunter2"),
        ..TestOptions::default()
    });

    let mut body = monitor_body(&test_url(), "SOLD OUT", 1);
    body["access_password"] = json!("hunter2");
    let response = ctx.server.post("/monitor").json(&body).await;

    response.assert_status(StatusCode::CREATED);
}
