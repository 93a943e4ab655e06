//! End-to-end tests for the HTTP control surface.
//!
//! Each test drives the full production router (middleware included)
//! over the in-memory ledger with stub collaborators, using
//! `tower::ServiceExt::oneshot` -- no TCP listener involved.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{build_test_app, build_test_app_with_provider, StubProvider};

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn job_body(name: &str) -> Value {
    json!({
        "name": name,
        "schedule": "every 30 minutes",
        "config": {
            "goal": "collects",
            "persona": "beginners",
            "output_count": 2
        }
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok_without_a_pool() {
    let harness = build_test_app();

    let (status, json) = send(&harness.app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_job_shows_up_in_list_and_get() {
    let harness = build_test_app();

    let (status, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/jobs",
        Some(job_body("morning-digest")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["name"], "morning-digest");
    assert_eq!(created["data"]["status"], "active");
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, list) = send(&harness.app, Method::GET, "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);

    let (status, fetched) =
        send(&harness.app, Method::GET, &format!("/api/v1/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["id"], id);
}

#[tokio::test]
async fn invalid_schedule_is_rejected_with_400() {
    let harness = build_test_app();

    let mut body = job_body("bad-schedule");
    body["schedule"] = json!("whenever you feel like it");

    let (status, json) = send(&harness.app, Method::POST, "/api/v1/jobs", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let harness = build_test_app();

    let (status, json) = send(&harness.app, Method::GET, "/api/v1/jobs/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn pause_and_resume_flip_job_status() {
    let harness = build_test_app();

    let (_, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/jobs",
        Some(job_body("pausable")),
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, paused) = send(
        &harness.app,
        Method::POST,
        &format!("/api/v1/jobs/{id}/pause"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["data"]["status"], "paused");

    let (status, resumed) = send(
        &harness.app,
        Method::POST,
        &format!("/api/v1/jobs/{id}/resume"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["data"]["status"], "active");
}

#[tokio::test]
async fn trigger_conflicts_while_an_execution_is_running() {
    let harness =
        build_test_app_with_provider(Arc::new(StubProvider::with_delay(Duration::from_millis(
            300,
        ))));

    let (_, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/jobs",
        Some(job_body("slow-job")),
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let trigger_uri = format!("/api/v1/jobs/{id}/trigger");
    let (status, first) = send(&harness.app, Method::POST, &trigger_uri, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["trigger"], "manual");
    assert_eq!(first["data"]["status"], "running");

    let (status, second) = send(&harness.app, Method::POST, &trigger_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["code"], "CONFLICT");
}

#[tokio::test]
async fn execution_history_is_visible_per_job() {
    let harness = build_test_app();

    let (_, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/jobs",
        Some(job_body("tracked")),
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, _) = send(
        &harness.app,
        Method::POST,
        &format!("/api/v1/jobs/{id}/trigger"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, history) = send(
        &harness.app,
        Method::GET,
        &format!("/api/v1/jobs/{id}/executions"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"].as_array().unwrap().len(), 1);

    let (status, all) = send(&harness.app, Method::GET, "/api/v1/executions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Scheduler lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduler_start_stop_round_trip() {
    let harness = build_test_app();

    let (status, json) = send(&harness.app, Method::GET, "/api/v1/scheduler/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["running"], false);

    let (status, _) = send(&harness.app, Method::POST, "/api/v1/scheduler/start", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&harness.app, Method::GET, "/api/v1/scheduler/status", None).await;
    assert_eq!(json["data"]["running"], true);

    let (status, _) = send(&harness.app, Method::POST, "/api/v1/scheduler/stop", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&harness.app, Method::GET, "/api/v1/scheduler/status", None).await;
    assert_eq!(json["data"]["running"], false);
}

// ---------------------------------------------------------------------------
// Generation queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generation_task_can_be_queued_and_fetched() {
    let harness = build_test_app();

    let (status, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/generation/tasks",
        Some(json!({ "prompt": "write a haiku", "model": "gpt-test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["status"], "queued");
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, fetched) = send(
        &harness.app,
        Method::GET,
        &format!("/api/v1/generation/tasks/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["prompt"], "write a haiku");
}

#[tokio::test]
async fn empty_prompt_is_rejected_with_400() {
    let harness = build_test_app();

    let (status, json) = send(
        &harness.app,
        Method::POST,
        "/api/v1/generation/tasks",
        Some(json!({ "prompt": "   ", "model": "gpt-test" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Publish queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_record_for_missing_creative_returns_404() {
    let harness = build_test_app();

    let (status, json) = send(
        &harness.app,
        Method::POST,
        "/api/v1/publish/records",
        Some(json!({ "creative_id": 123 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn process_next_on_an_empty_queue_is_idle() {
    let harness = build_test_app();

    let (status, json) = send(
        &harness.app,
        Method::POST,
        "/api/v1/publish/process-next",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["outcome"], "idle");
}

// ---------------------------------------------------------------------------
// Image queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueued_images_appear_in_stats() {
    let harness = build_test_app();

    let (status, created) = send(
        &harness.app,
        Method::POST,
        "/api/v1/images/enqueue",
        Some(json!({
            "media_urls": "https://cdn.test/a.png, https://cdn.test/b.png, not-a-url"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"].as_array().unwrap().len(), 2);

    let (status, stats) = send(&harness.app, Method::GET, "/api/v1/images/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["data"]["pending"], 2);

    let (status, report) = send(
        &harness.app,
        Method::POST,
        "/api/v1/images/process-batch",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["data"]["claimed"], 2);
    assert_eq!(report["data"]["downloaded"], 2);

    let (_, stats) = send(&harness.app, Method::GET, "/api/v1/images/stats", None).await;
    assert_eq!(stats["data"]["done"], 2);
}
