//! Integration tests for dfd-an API endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use dfd_an::services::{InputGate, JsonReportExporter, WorkflowOrchestrator};
use dfd_common::config::{AnalysisSettings, DEFAULT_MAX_UPLOAD_BYTES};
use dfd_common::events::EventBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

/// Settings that finish a run in a few milliseconds
fn fast_settings() -> AnalysisSettings {
    AnalysisSettings {
        upload_tick_ms: 1,
        evaluator_delay_ms: 1,
        seed: Some(11),
        ..Default::default()
    }
}

/// Settings that keep a run in EVALUATING for the whole test
fn slow_settings() -> AnalysisSettings {
    AnalysisSettings {
        upload_tick_ms: 1,
        evaluator_delay_ms: 600_000,
        evaluator_timeout_ms: 1_200_000,
        ..Default::default()
    }
}

/// Test helper: create test app writing reports into `reports_dir`
fn create_test_app(settings: AnalysisSettings, max_bytes: u64, reports_dir: &Path) -> axum::Router {
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&settings, EventBus::new(256)));
    let state = dfd_an::AppState::new(
        orchestrator,
        InputGate::new(max_bytes),
        Arc::new(JsonReportExporter::new(reports_dir.to_path_buf())),
    );
    dfd_an::build_router(state)
}

/// Test helper: write a file of `size` bytes
fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; size]).expect("Failed to write test file");
    path
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
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

async fn submit(app: &axum::Router, path: &Path, mime_type: Option<&str>) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/analysis/submit",
        Some(json!({ "file_path": path, "mime_type": mime_type })),
    )
    .await
}

/// Poll status until the phase matches (fails after ~5 s)
async fn wait_for_phase(app: &axum::Router, phase: &str) -> Value {
    for _ in 0..500 {
        let (_, status) = send(app, "GET", "/analysis/status", None).await;
        if status["phase"] == phase {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("phase never became {}", phase);
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "dfd-an");
    assert_eq!(body["phase"], "idle");
    assert!(body.get("last_error").is_none());
    assert_eq!(body["event_subscribers"], 0);
}

#[tokio::test]
async fn test_submit_unsupported_type_returns_415() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());
    let path = write_file(dir.path(), "notes.txt", 32);

    let (status, body) = submit(&app, &path, Some("text/plain")).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "UNSUPPORTED_TYPE");

    // Rejection never reaches the workflow
    let (_, status) = send(&app, "GET", "/analysis/status", None).await;
    assert_eq!(status["phase"], "idle");
}

#[tokio::test]
async fn test_submit_too_large_returns_413() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), 16, dir.path());
    let path = write_file(dir.path(), "clip.mp4", 17);

    let (status, body) = submit(&app, &path, Some("video/mp4")).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "TOO_LARGE");
}

#[tokio::test]
async fn test_submit_missing_file_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());

    let (status, body) = submit(&app, &dir.path().join("gone.mp4"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNREADABLE");
}

#[tokio::test]
async fn test_submit_conflict_status_and_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(slow_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());
    let path = write_file(dir.path(), "clip.mov", 1024);

    let (status, body) = submit(&app, &path, Some("video/quicktime")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "uploading");
    assert_eq!(body["mime_type"], "video/mov");
    assert_eq!(body["evaluators"].as_array().unwrap().len(), 5);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, body) = submit(&app, &path, Some("video/quicktime")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let status = wait_for_phase(&app, "evaluating").await;
    assert_eq!(status["run_id"], run_id.as_str());
    assert_eq!(status["upload_progress"], 100.0);
    assert_eq!(status["evaluator_position"], 1);
    assert_eq!(status["evaluator_count"], 5);
    assert_eq!(status["current_operation"], "Analyzing with FaceForensics++...");
    assert_eq!(status["file_name"], "clip.mov");

    // Reset is for completed runs only
    let (status, _) = send(&app, "POST", "/analysis/reset", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/analysis/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "cancelled");
    assert_eq!(body["phase"], "evaluating");
    assert_eq!(body["run_id"], run_id.as_str());

    let (_, status) = send(&app, "GET", "/analysis/status", None).await;
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["upload_progress"], 0.0);
    assert!(status["run_id"].is_null());

    let (status, body) = send(&app, "POST", "/analysis/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "no_active_run");
}

#[tokio::test]
async fn test_result_not_found_until_complete() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());

    let (status, body) = send(&app, "GET", "/analysis/result", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, "GET", "/analysis/report", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", "/analysis/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["cleared_run_id"].is_null());
    assert_eq!(body["phase"], "idle");
}

#[tokio::test]
async fn test_full_run_result_report_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, &reports);
    let path = write_file(dir.path(), "clip.mp4", 4096);

    let (status, body) = submit(&app, &path, Some("video/mp4")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let status = wait_for_phase(&app, "complete").await;
    assert_eq!(status["evaluation_progress"], 100.0);
    assert_eq!(status["verdicts"].as_array().unwrap().len(), 5);

    let (status, result) = send(&app, "GET", "/analysis/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["run_id"], run_id.as_str());
    assert_eq!(result["verdicts"].as_array().unwrap().len(), 5);
    assert_eq!(result["metadata"]["byte_size"], 4096);
    assert_eq!(result["metadata"]["format"], "mp4");

    // Report download
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/analysis/report")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"deepfake-analysis-"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let report: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["filename"], "clip.mp4");
    assert_eq!(report["modelResults"].as_array().unwrap().len(), 5);
    assert_eq!(std::fs::read_dir(&reports).unwrap().count(), 1);

    // New submissions wait for reset
    let (status, _) = submit(&app, &path, Some("video/mp4")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/analysis/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared_run_id"], run_id.as_str());
    assert_eq!(body["phase"], "idle");

    let (status, _) = send(&app, "GET", "/analysis/result", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analysis_events_stream_reports_submitted_run() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(slow_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());
    let path = write_file(dir.path(), "clip.mkv", 2048);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/analysis/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let mut body = response.into_body();

    let (status, submitted) = submit(&app, &path, Some("video/x-matroska")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let frame = body.frame().await.unwrap().unwrap().into_data().unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.starts_with("event: AnalysisRunStarted\n"), "frame: {}", frame);
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let event: Value = serde_json::from_str(data).unwrap();
    assert_eq!(event["type"], "AnalysisRunStarted");
    assert_eq!(event["run_id"], submitted["run_id"]);
    assert_eq!(event["file_name"], "clip.mkv");
    assert_eq!(event["byte_size"], 2048);

    send(&app, "POST", "/analysis/cancel", None).await;
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(fast_settings(), DEFAULT_MAX_UPLOAD_BYTES, dir.path());

    let (status, _) = send(&app, "GET", "/analysis/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
