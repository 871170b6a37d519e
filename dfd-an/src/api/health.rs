//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use dfd_common::events::WorkflowPhase;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("dfd-an")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Current workflow phase
    pub phase: WorkflowPhase,
    /// Reason of the last aborted run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Open SSE connections
    pub event_subscribers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let snapshot = state.orchestrator.session().snapshot().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "dfd-an".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        phase: snapshot.phase,
        last_error: snapshot.last_error,
        event_subscribers: state.event_bus.subscriber_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
