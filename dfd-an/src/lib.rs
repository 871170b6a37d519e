//! dfd-an library interface
//!
//! Exposes the analysis workflow and the HTTP router for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use dfd_common::events::EventBus;
use services::{InputGate, ReportExporter, WorkflowOrchestrator};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Runs analyses and owns the workflow session
    pub orchestrator: Arc<WorkflowOrchestrator>,
    /// Validates submitted files before they reach the workflow
    pub gate: InputGate,
    pub exporter: Arc<dyn ReportExporter>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<WorkflowOrchestrator>,
        gate: InputGate,
        exporter: Arc<dyn ReportExporter>,
    ) -> Self {
        let event_bus = orchestrator.session().event_bus().clone();
        Self {
            orchestrator,
            gate,
            exporter,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::analysis_routes())
        .route("/events", get(api::event_stream))
        .route("/analysis/events", get(api::analysis_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
