//! Analysis workflow API handlers
//!
//! POST /analysis/submit, GET /analysis/status, POST /analysis/cancel,
//! POST /analysis/reset, GET /analysis/result, GET /analysis/report

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dfd_common::events::DfdEvent;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{AggregateResult, EvaluatorVerdict, WorkflowPhase},
    services::CancelOutcome,
    AppState,
};

/// POST /analysis/submit request
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// File to analyze, readable by the service
    pub file_path: PathBuf,
    /// Client-declared MIME type; sniffed from content when absent
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// POST /analysis/submit response
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub run_id: Uuid,
    pub phase: WorkflowPhase,
    pub file_name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub evaluators: Vec<String>,
}

/// GET /analysis/status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub run_id: Option<Uuid>,
    pub phase: WorkflowPhase,
    pub upload_progress: f64,
    pub evaluation_progress: f64,
    pub current_operation: String,
    /// 1-based position of the running evaluator ("Model k/N")
    pub evaluator_position: Option<usize>,
    pub evaluator_count: usize,
    pub evaluators: Vec<String>,
    pub verdicts: Vec<EvaluatorVerdict>,
    pub file_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// POST /analysis/reset response
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub cleared_run_id: Option<Uuid>,
    pub phase: WorkflowPhase,
}

/// POST /analysis/submit
///
/// Validate the file and start a run. Returns 202 Accepted with the run ID.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let artifact = state.gate.submit_path(&request.file_path, request.mime_type)?;

    let file_name = artifact.name.clone();
    let byte_size = artifact.byte_size;
    let mime_type = artifact.mime_type.clone();

    let handle = state.orchestrator.start_run(artifact).await?;

    tracing::info!(run_id = %handle.run_id, file = %file_name, "Analysis submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            run_id: handle.run_id,
            phase: WorkflowPhase::Uploading,
            file_name,
            byte_size,
            mime_type,
            evaluators: state.orchestrator.evaluator_names(),
        }),
    ))
}

/// GET /analysis/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.orchestrator.session().snapshot().await;

    Json(StatusResponse {
        run_id: snapshot.run_id,
        phase: snapshot.phase,
        upload_progress: snapshot.progress.upload_progress,
        evaluation_progress: snapshot.progress.evaluation_progress,
        current_operation: snapshot.current_operation(),
        evaluator_position: snapshot.evaluator_position(),
        evaluator_count: snapshot.evaluator_count(),
        file_name: snapshot.artifact.as_ref().map(|a| a.name.clone()),
        started_at: snapshot.started_at,
        last_error: snapshot.last_error,
        evaluators: snapshot.evaluators,
        verdicts: snapshot.verdicts,
    })
}

/// POST /analysis/cancel
///
/// Always 200; the body says whether anything was cancelled.
pub async fn cancel_analysis(State(state): State<AppState>) -> Json<CancelOutcome> {
    Json(state.orchestrator.session().cancel().await)
}

/// POST /analysis/reset
///
/// Clear a completed run. 409 while a run is uploading or evaluating.
pub async fn reset_analysis(State(state): State<AppState>) -> ApiResult<Json<ResetResponse>> {
    let session = state.orchestrator.session();
    let cleared_run_id = session.start_new().await?;
    Ok(Json(ResetResponse {
        cleared_run_id,
        phase: session.phase().await,
    }))
}

/// GET /analysis/result
pub async fn get_result(State(state): State<AppState>) -> ApiResult<Json<AggregateResult>> {
    let result = state
        .orchestrator
        .session()
        .result()
        .await
        .ok_or_else(|| ApiError::NotFound("No completed analysis".to_string()))?;
    Ok(Json((*result).clone()))
}

/// GET /analysis/report
///
/// Export the completed run and return the report as a JSON attachment.
pub async fn get_report(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let result = state
        .orchestrator
        .session()
        .result()
        .await
        .ok_or_else(|| ApiError::NotFound("No completed analysis".to_string()))?;

    let exported = state.exporter.export(&result, Utc::now()).await?;

    state.event_bus.emit_lossy(DfdEvent::ReportExported {
        run_id: result.run_id,
        file_name: exported.file_name.clone(),
        timestamp: Utc::now(),
    });

    let disposition = format!("attachment; filename=\"{}\"", exported.file_name);
    Ok((
        [(header::CONTENT_DISPOSITION, disposition)],
        Json(exported.report),
    ))
}

/// Build analysis workflow routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/submit", post(submit_analysis))
        .route("/analysis/status", get(get_status))
        .route("/analysis/cancel", post(cancel_analysis))
        .route("/analysis/reset", post(reset_analysis))
        .route("/analysis/result", get(get_result))
        .route("/analysis/report", get(get_report))
}
