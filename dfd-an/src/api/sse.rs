//! Server-Sent Events for analysis progress streaming

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::info;

/// GET /analysis/events
///
/// Streams every analysis event: run started, phase changes, progress,
/// verdicts, completion, cancellation, abort, reset and report export.
pub async fn analysis_event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to analysis events");
    dfd_common::sse::create_event_sse_stream(&state.event_bus)
}

/// GET /events
///
/// General stream for connection status; heartbeat only.
pub async fn event_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    dfd_common::sse::create_heartbeat_sse_stream("dfd-an")
}
