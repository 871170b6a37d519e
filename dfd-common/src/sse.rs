//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for DFD services.

use crate::events::{DfdEvent, EventBus};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Heartbeat interval for every DFD SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Convert an event into an SSE frame (`event: <type>`, JSON data)
pub fn to_sse_event(event: &DfdEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Heartbeat-only SSE stream for connection status monitoring
///
/// Backs the general `/events` endpoint, which carries no domain events but
/// lets a UI show connection status.
pub fn create_heartbeat_sse_stream(
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}

/// SSE stream forwarding every EventBus event
///
/// A lagging client skips the dropped events and keeps streaming; the
/// stream ends when the bus is closed.
pub fn create_event_sse_stream(event_bus: &EventBus) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(frame) = to_sse_event(&event) {
                        debug!("SSE: Broadcasting event: {}", event.event_type());
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WorkflowPhase;
    use axum::body::Body;
    use axum::response::IntoResponse;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    async fn next_frame(body: &mut Body) -> Option<String> {
        let frame = body.frame().await?.unwrap();
        Some(String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap())
    }

    fn data_json(frame: &str) -> serde_json::Value {
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        serde_json::from_str(data).unwrap()
    }

    fn reset(run_id: Uuid) -> DfdEvent {
        DfdEvent::AnalysisReset {
            run_id,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_frame_carries_event_name_and_type_tag() {
        let bus = EventBus::new(8);
        let mut body = create_event_sse_stream(&bus).into_response().into_body();
        let run_id = Uuid::new_v4();

        bus.emit_lossy(DfdEvent::AnalysisPhaseChanged {
            run_id: Some(run_id),
            old_phase: WorkflowPhase::Idle,
            new_phase: WorkflowPhase::Uploading,
            timestamp: Utc::now(),
        });

        let frame = next_frame(&mut body).await.unwrap();
        assert!(frame.starts_with("event: AnalysisPhaseChanged\n"), "frame: {}", frame);
        let json = data_json(&frame);
        assert_eq!(json["type"], "AnalysisPhaseChanged");
        assert_eq!(json["run_id"], run_id.to_string());
    }

    #[tokio::test]
    async fn test_lagging_client_skips_dropped_events_and_ends_on_close() {
        let bus = EventBus::new(2);
        let mut body = create_event_sse_stream(&bus).into_response().into_body();

        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            bus.emit_lossy(reset(*id));
        }
        drop(bus);

        let mut frames = Vec::new();
        while let Some(frame) = next_frame(&mut body).await {
            frames.push(frame);
        }

        // Oldest three overwritten; the stream resumes with the rest, then ends
        assert_eq!(frames.len(), 2);
        assert_eq!(data_json(&frames[0])["run_id"], ids[3].to_string());
        assert_eq!(data_json(&frames[1])["run_id"], ids[4].to_string());
    }

    #[tokio::test]
    async fn test_heartbeat_stream_announces_connection() {
        let mut body = create_heartbeat_sse_stream("dfd-test").into_response().into_body();

        let frame = next_frame(&mut body).await.unwrap();
        assert!(frame.starts_with("event: ConnectionStatus\n"));
        assert!(frame.contains("data: connected"));
    }
}
