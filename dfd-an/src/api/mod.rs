//! HTTP API handlers for dfd-an
//!
//! REST endpoints drive the workflow; SSE pushes its state to the UI.

pub mod analysis;
pub mod health;
pub mod sse;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use sse::{analysis_event_stream, event_stream};
