//! Event types for the DFD event system
//!
//! Provides shared event definitions and the EventBus used to push workflow
//! state to presentation consumers (SSE clients, loggers, tests).

mod analysis_types;

pub use analysis_types::{
    AggregateResult, ArtifactSummary, EvaluatorVerdict, MediaMetadata, Verdict, WorkflowPhase,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// DFD event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Consumers must tolerate `AnalysisReset`/`AnalysisCancelled` (phase back to
/// idle) arriving at any point of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DfdEvent {
    /// Artifact accepted, run created
    ///
    /// Triggers:
    /// - SSE: Switch UI from upload form to progress view
    AnalysisRunStarted {
        run_id: Uuid,
        file_name: String,
        byte_size: u64,
        timestamp: DateTime<Utc>,
    },

    /// Workflow phase changed
    AnalysisPhaseChanged {
        /// Run the transition belongs to (None once reset to idle)
        run_id: Option<Uuid>,
        old_phase: WorkflowPhase,
        new_phase: WorkflowPhase,
        timestamp: DateTime<Utc>,
    },

    /// Progress tuple for the presentation layer
    ///
    /// Triggers:
    /// - SSE: Update progress bar and status line
    AnalysisProgressUpdate {
        run_id: Uuid,
        phase: WorkflowPhase,
        /// Upload progress (0.0-100.0)
        upload_progress: f64,
        /// Evaluation progress (0.0-100.0)
        evaluation_progress: f64,
        /// Human-readable status, e.g. "Analyzing with Face X-ray..."
        current_operation: String,
        /// 1-based evaluator position shown as "Model k/N"
        #[serde(default)]
        evaluator_position: Option<usize>,
        evaluator_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One evaluator pass produced its verdict
    EvaluatorVerdictRecorded {
        run_id: Uuid,
        /// 0-based position in the evaluator sequence
        index: usize,
        verdict: EvaluatorVerdict,
        timestamp: DateTime<Utc>,
    },

    /// Run finished; carries the aggregate result
    ///
    /// Triggers:
    /// - SSE: Show result view
    /// - Export: Report becomes available
    AnalysisCompleted {
        run_id: Uuid,
        result: AggregateResult,
        timestamp: DateTime<Utc>,
    },

    /// Run cancelled by the user; state reset to idle
    AnalysisCancelled {
        run_id: Uuid,
        /// Phase the run was in when cancelled
        phase: WorkflowPhase,
        /// Partial verdicts thrown away
        verdicts_discarded: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted because an evaluator pass failed
    AnalysisAborted {
        run_id: Uuid,
        evaluator_name: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Completed run cleared to start a new analysis
    AnalysisReset {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Report for a completed run handed to the exporter
    ReportExported {
        run_id: Uuid,
        file_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl DfdEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            DfdEvent::AnalysisRunStarted { .. } => "AnalysisRunStarted",
            DfdEvent::AnalysisPhaseChanged { .. } => "AnalysisPhaseChanged",
            DfdEvent::AnalysisProgressUpdate { .. } => "AnalysisProgressUpdate",
            DfdEvent::EvaluatorVerdictRecorded { .. } => "EvaluatorVerdictRecorded",
            DfdEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            DfdEvent::AnalysisCancelled { .. } => "AnalysisCancelled",
            DfdEvent::AnalysisAborted { .. } => "AnalysisAborted",
            DfdEvent::AnalysisReset { .. } => "AnalysisReset",
            DfdEvent::ReportExported { .. } => "ReportExported",
        }
    }
}

/// Broadcast channel for DfdEvent
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DfdEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use dfd_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DfdEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use dfd_common::events::{DfdEvent, EventBus};
    /// use uuid::Uuid;
    ///
    /// let event_bus = EventBus::new(16);
    ///
    /// // OK if no one is listening
    /// event_bus.emit_lossy(DfdEvent::AnalysisReset {
    ///     run_id: Uuid::new_v4(),
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: DfdEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
