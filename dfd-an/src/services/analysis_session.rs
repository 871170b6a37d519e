//! Analysis session
//!
//! Owns the single `WorkflowState` and applies every transition under one
//! lock, emitting the matching `DfdEvent`s while the lock is held so event
//! order always equals transition order. Holding the lock across "append
//! last verdict" and "check cancel" is what makes the cancellation race
//! deterministic: once all verdicts exist a cancel is refused.

use crate::models::{
    transition, AggregateResult, Artifact, EvaluatorVerdict, TransitionError, WorkflowEvent, WorkflowPhase,
    WorkflowState,
};
use chrono::Utc;
use dfd_common::events::{DfdEvent, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of a cancel request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Nothing to cancel (idle or complete)
    NoActiveRun { phase: WorkflowPhase },
    /// Run stopped and state reset to idle
    Cancelled {
        run_id: Uuid,
        phase: WorkflowPhase,
        verdicts_discarded: usize,
    },
    /// All verdicts already recorded; the run will complete
    Finalizing { run_id: Uuid },
}

/// Identity of a freshly accepted run
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: Uuid,
    pub artifact: Arc<Artifact>,
    /// Token the run's task must observe
    pub cancel_token: CancellationToken,
}

struct SessionInner {
    state: WorkflowState,
    /// Token of the active run's background task
    cancel_token: Option<CancellationToken>,
}

pub struct AnalysisSession {
    inner: Mutex<SessionInner>,
    event_bus: EventBus,
}

impl AnalysisSession {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: WorkflowState::default(),
                cancel_token: None,
            }),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> WorkflowState {
        self.inner.lock().await.state.clone()
    }

    pub async fn phase(&self) -> WorkflowPhase {
        self.inner.lock().await.state.phase
    }

    /// Stored result, present only while COMPLETE
    pub async fn result(&self) -> Option<Arc<AggregateResult>> {
        self.inner.lock().await.state.result.clone()
    }

    /// Accept an artifact and open a new run
    pub async fn begin_run(&self, artifact: Artifact, evaluators: Vec<String>) -> Result<RunTicket, TransitionError> {
        let mut inner = self.inner.lock().await;
        let run_id = Uuid::new_v4();
        let artifact = Arc::new(artifact);

        let next = transition(
            &inner.state,
            WorkflowEvent::Accept {
                run_id,
                artifact: Arc::clone(&artifact),
                evaluators,
            },
        )?;
        let old_phase = inner.state.phase;
        inner.state = next;
        let token = CancellationToken::new();
        inner.cancel_token = Some(token.clone());

        tracing::info!(
            run_id = %run_id,
            file = %artifact.name,
            byte_size = artifact.byte_size,
            "Analysis run started"
        );

        self.event_bus.emit_lossy(DfdEvent::AnalysisRunStarted {
            run_id,
            file_name: artifact.name.clone(),
            byte_size: artifact.byte_size,
            timestamp: Utc::now(),
        });
        self.emit_phase_change(&inner.state, old_phase);
        self.emit_progress(&inner.state);

        Ok(RunTicket {
            run_id,
            artifact,
            cancel_token: token,
        })
    }

    /// Apply an upload progress value; returns the phase afterwards
    pub async fn record_upload_progress(&self, run_id: Uuid, percent: f64) -> Result<WorkflowPhase, TransitionError> {
        let mut inner = self.inner.lock().await;
        let next = transition(&inner.state, WorkflowEvent::UploadProgress { run_id, percent })?;
        let old_phase = inner.state.phase;
        inner.state = next;

        self.emit_phase_change(&inner.state, old_phase);
        self.emit_progress(&inner.state);
        Ok(inner.state.phase)
    }

    /// Append the next verdict of the active run
    pub async fn record_verdict(&self, run_id: Uuid, verdict: EvaluatorVerdict) -> Result<(), TransitionError> {
        let mut inner = self.inner.lock().await;
        let index = inner.state.verdicts.len();
        let next = transition(
            &inner.state,
            WorkflowEvent::VerdictProduced {
                run_id,
                verdict: verdict.clone(),
            },
        )?;
        inner.state = next;

        self.event_bus.emit_lossy(DfdEvent::EvaluatorVerdictRecorded {
            run_id,
            index,
            verdict,
            timestamp: Utc::now(),
        });
        self.emit_progress(&inner.state);
        Ok(())
    }

    /// Store the aggregate result and enter COMPLETE
    pub async fn complete(&self, run_id: Uuid, result: AggregateResult) -> Result<Arc<AggregateResult>, TransitionError> {
        let mut inner = self.inner.lock().await;
        let result = Arc::new(result);
        let next = transition(
            &inner.state,
            WorkflowEvent::AllEvaluatorsDone {
                run_id,
                result: Arc::clone(&result),
            },
        )?;
        let old_phase = inner.state.phase;
        inner.state = next;
        inner.cancel_token = None;

        tracing::info!(
            run_id = %run_id,
            overall = %result.overall_label,
            confidence = result.overall_confidence_percent,
            "Analysis run complete"
        );

        self.emit_phase_change(&inner.state, old_phase);
        self.emit_progress(&inner.state);
        self.event_bus.emit_lossy(DfdEvent::AnalysisCompleted {
            run_id,
            result: (*result).clone(),
            timestamp: Utc::now(),
        });
        Ok(result)
    }

    /// Stop the run after a failure and return to IDLE
    pub async fn abort(&self, run_id: Uuid, evaluator_name: &str, reason: &str) -> Result<(), TransitionError> {
        let mut inner = self.inner.lock().await;
        let next = transition(
            &inner.state,
            WorkflowEvent::Abort {
                run_id,
                reason: format!("{}: {}", evaluator_name, reason),
            },
        )?;
        let old_phase = inner.state.phase;
        inner.state = next;
        if let Some(token) = inner.cancel_token.take() {
            token.cancel();
        }

        tracing::warn!(run_id = %run_id, evaluator = evaluator_name, reason, "Analysis run aborted");

        self.event_bus.emit_lossy(DfdEvent::AnalysisAborted {
            run_id,
            evaluator_name: evaluator_name.to_string(),
            error_message: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.emit_phase_change_for(Some(run_id), old_phase, inner.state.phase);
        Ok(())
    }

    /// Cancel whatever run is active
    pub async fn cancel(&self) -> CancelOutcome {
        let mut inner = self.inner.lock().await;
        self.cancel_locked(&mut inner, None)
    }

    /// Cancel only if `run_id` is still the active run
    pub async fn cancel_run(&self, run_id: Uuid) -> CancelOutcome {
        let mut inner = self.inner.lock().await;
        self.cancel_locked(&mut inner, Some(run_id))
    }

    fn cancel_locked(&self, inner: &mut SessionInner, only: Option<Uuid>) -> CancelOutcome {
        let state = &inner.state;
        let run_id = match state.run_id {
            Some(run_id) if state.phase.is_active() && only.map_or(true, |id| id == run_id) => run_id,
            _ => return CancelOutcome::NoActiveRun { phase: state.phase },
        };

        if state.is_finalizing() {
            tracing::info!(run_id = %run_id, "Cancel ignored, all verdicts recorded");
            return CancelOutcome::Finalizing { run_id };
        }

        let old_phase = state.phase;
        let verdicts_discarded = state.verdicts.len();
        // Cancel is total from UPLOADING/EVALUATING
        inner.state = match transition(state, WorkflowEvent::Cancel) {
            Ok(next) => next,
            Err(_) => WorkflowState::default(),
        };
        if let Some(token) = inner.cancel_token.take() {
            token.cancel();
        }

        tracing::info!(
            run_id = %run_id,
            phase = %old_phase,
            verdicts_discarded,
            "Analysis run cancelled"
        );

        self.event_bus.emit_lossy(DfdEvent::AnalysisCancelled {
            run_id,
            phase: old_phase,
            verdicts_discarded,
            timestamp: Utc::now(),
        });
        self.emit_phase_change_for(Some(run_id), old_phase, inner.state.phase);

        CancelOutcome::Cancelled {
            run_id,
            phase: old_phase,
            verdicts_discarded,
        }
    }

    /// Clear a completed run; returns the cleared run id (None when idle)
    pub async fn start_new(&self) -> Result<Option<Uuid>, TransitionError> {
        let mut inner = self.inner.lock().await;
        let cleared = inner.state.run_id;
        let old_phase = inner.state.phase;
        let next = transition(&inner.state, WorkflowEvent::StartNew)?;
        inner.state = next;

        if old_phase != WorkflowPhase::Complete {
            return Ok(None);
        }

        if let Some(run_id) = cleared {
            tracing::info!(run_id = %run_id, "Completed run cleared");
            self.event_bus.emit_lossy(DfdEvent::AnalysisReset {
                run_id,
                timestamp: Utc::now(),
            });
        }
        self.emit_phase_change_for(cleared, old_phase, inner.state.phase);
        Ok(cleared)
    }

    fn emit_phase_change(&self, state: &WorkflowState, old_phase: WorkflowPhase) {
        self.emit_phase_change_for(state.run_id, old_phase, state.phase);
    }

    fn emit_phase_change_for(&self, run_id: Option<Uuid>, old_phase: WorkflowPhase, new_phase: WorkflowPhase) {
        if old_phase == new_phase {
            return;
        }
        tracing::debug!(run_id = ?run_id, old = %old_phase, new = %new_phase, "Phase changed");
        self.event_bus.emit_lossy(DfdEvent::AnalysisPhaseChanged {
            run_id,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }

    fn emit_progress(&self, state: &WorkflowState) {
        let Some(run_id) = state.run_id else {
            return;
        };
        self.event_bus.emit_lossy(DfdEvent::AnalysisProgressUpdate {
            run_id,
            phase: state.phase,
            upload_progress: state.progress.upload_progress,
            evaluation_progress: state.progress.evaluation_progress,
            current_operation: state.current_operation(),
            evaluator_position: state.evaluator_position(),
            evaluator_count: state.evaluator_count(),
            timestamp: Utc::now(),
        });
    }
}
