//! Analysis workflow state machine
//!
//! One run progresses through IDLE → UPLOADING → EVALUATING → COMPLETE.
//! Cancellation returns UPLOADING/EVALUATING to IDLE; COMPLETE returns to
//! IDLE through `StartNew`.
//!
//! Transitions are pure: `transition(&state, event)` returns the next state
//! or a `TransitionError`, and never touches its input. The session applies
//! the returned state under its lock.

use chrono::{DateTime, Utc};
use dfd_common::events::{AggregateResult, EvaluatorVerdict, WorkflowPhase};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::Artifact;

/// Upper bound of both progress counters
pub const PROGRESS_MAX: f64 = 100.0;

/// Upload and evaluation counters (0.0 - 100.0 each)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressSignal {
    pub upload_progress: f64,
    pub evaluation_progress: f64,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Validated artifact handed over by the input gate
    Accept {
        run_id: Uuid,
        artifact: Arc<Artifact>,
        /// Evaluator names in evaluation order, fixed for the run
        evaluators: Vec<String>,
    },
    /// New upload progress value; reaching 100 starts evaluation
    UploadProgress { run_id: Uuid, percent: f64 },
    /// Next evaluator in the sequence produced its verdict
    VerdictProduced {
        run_id: Uuid,
        verdict: EvaluatorVerdict,
    },
    /// Aggregation finished
    AllEvaluatorsDone {
        run_id: Uuid,
        result: Arc<AggregateResult>,
    },
    /// Evaluator failure under the abort policy
    Abort { run_id: Uuid, reason: String },
    Cancel,
    StartNew,
}

impl WorkflowEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Accept { .. } => "accept",
            WorkflowEvent::UploadProgress { .. } => "upload_progress",
            WorkflowEvent::VerdictProduced { .. } => "verdict_produced",
            WorkflowEvent::AllEvaluatorsDone { .. } => "all_evaluators_done",
            WorkflowEvent::Abort { .. } => "abort",
            WorkflowEvent::Cancel => "cancel",
            WorkflowEvent::StartNew => "start_new",
        }
    }

    /// Run an in-flight event belongs to (`Accept` opens a new run, so None)
    fn run_id(&self) -> Option<Uuid> {
        match self {
            WorkflowEvent::UploadProgress { run_id, .. }
            | WorkflowEvent::VerdictProduced { run_id, .. }
            | WorkflowEvent::AllEvaluatorsDone { run_id, .. }
            | WorkflowEvent::Abort { run_id, .. } => Some(*run_id),
            WorkflowEvent::Accept { .. } | WorkflowEvent::Cancel | WorkflowEvent::StartNew => None,
        }
    }
}

/// Rejected transition; the state is left untouched
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("An analysis run is already {phase}")]
    RunActive { phase: WorkflowPhase },

    #[error("Cannot apply {event} while {phase}")]
    InvalidTransition {
        event: &'static str,
        phase: WorkflowPhase,
    },

    #[error("Event for run {run_id} does not match the active run")]
    StaleRun { run_id: Uuid },

    #[error("At least one evaluator is required")]
    NoEvaluators,

    #[error("Verdict from '{got}' out of order, expected '{expected}'")]
    VerdictOutOfOrder { expected: String, got: String },

    #[error("All {expected} verdicts already recorded")]
    TooManyVerdicts { expected: usize },

    #[error("Result has {got} verdicts, run recorded {expected}")]
    IncompleteResult { expected: usize, got: usize },
}

/// Complete state of the (single) analysis workflow
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub phase: WorkflowPhase,
    pub run_id: Option<Uuid>,
    pub artifact: Option<Arc<Artifact>>,
    pub progress: ProgressSignal,
    /// Evaluator names for the active run, in order
    pub evaluators: Vec<String>,
    /// Verdicts recorded so far (partial until COMPLETE)
    pub verdicts: Vec<EvaluatorVerdict>,
    pub result: Option<Arc<AggregateResult>>,
    pub started_at: Option<DateTime<Utc>>,
    /// Reason of the last aborted run, cleared by the next accept
    pub last_error: Option<String>,
}

impl WorkflowState {
    pub fn evaluator_count(&self) -> usize {
        self.evaluators.len()
    }

    /// All verdicts exist; only aggregation is left
    ///
    /// Cancellation is no longer honoured from here on.
    pub fn is_finalizing(&self) -> bool {
        self.phase == WorkflowPhase::Evaluating
            && !self.evaluators.is_empty()
            && self.verdicts.len() == self.evaluators.len()
    }

    /// 1-based position of the evaluator currently running
    pub fn evaluator_position(&self) -> Option<usize> {
        match self.phase {
            WorkflowPhase::Evaluating if !self.evaluators.is_empty() => {
                Some((self.verdicts.len() + 1).min(self.evaluators.len()))
            }
            _ => None,
        }
    }

    /// Status line for the presentation layer
    pub fn current_operation(&self) -> String {
        match self.phase {
            WorkflowPhase::Idle => "Ready".to_string(),
            WorkflowPhase::Uploading => "Uploading video...".to_string(),
            WorkflowPhase::Evaluating => match self.evaluator_position() {
                Some(position) => format!("Analyzing with {}...", self.evaluators[position - 1]),
                None => "Analyzing...".to_string(),
            },
            WorkflowPhase::Complete => "Analysis complete".to_string(),
        }
    }

    fn check_run(&self, run_id: Uuid) -> Result<(), TransitionError> {
        if self.run_id == Some(run_id) {
            Ok(())
        } else {
            Err(TransitionError::StaleRun { run_id })
        }
    }

    fn invalid(&self, event: &WorkflowEvent) -> TransitionError {
        TransitionError::InvalidTransition {
            event: event.name(),
            phase: self.phase,
        }
    }
}

/// Clamp a progress value into [0, 100]; NaN counts as 0
fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, PROGRESS_MAX)
    }
}

/// Apply `event` to `state`
///
/// Cancel from IDLE or COMPLETE, StartNew from IDLE and Cancel once all
/// verdicts exist return the state unchanged. Progress lower than the current
/// value is ignored so both counters stay non-decreasing.
pub fn transition(
    state: &WorkflowState,
    event: WorkflowEvent,
) -> Result<WorkflowState, TransitionError> {
    use WorkflowPhase::*;

    match (state.phase, event) {
        (Idle, WorkflowEvent::Accept { run_id, artifact, evaluators }) => {
            if evaluators.is_empty() {
                return Err(TransitionError::NoEvaluators);
            }
            Ok(WorkflowState {
                phase: Uploading,
                run_id: Some(run_id),
                artifact: Some(artifact),
                progress: ProgressSignal::default(),
                evaluators,
                verdicts: Vec::new(),
                result: None,
                started_at: Some(Utc::now()),
                last_error: None,
            })
        }
        (phase @ (Uploading | Evaluating), WorkflowEvent::Accept { .. }) => {
            Err(TransitionError::RunActive { phase })
        }

        (Uploading, WorkflowEvent::UploadProgress { run_id, percent }) => {
            state.check_run(run_id)?;
            let mut next = state.clone();
            next.progress.upload_progress = clamp_progress(percent).max(state.progress.upload_progress);
            if next.progress.upload_progress >= PROGRESS_MAX {
                next.phase = Evaluating;
                next.progress.evaluation_progress = 0.0;
            }
            Ok(next)
        }

        (Evaluating, WorkflowEvent::VerdictProduced { run_id, verdict }) => {
            state.check_run(run_id)?;
            let index = state.verdicts.len();
            let total = state.evaluators.len();
            let expected = state
                .evaluators
                .get(index)
                .ok_or(TransitionError::TooManyVerdicts { expected: total })?;
            if *expected != verdict.evaluator_name {
                return Err(TransitionError::VerdictOutOfOrder {
                    expected: expected.clone(),
                    got: verdict.evaluator_name,
                });
            }
            let mut next = state.clone();
            next.verdicts.push(verdict);
            let progress = (next.verdicts.len() as f64 / total as f64) * PROGRESS_MAX;
            next.progress.evaluation_progress =
                clamp_progress(progress).max(state.progress.evaluation_progress);
            Ok(next)
        }

        (Evaluating, WorkflowEvent::AllEvaluatorsDone { run_id, result }) => {
            state.check_run(run_id)?;
            if !state.is_finalizing() {
                return Err(TransitionError::IncompleteResult {
                    expected: state.evaluators.len(),
                    got: state.verdicts.len(),
                });
            }
            if result.verdicts.len() != state.verdicts.len() {
                return Err(TransitionError::IncompleteResult {
                    expected: state.verdicts.len(),
                    got: result.verdicts.len(),
                });
            }
            let mut next = state.clone();
            next.phase = Complete;
            next.progress.evaluation_progress = PROGRESS_MAX;
            next.result = Some(result);
            Ok(next)
        }

        (Uploading | Evaluating, WorkflowEvent::Abort { run_id, reason }) => {
            state.check_run(run_id)?;
            Ok(WorkflowState {
                last_error: Some(reason),
                ..WorkflowState::default()
            })
        }

        (Uploading | Evaluating, WorkflowEvent::Cancel) => {
            if state.is_finalizing() {
                Ok(state.clone())
            } else {
                Ok(WorkflowState::default())
            }
        }
        (Idle | Complete, WorkflowEvent::Cancel) => Ok(state.clone()),

        (Complete, WorkflowEvent::StartNew) => Ok(WorkflowState::default()),
        (Idle, WorkflowEvent::StartNew) => Ok(state.clone()),

        (_, event) => {
            // Run-scoped events from a run that is no longer active are stale
            if let Some(run_id) = event.run_id() {
                state.check_run(run_id)?;
            }
            Err(state.invalid(&event))
        }
    }
}
