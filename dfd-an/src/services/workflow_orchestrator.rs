//! Workflow orchestrator
//!
//! Drives one run through its phases:
//! 1. Uploading: progress ticks from 0 to 100
//! 2. Evaluating: the evaluator sequence, one verdict at a time
//! 3. Aggregation: probe metadata, aggregate, enter COMPLETE
//!
//! The run executes in its own spawned task. Each suspension point races
//! the run's cancellation token; a run that has been cancelled or replaced
//! finds its events rejected as stale by the session and stops.

use crate::models::{AggregateResult, Artifact, EvaluatorVerdict, TransitionError, WorkflowPhase, PROGRESS_MAX};
use crate::services::{
    fallback_metadata, Aggregator, AnalysisSession, DriverError, EvaluationDriver, EvaluationObserver, MediaProbe,
    SimulatedEvaluator, SyntheticProbe,
};
use async_trait::async_trait;
use dfd_common::config::AnalysisSettings;
use dfd_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Arc<AggregateResult>),
    /// Cancelled by the user; state already reset
    Cancelled,
    /// Stopped by an evaluator failure under the abort policy
    Aborted { evaluator: String, reason: String },
    /// The run was no longer the active one
    Superseded,
}

/// Handle to a spawned run
pub struct RunHandle {
    pub run_id: Uuid,
    pub task: JoinHandle<RunOutcome>,
}

/// Upload tick timing
#[derive(Debug, Clone, Copy)]
pub struct UploadTiming {
    pub tick: Duration,
    pub step_percent: f64,
}

impl Default for UploadTiming {
    fn default() -> Self {
        let defaults = AnalysisSettings::default();
        Self {
            tick: Duration::from_millis(defaults.upload_tick_ms),
            step_percent: defaults.upload_step_percent,
        }
    }
}

enum Interrupt {
    Cancelled,
    Stale(TransitionError),
    Failed { evaluator: String, reason: String },
}

impl From<TransitionError> for Interrupt {
    fn from(e: TransitionError) -> Self {
        Interrupt::Stale(e)
    }
}

/// Feeds driver verdicts into the session
struct SessionObserver {
    session: Arc<AnalysisSession>,
    run_id: Uuid,
}

#[async_trait]
impl EvaluationObserver for SessionObserver {
    async fn on_verdict(
        &self,
        index: usize,
        total: usize,
        verdict: &EvaluatorVerdict,
        progress: f64,
    ) -> Result<(), TransitionError> {
        tracing::debug!(
            run_id = %self.run_id,
            evaluator = %verdict.evaluator_name,
            position = index + 1,
            total,
            progress,
            "Evaluator finished"
        );
        self.session.record_verdict(self.run_id, verdict.clone()).await
    }
}

pub struct WorkflowOrchestrator {
    session: Arc<AnalysisSession>,
    driver: Arc<EvaluationDriver>,
    probe: Arc<dyn MediaProbe>,
    upload: UploadTiming,
}

impl WorkflowOrchestrator {
    pub fn new(
        session: Arc<AnalysisSession>,
        driver: EvaluationDriver,
        probe: Arc<dyn MediaProbe>,
        upload: UploadTiming,
    ) -> Self {
        Self {
            session,
            driver: Arc::new(driver),
            probe,
            upload,
        }
    }

    /// Orchestrator with simulated evaluators and synthetic probe
    pub fn from_settings(settings: &AnalysisSettings, event_bus: EventBus) -> Self {
        let driver = EvaluationDriver::new(
            SimulatedEvaluator::sequence_from_settings(settings),
            Duration::from_millis(settings.evaluator_timeout_ms),
            settings.failure_policy,
        );
        let probe = Arc::new(SyntheticProbe::new(settings.seed));
        let upload = UploadTiming {
            tick: Duration::from_millis(settings.upload_tick_ms),
            step_percent: settings.upload_step_percent,
        };
        Self::new(Arc::new(AnalysisSession::new(event_bus)), driver, probe, upload)
    }

    pub fn session(&self) -> &Arc<AnalysisSession> {
        &self.session
    }

    pub fn evaluator_names(&self) -> Vec<String> {
        self.driver.evaluator_names()
    }

    /// Accept the artifact and spawn its run
    ///
    /// # Errors
    /// `TransitionError::RunActive` if a run is already uploading or
    /// evaluating; `InvalidTransition` while a result is displayed.
    pub async fn start_run(self: &Arc<Self>, artifact: Artifact) -> Result<RunHandle, TransitionError> {
        let ticket = self.session.begin_run(artifact, self.driver.evaluator_names()).await?;
        let run_id = ticket.run_id;

        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move {
            tracing::info!(run_id = %run_id, "Background analysis task started");
            let outcome = orchestrator
                .execute_run(run_id, ticket.artifact, ticket.cancel_token)
                .await;
            tracing::info!(run_id = %run_id, outcome = outcome_name(&outcome), "Background analysis task finished");
            outcome
        });

        Ok(RunHandle { run_id, task })
    }

    /// Run all phases of an accepted run
    pub async fn execute_run(&self, run_id: Uuid, artifact: Arc<Artifact>, token: CancellationToken) -> RunOutcome {
        match self.run_phases(run_id, &artifact, &token).await {
            Ok(result) => RunOutcome::Completed(result),
            Err(Interrupt::Cancelled) => {
                // Token may have fired without a session cancel (shutdown)
                self.session.cancel_run(run_id).await;
                RunOutcome::Cancelled
            }
            Err(Interrupt::Stale(e)) => {
                tracing::debug!(run_id = %run_id, error = %e, "Run superseded");
                RunOutcome::Superseded
            }
            Err(Interrupt::Failed { evaluator, reason }) => match self.session.abort(run_id, &evaluator, &reason).await {
                Ok(()) => RunOutcome::Aborted { evaluator, reason },
                Err(e) => {
                    tracing::debug!(run_id = %run_id, error = %e, "Abort for inactive run ignored");
                    RunOutcome::Superseded
                }
            },
        }
    }

    async fn run_phases(
        &self,
        run_id: Uuid,
        artifact: &Artifact,
        token: &CancellationToken,
    ) -> Result<Arc<AggregateResult>, Interrupt> {
        self.phase_uploading(run_id, token).await?;
        let verdicts = self.phase_evaluating(run_id, artifact, token).await?;
        self.phase_aggregating(run_id, artifact, verdicts).await
    }

    async fn phase_uploading(&self, run_id: Uuid, token: &CancellationToken) -> Result<(), Interrupt> {
        let mut percent = 0.0;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Interrupt::Cancelled),
                _ = tokio::time::sleep(self.upload.tick) => {}
            }

            percent = (percent + self.upload.step_percent).min(PROGRESS_MAX);
            let phase = self.session.record_upload_progress(run_id, percent).await?;
            if phase == WorkflowPhase::Evaluating {
                tracing::debug!(run_id = %run_id, "Upload complete");
                return Ok(());
            }
        }
    }

    async fn phase_evaluating(
        &self,
        run_id: Uuid,
        artifact: &Artifact,
        token: &CancellationToken,
    ) -> Result<Vec<EvaluatorVerdict>, Interrupt> {
        let observer = SessionObserver {
            session: Arc::clone(&self.session),
            run_id,
        };
        self.driver
            .run(artifact, token, &observer)
            .await
            .map_err(|e| match e {
                DriverError::Cancelled { .. } => Interrupt::Cancelled,
                DriverError::Rejected(e) => Interrupt::Stale(e),
                DriverError::Aborted { evaluator, source } => Interrupt::Failed {
                    evaluator,
                    reason: source.to_string(),
                },
                DriverError::NoEvaluators => Interrupt::Failed {
                    evaluator: "driver".to_string(),
                    reason: "no evaluators configured".to_string(),
                },
            })
    }

    /// Aggregation is not cancellable: all verdicts already exist. The probe
    /// gets the same time limit as an evaluator pass.
    async fn phase_aggregating(
        &self,
        run_id: Uuid,
        artifact: &Artifact,
        verdicts: Vec<EvaluatorVerdict>,
    ) -> Result<Arc<AggregateResult>, Interrupt> {
        // Cancel is refused from here on, so the probe must not hang the run
        let limit = self.driver.pass_timeout();
        let metadata = match tokio::time::timeout(limit, self.probe.probe(artifact)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                tracing::warn!(run_id = %run_id, error = %e, "Media probe failed, using fallback metadata");
                fallback_metadata(artifact)
            }
            Err(_) => {
                tracing::warn!(
                    run_id = %run_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Media probe timed out, using fallback metadata"
                );
                fallback_metadata(artifact)
            }
        };

        let expected = self.driver.evaluator_count();
        let result = Aggregator::aggregate(run_id, artifact, verdicts, metadata, expected).map_err(|e| {
            Interrupt::Failed {
                evaluator: "aggregator".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(self.session.complete(run_id, result).await?)
    }
}

fn outcome_name(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed(_) => "completed",
        RunOutcome::Cancelled => "cancelled",
        RunOutcome::Aborted { .. } => "aborted",
        RunOutcome::Superseded => "superseded",
    }
}
