//! Workflow orchestrator tests
//!
//! Full runs on a paused tokio clock: the reference scenario, cancellation
//! in each phase, the cancellation race and both failure policies.

use async_trait::async_trait;
use dfd_an::models::{Artifact, CandidateFile, EvaluatorVerdict, MediaMetadata, Verdict, WorkflowPhase};
use dfd_an::services::{
    fallback_metadata, mean_confidence, majority_label, AnalysisSession, CancelOutcome, EvaluationDriver, Evaluator,
    EvaluatorError, InputGate, MediaProbe, ProbeError, RunOutcome, SimulatedEvaluator, SyntheticProbe, UploadTiming,
    WorkflowOrchestrator,
};
use dfd_common::config::{AnalysisSettings, FailurePolicy, DEFAULT_EVALUATORS};
use dfd_common::events::{DfdEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn clip() -> Artifact {
    InputGate::default()
        .submit(CandidateFile::new("clip.mp4", 52_428_800, Some("video/mp4".to_string())))
        .unwrap()
}

fn seeded_settings() -> AnalysisSettings {
    AnalysisSettings {
        seed: Some(2024),
        ..Default::default()
    }
}

fn drain(rx: &mut broadcast::Receiver<DfdEvent>) -> Vec<DfdEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Evaluator that always fails
struct Broken {
    name: String,
}

#[async_trait]
impl Evaluator for Broken {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _artifact: &Artifact) -> Result<EvaluatorVerdict, EvaluatorError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Err(EvaluatorError::Inference("weights not loaded".to_string()))
    }
}

/// Probe that takes a long time, to widen the finalizing window
struct SlowProbe;

#[async_trait]
impl MediaProbe for SlowProbe {
    async fn probe(&self, artifact: &Artifact) -> Result<MediaMetadata, ProbeError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(fallback_metadata(artifact))
    }
}

/// Probe that never answers
struct HungProbe;

#[async_trait]
impl MediaProbe for HungProbe {
    async fn probe(&self, _artifact: &Artifact) -> Result<MediaMetadata, ProbeError> {
        std::future::pending().await
    }
}

fn sequence_with_broken(index: usize) -> Vec<Arc<dyn Evaluator>> {
    let mut sequence = SimulatedEvaluator::sequence_from_settings(&seeded_settings());
    sequence[index] = Arc::new(Broken {
        name: DEFAULT_EVALUATORS[index].to_string(),
    });
    sequence
}

fn orchestrator_with(
    evaluators: Vec<Arc<dyn Evaluator>>,
    policy: FailurePolicy,
    probe: Arc<dyn MediaProbe>,
    event_bus: EventBus,
) -> Arc<WorkflowOrchestrator> {
    let driver = EvaluationDriver::new(evaluators, Duration::from_secs(10), policy);
    Arc::new(WorkflowOrchestrator::new(
        Arc::new(AnalysisSession::new(event_bus)),
        driver,
        probe,
        UploadTiming::default(),
    ))
}

/// clip.mp4 (50 MiB): upload 0 → 100, five ordered verdicts, COMPLETE
#[tokio::test(start_paused = true)]
async fn test_reference_scenario_completes() {
    let event_bus = EventBus::new(256);
    let mut rx = event_bus.subscribe();
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&seeded_settings(), event_bus));

    let handle = orchestrator.start_run(clip()).await.unwrap();
    assert_eq!(orchestrator.session().phase().await, WorkflowPhase::Uploading);

    let outcome = handle.task.await.unwrap();
    let result = match outcome {
        RunOutcome::Completed(result) => result,
        other => panic!("unexpected outcome: {:?}", other),
    };

    assert_eq!(result.run_id, handle.run_id);
    assert_eq!(result.verdicts.len(), 5);
    let names: Vec<&str> = result.verdicts.iter().map(|v| v.evaluator_name.as_str()).collect();
    assert_eq!(names, DEFAULT_EVALUATORS.to_vec());
    assert_eq!(Some(result.overall_confidence_percent), mean_confidence(&result.verdicts));
    assert_eq!(result.overall_label, majority_label(&result.verdicts));
    assert_eq!(result.metadata.byte_size, 52_428_800);
    assert_eq!(result.metadata.format, "mp4");
    assert_eq!(result.metadata.resolution, "1920x1080");
    assert!((10.0..130.0).contains(&result.metadata.duration_seconds));
    for verdict in &result.verdicts {
        assert!((60.0..100.0).contains(&verdict.confidence_percent));
    }

    let state = orchestrator.session().snapshot().await;
    assert_eq!(state.phase, WorkflowPhase::Complete);
    assert_eq!(state.progress.upload_progress, 100.0);
    assert_eq!(state.progress.evaluation_progress, 100.0);

    let events = drain(&mut rx);
    let mut upload = Vec::new();
    let mut evaluation = Vec::new();
    let mut phases = Vec::new();
    for event in &events {
        match event {
            DfdEvent::AnalysisProgressUpdate {
                phase,
                upload_progress,
                evaluation_progress,
                ..
            } => {
                if *phase == WorkflowPhase::Uploading {
                    upload.push(*upload_progress);
                }
                if *phase == WorkflowPhase::Evaluating {
                    evaluation.push(*evaluation_progress);
                }
            }
            DfdEvent::AnalysisPhaseChanged { new_phase, .. } => phases.push(*new_phase),
            _ => {}
        }
    }

    assert_eq!(upload.first(), Some(&0.0));
    assert!(upload.windows(2).all(|w| w[0] <= w[1]));
    assert!(evaluation.windows(2).all(|w| w[0] <= w[1]));
    for expected in [20.0, 40.0, 60.0, 80.0, 100.0] {
        assert!(evaluation.contains(&expected), "missing evaluation progress {}", expected);
    }
    assert_eq!(
        phases,
        vec![WorkflowPhase::Uploading, WorkflowPhase::Evaluating, WorkflowPhase::Complete]
    );
    assert!(matches!(events.last(), Some(DfdEvent::AnalysisCompleted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_upload() {
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&seeded_settings(), EventBus::new(256)));
    let handle = orchestrator.start_run(clip()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(900)).await;
    let outcome = orchestrator.session().cancel().await;
    assert!(matches!(
        outcome,
        CancelOutcome::Cancelled {
            phase: WorkflowPhase::Uploading,
            verdicts_discarded: 0,
            ..
        }
    ));

    assert_eq!(handle.task.await.unwrap(), RunOutcome::Cancelled);
    let state = orchestrator.session().snapshot().await;
    assert_eq!(state.phase, WorkflowPhase::Idle);
    assert_eq!(state.progress.upload_progress, 0.0);
    assert!(state.artifact.is_none());
}

/// Upload takes 2 s and each evaluator 1 s: at 3.5 s one verdict exists
#[tokio::test(start_paused = true)]
async fn test_cancel_during_evaluation_discards_partial_verdicts() {
    let event_bus = EventBus::new(256);
    let mut rx = event_bus.subscribe();
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&seeded_settings(), event_bus));
    let handle = orchestrator.start_run(clip()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let outcome = orchestrator.session().cancel().await;
    assert_eq!(
        outcome,
        CancelOutcome::Cancelled {
            run_id: handle.run_id,
            phase: WorkflowPhase::Evaluating,
            verdicts_discarded: 1
        }
    );

    assert_eq!(handle.task.await.unwrap(), RunOutcome::Cancelled);

    let state = orchestrator.session().snapshot().await;
    assert_eq!(state.phase, WorkflowPhase::Idle);
    assert!(state.verdicts.is_empty());
    assert_eq!(state.progress.evaluation_progress, 0.0);
    assert!(orchestrator.session().result().await.is_none());

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, DfdEvent::AnalysisCompleted { .. })));
    assert!(events.iter().any(|e| matches!(e, DfdEvent::AnalysisCancelled { .. })));
}

/// Cancel arriving after the last verdict is refused; the run completes
#[tokio::test(start_paused = true)]
async fn test_cancel_while_finalizing_is_ignored() {
    let evaluators = SimulatedEvaluator::sequence_from_settings(&seeded_settings());
    let orchestrator = orchestrator_with(evaluators, FailurePolicy::Abort, Arc::new(SlowProbe), EventBus::new(256));
    let handle = orchestrator.start_run(clip()).await.unwrap();

    // Last verdict at 7 s, probe finishes at 12 s
    tokio::time::sleep(Duration::from_millis(8500)).await;
    assert_eq!(
        orchestrator.session().cancel().await,
        CancelOutcome::Finalizing { run_id: handle.run_id }
    );

    match handle.task.await.unwrap() {
        RunOutcome::Completed(result) => assert_eq!(result.verdicts.len(), 5),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(orchestrator.session().phase().await, WorkflowPhase::Complete);
}

/// A probe that never returns falls back to default metadata after the pass timeout
#[tokio::test(start_paused = true)]
async fn test_hung_probe_times_out_to_fallback_metadata() {
    let evaluators = SimulatedEvaluator::sequence_from_settings(&seeded_settings());
    let orchestrator = orchestrator_with(evaluators, FailurePolicy::Abort, Arc::new(HungProbe), EventBus::new(256));
    let handle = orchestrator.start_run(clip()).await.unwrap();

    let result = match tokio::time::timeout(Duration::from_secs(3600), handle.task).await {
        Ok(Ok(RunOutcome::Completed(result))) => result,
        other => panic!("run did not complete: {:?}", other),
    };
    assert_eq!(result.verdicts.len(), 5);
    assert_eq!(result.metadata.duration_seconds, 0.0);
    assert_eq!(result.metadata.resolution, "1920x1080");
    assert_eq!(result.metadata.byte_size, 52_428_800);

    // The session is free again
    assert_eq!(orchestrator.session().phase().await, WorkflowPhase::Complete);
    assert_eq!(orchestrator.session().start_new().await.unwrap(), Some(handle.run_id));
    assert!(orchestrator.start_run(clip()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_abort_policy_returns_to_idle() {
    let event_bus = EventBus::new(256);
    let mut rx = event_bus.subscribe();
    let orchestrator = orchestrator_with(
        sequence_with_broken(2),
        FailurePolicy::Abort,
        Arc::new(SyntheticProbe::new(Some(1))),
        event_bus,
    );
    let handle = orchestrator.start_run(clip()).await.unwrap();

    match handle.task.await.unwrap() {
        RunOutcome::Aborted { evaluator, reason } => {
            assert_eq!(evaluator, "DeepFakes Detection");
            assert!(reason.contains("weights not loaded"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let state = orchestrator.session().snapshot().await;
    assert_eq!(state.phase, WorkflowPhase::Idle);
    assert!(state.verdicts.is_empty());
    assert!(state.last_error.unwrap().starts_with("DeepFakes Detection"));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        DfdEvent::AnalysisAborted { evaluator_name, .. } if evaluator_name == "DeepFakes Detection"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_substitute_policy_completes_with_sentinel() {
    let orchestrator = orchestrator_with(
        sequence_with_broken(4),
        FailurePolicy::Substitute,
        Arc::new(SyntheticProbe::new(Some(1))),
        EventBus::new(256),
    );
    let handle = orchestrator.start_run(clip()).await.unwrap();

    let result = match handle.task.await.unwrap() {
        RunOutcome::Completed(result) => result,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(result.verdicts.len(), 5);
    let sentinel = &result.verdicts[4];
    assert!(sentinel.failed);
    assert_eq!(sentinel.evaluator_name, "CNNDetection");
    assert_eq!(sentinel.confidence_percent, 0.0);
    assert_eq!(sentinel.label, Verdict::Fake);
    assert_eq!(Some(result.overall_confidence_percent), mean_confidence(&result.verdicts));
}

#[tokio::test(start_paused = true)]
async fn test_second_submission_rejected_while_active() {
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&seeded_settings(), EventBus::new(256)));
    let first = orchestrator.start_run(clip()).await.unwrap();

    let err = orchestrator.start_run(clip()).await.err().unwrap();
    assert_eq!(
        err,
        dfd_an::models::TransitionError::RunActive {
            phase: WorkflowPhase::Uploading
        }
    );

    // The first run is unaffected
    assert!(matches!(first.task.await.unwrap(), RunOutcome::Completed(_)));
}

/// A new run started right after a cancel is not disturbed by the old task
#[tokio::test(start_paused = true)]
async fn test_restart_after_cancel() {
    let orchestrator = Arc::new(WorkflowOrchestrator::from_settings(&seeded_settings(), EventBus::new(256)));
    let first = orchestrator.start_run(clip()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    orchestrator.session().cancel().await;
    let second = orchestrator.start_run(clip()).await.unwrap();
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(first.task.await.unwrap(), RunOutcome::Cancelled);
    match second.task.await.unwrap() {
        RunOutcome::Completed(result) => assert_eq!(result.run_id, second.run_id),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Start over from COMPLETE
    assert_eq!(orchestrator.session().start_new().await.unwrap(), Some(second.run_id));
    assert_eq!(orchestrator.session().phase().await, WorkflowPhase::Idle);
}
