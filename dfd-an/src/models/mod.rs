//! Data models for dfd-an (analysis service)
//!
//! - Artifact: validated input handed over by the input gate
//! - WorkflowState: the single analysis run and its transitions

pub mod artifact;
pub mod workflow;

pub use artifact::{extension_of, Artifact, CandidateFile, FALLBACK_FORMAT};
pub use workflow::{
    transition, ProgressSignal, TransitionError, WorkflowEvent, WorkflowState, PROGRESS_MAX,
};

// Value types shared with the event stream
pub use dfd_common::events::{
    AggregateResult, ArtifactSummary, EvaluatorVerdict, MediaMetadata, Verdict, WorkflowPhase,
};
