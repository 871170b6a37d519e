//! Analysis workflow value types
//!
//! Shared between dfd-an (which produces them) and anything consuming the
//! event stream or the HTTP API (which renders them).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stage of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    /// No run active, ready to accept an artifact
    #[default]
    Idle,
    /// Artifact accepted, upload progress 0 → 100
    Uploading,
    /// Evaluator passes running
    Evaluating,
    /// Aggregate result available
    Complete,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Uploading => "uploading",
            WorkflowPhase::Evaluating => "evaluating",
            WorkflowPhase::Complete => "complete",
        }
    }

    /// A run is in flight (a new submission would be rejected)
    pub fn is_active(&self) -> bool {
        matches!(self, WorkflowPhase::Uploading | WorkflowPhase::Evaluating)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary authenticity outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Real,
    Fake,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Real => "real",
            Verdict::Fake => "fake",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one evaluator pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorVerdict {
    /// Evaluator that produced this verdict
    pub evaluator_name: String,
    /// Confidence (0.0 - 100.0)
    pub confidence_percent: f64,
    pub label: Verdict,
    /// Processing time reported by the evaluator
    pub latency_millis: f64,
    /// Free-text explanation, not authoritative
    pub detail: String,
    /// Sentinel written in place of a failed pass
    #[serde(default)]
    pub failed: bool,
}

impl EvaluatorVerdict {
    pub fn new(
        evaluator_name: impl Into<String>,
        confidence_percent: f64,
        label: Verdict,
        latency_millis: f64,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            evaluator_name: evaluator_name.into(),
            confidence_percent: confidence_percent.clamp(0.0, 100.0),
            label,
            latency_millis: latency_millis.max(0.0),
            detail: detail.into(),
            failed: false,
        }
    }

    /// "No result" verdict: zero confidence, labelled fake
    pub fn no_result(evaluator_name: impl Into<String>, latency_millis: f64, reason: &str) -> Self {
        Self {
            evaluator_name: evaluator_name.into(),
            confidence_percent: 0.0,
            label: Verdict::Fake,
            latency_millis: latency_millis.max(0.0),
            detail: format!("No result: {}", reason),
            failed: true,
        }
    }
}

/// Media facts attached to an aggregate result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_seconds: f64,
    pub byte_size: u64,
    /// Container format, derived from the file extension
    pub format: String,
    /// "WIDTHxHEIGHT"
    pub resolution: String,
}

/// Descriptive snapshot of the accepted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact_id: Uuid,
    pub name: String,
    pub byte_size: u64,
    pub declared_extension: Option<String>,
    pub mime_type: String,
}

/// Terminal result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub run_id: Uuid,
    pub artifact: ArtifactSummary,
    /// One verdict per evaluator, in evaluation order
    pub verdicts: Vec<EvaluatorVerdict>,
    pub overall_label: Verdict,
    pub overall_confidence_percent: f64,
    pub metadata: MediaMetadata,
    pub completed_at: DateTime<Utc>,
}
