//! Verdict aggregation
//!
//! Combines the N ordered verdicts of one run into the overall decision:
//! - label: `Real` only on a strict majority of `Real` verdicts, so ties
//!   resolve to `Fake`
//! - confidence: arithmetic mean of every verdict's confidence, whatever
//!   its label

use crate::models::{AggregateResult, Artifact, EvaluatorVerdict, MediaMetadata, Verdict};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("cannot aggregate zero verdicts")]
    Empty,

    #[error("expected {expected} verdicts, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// Overall label under the strict-majority rule
pub fn majority_label(verdicts: &[EvaluatorVerdict]) -> Verdict {
    let real = verdicts.iter().filter(|v| v.label == Verdict::Real).count();
    if real * 2 > verdicts.len() {
        Verdict::Real
    } else {
        Verdict::Fake
    }
}

/// Mean confidence; None for an empty slice
pub fn mean_confidence(verdicts: &[EvaluatorVerdict]) -> Option<f64> {
    if verdicts.is_empty() {
        return None;
    }
    let sum: f64 = verdicts.iter().map(|v| v.confidence_percent).sum();
    Some(sum / verdicts.len() as f64)
}

/// Builds the immutable `AggregateResult` for a finished run
pub struct Aggregator;

impl Aggregator {
    /// Aggregate exactly `expected` verdicts
    pub fn aggregate(
        run_id: Uuid,
        artifact: &Artifact,
        verdicts: Vec<EvaluatorVerdict>,
        metadata: MediaMetadata,
        expected: usize,
    ) -> Result<AggregateResult, AggregationError> {
        if verdicts.len() != expected {
            return Err(AggregationError::CountMismatch {
                expected,
                got: verdicts.len(),
            });
        }
        let overall_confidence_percent = mean_confidence(&verdicts).ok_or(AggregationError::Empty)?;
        let overall_label = majority_label(&verdicts);

        Ok(AggregateResult {
            run_id,
            artifact: artifact.summary(),
            verdicts,
            overall_label,
            overall_confidence_percent,
            metadata,
            completed_at: Utc::now(),
        })
    }
}
