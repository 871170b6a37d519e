//! Evaluator-sequence driver
//!
//! Runs a fixed, ordered list of evaluators exactly once each, strictly one
//! after another, and reports cumulative progress `((i + 1) / N) * 100`
//! after evaluator `i` finishes. Partial verdicts are never returned: the
//! caller gets either all N verdicts or an error.
//!
//! Cancellation is cooperative. The token is checked before each pass and
//! raced against the running pass, so a cancel takes effect within one
//! pass's delay.

use crate::models::{Artifact, EvaluatorVerdict, TransitionError, PROGRESS_MAX};
use crate::services::evaluator::{Evaluator, EvaluatorError};
use async_trait::async_trait;
use dfd_common::config::FailurePolicy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Receives each verdict as soon as it is produced
#[async_trait]
pub trait EvaluationObserver: Send + Sync {
    /// Called once per evaluator, in order
    ///
    /// Returning an error stops the sequence (the run is no longer the
    /// active one).
    async fn on_verdict(
        &self,
        index: usize,
        total: usize,
        verdict: &EvaluatorVerdict,
        progress: f64,
    ) -> Result<(), TransitionError>;
}

/// Why the sequence produced no result
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("evaluation cancelled after {completed} of {total} evaluators")]
    Cancelled { completed: usize, total: usize },

    #[error("evaluation aborted: evaluator '{evaluator}' failed: {source}")]
    Aborted {
        evaluator: String,
        #[source]
        source: EvaluatorError,
    },

    #[error("verdict rejected by workflow: {0}")]
    Rejected(#[from] TransitionError),

    #[error("no evaluators configured")]
    NoEvaluators,
}

/// Sequential driver over a fixed evaluator list
pub struct EvaluationDriver {
    evaluators: Vec<Arc<dyn Evaluator>>,
    timeout: Duration,
    policy: FailurePolicy,
}

impl EvaluationDriver {
    pub fn new(evaluators: Vec<Arc<dyn Evaluator>>, timeout: Duration, policy: FailurePolicy) -> Self {
        Self {
            evaluators,
            timeout,
            policy,
        }
    }

    /// Evaluator names in evaluation order
    pub fn evaluator_names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn evaluator_count(&self) -> usize {
        self.evaluators.len()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Upper bound for a single pass
    pub fn pass_timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every evaluator once, in order
    ///
    /// # Errors
    /// - `Cancelled` if the token fires before the last verdict is published
    /// - `Aborted` if a pass fails under `FailurePolicy::Abort`
    /// - `Rejected` if the observer refuses a verdict
    pub async fn run(
        &self,
        artifact: &Artifact,
        cancel_token: &CancellationToken,
        observer: &dyn EvaluationObserver,
    ) -> Result<Vec<EvaluatorVerdict>, DriverError> {
        let total = self.evaluators.len();
        if total == 0 {
            return Err(DriverError::NoEvaluators);
        }

        let mut verdicts = Vec::with_capacity(total);

        for (index, evaluator) in self.evaluators.iter().enumerate() {
            if cancel_token.is_cancelled() {
                return Err(DriverError::Cancelled { completed: index, total });
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    tracing::debug!(evaluator = evaluator.name(), "Pass interrupted by cancellation");
                    return Err(DriverError::Cancelled { completed: index, total });
                }
                outcome = tokio::time::timeout(self.timeout, evaluator.evaluate(artifact)) => outcome,
            };

            let result = match outcome {
                Ok(result) => result.and_then(|verdict| check_verdict(evaluator.name(), verdict)),
                Err(_) => Err(EvaluatorError::TimedOut {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            let verdict = match result {
                Ok(verdict) => verdict,
                Err(error) => match self.policy {
                    FailurePolicy::Abort => {
                        tracing::warn!(
                            evaluator = evaluator.name(),
                            error = %error,
                            "Evaluator failed, aborting run"
                        );
                        return Err(DriverError::Aborted {
                            evaluator: evaluator.name().to_string(),
                            source: error,
                        });
                    }
                    FailurePolicy::Substitute => {
                        tracing::warn!(
                            evaluator = evaluator.name(),
                            error = %error,
                            "Evaluator failed, substituting no-result verdict"
                        );
                        EvaluatorVerdict::no_result(
                            evaluator.name(),
                            started.elapsed().as_secs_f64() * 1000.0,
                            &error.to_string(),
                        )
                    }
                },
            };

            let progress = ((index + 1) as f64 / total as f64) * PROGRESS_MAX;
            observer.on_verdict(index, total, &verdict, progress).await?;

            tracing::debug!(
                evaluator = evaluator.name(),
                index,
                total,
                label = %verdict.label,
                confidence = verdict.confidence_percent,
                "Evaluator verdict recorded"
            );
            verdicts.push(verdict);
        }

        Ok(verdicts)
    }
}

/// Enforce the verdict contract on evaluator output
fn check_verdict(expected_name: &str, verdict: EvaluatorVerdict) -> Result<EvaluatorVerdict, EvaluatorError> {
    if verdict.evaluator_name != expected_name {
        return Err(EvaluatorError::InvalidVerdict(format!(
            "verdict names '{}', expected '{}'",
            verdict.evaluator_name, expected_name
        )));
    }
    if !(0.0..=100.0).contains(&verdict.confidence_percent) {
        return Err(EvaluatorError::InvalidVerdict(format!(
            "confidence {} outside [0, 100]",
            verdict.confidence_percent
        )));
    }
    if !(verdict.latency_millis >= 0.0) {
        return Err(EvaluatorError::InvalidVerdict(format!(
            "negative latency {}",
            verdict.latency_millis
        )));
    }
    Ok(verdict)
}
