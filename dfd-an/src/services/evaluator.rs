//! Evaluator capability
//!
//! An evaluator is one independent analysis pass over an artifact. The
//! driver only depends on the `Evaluator` trait, so a real inference backend
//! can replace `SimulatedEvaluator` without touching the driver or the
//! aggregator.

use crate::models::{Artifact, EvaluatorVerdict, Verdict};
use async_trait::async_trait;
use dfd_common::config::AnalysisSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single evaluator pass
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluatorError {
    /// Backend could not produce a verdict
    #[error("inference failed: {0}")]
    Inference(String),

    /// Pass exceeded the configured timeout
    #[error("timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },

    /// Verdict violates the verdict contract (name, confidence range)
    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),
}

/// One analysis pass
///
/// # Example
/// ```rust,ignore
/// struct FrameModel { session: OnnxSession }
///
/// #[async_trait::async_trait]
/// impl Evaluator for FrameModel {
///     fn name(&self) -> &str { "FaceForensics++" }
///
///     async fn evaluate(&self, artifact: &Artifact) -> Result<EvaluatorVerdict, EvaluatorError> {
///         let score = self.session.score(artifact.path.as_deref()).await?;
///         Ok(EvaluatorVerdict::new(self.name(), score * 100.0, label_for(score), 0.0, ""))
///     }
/// }
/// ```
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluator name; verdicts must carry the same name
    fn name(&self) -> &str;

    /// Produce a verdict for the artifact
    ///
    /// The future is dropped when the run is cancelled, so implementations
    /// must not leave shared state half-updated across await points.
    async fn evaluate(&self, artifact: &Artifact) -> Result<EvaluatorVerdict, EvaluatorError>;
}

/// Placeholder evaluator fabricating verdicts
///
/// Waits a fixed delay, then draws confidence uniformly from
/// `[confidence_min, confidence_max)`, labels the artifact fake with
/// probability `fake_probability`, reports a latency in [500, 2500) ms and a
/// frame count in [20, 120).
pub struct SimulatedEvaluator {
    name: String,
    delay: Duration,
    fake_probability: f64,
    confidence_min: f64,
    confidence_max: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedEvaluator {
    pub fn new(name: impl Into<String>, delay: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let defaults = AnalysisSettings::default();
        Self {
            name: name.into(),
            delay,
            fake_probability: defaults.fake_probability,
            confidence_min: defaults.confidence_min,
            confidence_max: defaults.confidence_max,
            rng: Mutex::new(rng),
        }
    }

    /// Override the verdict distribution
    pub fn with_distribution(mut self, fake_probability: f64, confidence_min: f64, confidence_max: f64) -> Self {
        self.fake_probability = fake_probability.clamp(0.0, 1.0);
        self.confidence_min = confidence_min;
        self.confidence_max = confidence_max.max(confidence_min);
        self
    }

    /// Build the configured evaluator sequence
    ///
    /// With a seed, evaluator `i` is seeded with `seed + i` so runs are
    /// reproducible while evaluators still differ from each other.
    pub fn sequence_from_settings(settings: &AnalysisSettings) -> Vec<Arc<dyn Evaluator>> {
        let delay = Duration::from_millis(settings.evaluator_delay_ms);
        settings
            .evaluators
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let seed = settings.seed.map(|s| s.wrapping_add(i as u64));
                Arc::new(
                    SimulatedEvaluator::new(name.clone(), delay, seed).with_distribution(
                        settings.fake_probability,
                        settings.confidence_min,
                        settings.confidence_max,
                    ),
                ) as Arc<dyn Evaluator>
            })
            .collect()
    }

    fn draw_verdict(&self) -> Result<EvaluatorVerdict, EvaluatorError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| EvaluatorError::Inference("random source poisoned".to_string()))?;

        let confidence = if self.confidence_max > self.confidence_min {
            rng.gen_range(self.confidence_min..self.confidence_max)
        } else {
            self.confidence_min
        };
        let label = if rng.gen_bool(self.fake_probability) {
            Verdict::Fake
        } else {
            Verdict::Real
        };
        let latency = rng.gen_range(500.0..2500.0);
        let frames: u32 = rng.gen_range(20..120);

        Ok(EvaluatorVerdict::new(
            self.name.clone(),
            confidence,
            label,
            latency,
            format!("Analyzed {} frames", frames),
        ))
    }
}

#[async_trait]
impl Evaluator for SimulatedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, artifact: &Artifact) -> Result<EvaluatorVerdict, EvaluatorError> {
        tracing::trace!(evaluator = %self.name, artifact = %artifact.name, "Simulated pass started");
        tokio::time::sleep(self.delay).await;
        self.draw_verdict()
    }
}
