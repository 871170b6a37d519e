//! Media probe
//!
//! Supplies the duration and resolution of an artifact for the result
//! metadata. Size and format always come from the artifact itself.

use crate::models::{Artifact, MediaMetadata};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use thiserror::Error;

/// Resolution reported when nothing better is known
pub const DEFAULT_RESOLUTION: &str = "1920x1080";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("media probe failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, artifact: &Artifact) -> Result<MediaMetadata, ProbeError>;
}

/// Metadata with unknown duration (0 s), used when probing fails
pub fn fallback_metadata(artifact: &Artifact) -> MediaMetadata {
    MediaMetadata {
        duration_seconds: 0.0,
        byte_size: artifact.byte_size,
        format: artifact.format().to_string(),
        resolution: DEFAULT_RESOLUTION.to_string(),
    }
}

/// Probe that fabricates a duration in [10, 130) s at 1920x1080
pub struct SyntheticProbe {
    rng: Mutex<StdRng>,
}

impl SyntheticProbe {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }
}

#[async_trait]
impl MediaProbe for SyntheticProbe {
    async fn probe(&self, artifact: &Artifact) -> Result<MediaMetadata, ProbeError> {
        let duration_seconds = self
            .rng
            .lock()
            .map_err(|_| ProbeError::Failed("random source poisoned".to_string()))?
            .gen_range(10.0..130.0);

        Ok(MediaMetadata {
            duration_seconds,
            ..fallback_metadata(artifact)
        })
    }
}
