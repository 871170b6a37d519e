//! Input gate
//!
//! Validates a candidate file before the workflow ever sees it: container
//! type must be on the allow-list and size must not exceed the ceiling.
//! Rejections never touch workflow state.

use crate::models::{Artifact, CandidateFile};
use dfd_common::config::DEFAULT_MAX_UPLOAD_BYTES;
use std::path::Path;
use thiserror::Error;

/// Accepted container types (canonical name, registered aliases)
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("video/mp4", &[]),
    ("video/avi", &["video/x-msvideo", "video/msvideo"]),
    ("video/mov", &["video/quicktime"]),
    ("video/mkv", &["video/x-matroska"]),
];

/// Extension → canonical type, used when neither client nor content says
const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("avi", "video/avi"),
    ("mov", "video/mov"),
    ("mkv", "video/mkv"),
];

/// Why the gate refused a candidate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("Invalid file type '{mime_type}'. Please upload MP4, AVI, MOV, or MKV files only.")]
    UnsupportedType { mime_type: String },

    #[error("File too large ({byte_size} bytes). Please upload videos smaller than {} MB.", .max_bytes / (1024 * 1024))]
    TooLarge { byte_size: u64, max_bytes: u64 },

    #[error("Cannot read '{path}': {reason}")]
    Unreadable { path: String, reason: String },
}

impl RejectionReason {
    /// Stable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            RejectionReason::TooLarge { .. } => "TOO_LARGE",
            RejectionReason::Unreadable { .. } => "UNREADABLE",
        }
    }
}

/// Map any allow-listed type or alias to its canonical name
pub fn canonical_mime(mime_type: &str) -> Option<&'static str> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(canonical, aliases)| *canonical == mime_type || aliases.contains(&mime_type.as_str()))
        .map(|(canonical, _)| *canonical)
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    EXTENSION_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Pre-condition gate in front of the workflow
#[derive(Debug, Clone)]
pub struct InputGate {
    max_bytes: u64,
}

impl Default for InputGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl InputGate {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate a candidate and produce the artifact the workflow accepts
    ///
    /// The effective type is the client's declared type, else the sniffed
    /// content type, else the type implied by the extension. Type is checked
    /// before size.
    pub fn submit(&self, candidate: CandidateFile) -> Result<Artifact, RejectionReason> {
        let effective = candidate
            .declared_mime
            .clone()
            .or_else(|| candidate.sniffed_mime.clone())
            .or_else(|| {
                candidate
                    .extension()
                    .and_then(|ext| mime_for_extension(&ext))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mime_type = canonical_mime(&effective).ok_or_else(|| {
            tracing::debug!(file = %candidate.name, mime_type = %effective, "Rejected unsupported type");
            RejectionReason::UnsupportedType {
                mime_type: effective.clone(),
            }
        })?;

        if candidate.byte_size > self.max_bytes {
            tracing::debug!(
                file = %candidate.name,
                byte_size = candidate.byte_size,
                max_bytes = self.max_bytes,
                "Rejected oversized file"
            );
            return Err(RejectionReason::TooLarge {
                byte_size: candidate.byte_size,
                max_bytes: self.max_bytes,
            });
        }

        Ok(Artifact::from_candidate(candidate, mime_type.to_string()))
    }

    /// Validate a file on disk
    pub fn submit_path(&self, path: &Path, declared_mime: Option<String>) -> Result<Artifact, RejectionReason> {
        let candidate = CandidateFile::from_path(path, declared_mime).map_err(|e| RejectionReason::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.submit(candidate)
    }
}
