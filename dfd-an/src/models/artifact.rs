//! Submitted video artifact
//!
//! A `CandidateFile` is what a client hands in; the input gate turns it into
//! an immutable `Artifact` or rejects it.

use chrono::{DateTime, Utc};
use dfd_common::events::ArtifactSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Format reported when the file name carries no extension
///
/// A name without a dot reports this rather than echoing the whole name
/// back as its format.
pub const FALLBACK_FORMAT: &str = "mp4";

/// File offered for analysis, not yet validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub byte_size: u64,
    /// MIME type claimed by the client
    pub declared_mime: Option<String>,
    /// MIME type detected from the file's leading bytes
    pub sniffed_mime: Option<String>,
    pub path: Option<PathBuf>,
}

impl CandidateFile {
    /// Candidate without backing file (type comes from `declared_mime` or the name)
    pub fn new(name: impl Into<String>, byte_size: u64, declared_mime: Option<String>) -> Self {
        Self {
            name: name.into(),
            byte_size,
            declared_mime,
            sniffed_mime: None,
            path: None,
        }
    }

    /// Build a candidate from a file on disk
    ///
    /// Size comes from filesystem metadata; the content type is sniffed from
    /// the file header when the format is recognised.
    ///
    /// # Errors
    /// Returns the I/O error if the path is missing, unreadable or not a file.
    pub fn from_path(path: &Path, declared_mime: Option<String>) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let sniffed_mime = infer::get_from_path(path)?.map(|kind| kind.mime_type().to_string());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            byte_size: metadata.len(),
            declared_mime: declared_mime.filter(|m| !m.trim().is_empty()),
            sniffed_mime,
            path: Some(path.to_path_buf()),
        })
    }

    /// Lowercased extension after the last '.', if any
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }
}

/// Lowercased extension after the last '.' of a file name
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Accepted input, owned by exactly one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: Uuid,
    pub name: String,
    pub byte_size: u64,
    pub declared_extension: Option<String>,
    /// Allow-listed container type the gate accepted
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub accepted_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn from_candidate(candidate: CandidateFile, mime_type: String) -> Self {
        let declared_extension = candidate.extension();
        Self {
            artifact_id: Uuid::new_v4(),
            name: candidate.name,
            byte_size: candidate.byte_size,
            declared_extension,
            mime_type,
            path: candidate.path,
            accepted_at: Utc::now(),
        }
    }

    /// Container format for result metadata
    pub fn format(&self) -> &str {
        self.declared_extension.as_deref().unwrap_or(FALLBACK_FORMAT)
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            artifact_id: self.artifact_id,
            name: self.name.clone(),
            byte_size: self.byte_size,
            declared_extension: self.declared_extension.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}
