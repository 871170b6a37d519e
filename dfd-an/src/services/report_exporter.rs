//! Report export
//!
//! Turns a completed run's `AggregateResult` into the downloadable analysis
//! report and persists it.

use crate::models::AggregateResult;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Overall verdict block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallResult {
    pub prediction: String,
    /// Confidence with one decimal, e.g. "82.4"
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub duration: f64,
    pub size: u64,
    pub format: String,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResult {
    pub model: String,
    pub confidence: f64,
    pub prediction: String,
    pub processing_time: f64,
    pub details: String,
}

/// Analysis report document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub filename: String,
    /// RFC 3339 with millisecond precision
    pub timestamp: String,
    pub overall_result: OverallResult,
    pub metadata: ReportMetadata,
    pub model_results: Vec<ModelResult>,
}

impl AnalysisReport {
    pub fn from_result(result: &AggregateResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            filename: result.artifact.name.clone(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            overall_result: OverallResult {
                prediction: result.overall_label.to_string(),
                confidence: format!("{:.1}", result.overall_confidence_percent),
            },
            metadata: ReportMetadata {
                duration: result.metadata.duration_seconds,
                size: result.metadata.byte_size,
                format: result.metadata.format.clone(),
                resolution: result.metadata.resolution.clone(),
            },
            model_results: result
                .verdicts
                .iter()
                .map(|v| ModelResult {
                    model: v.evaluator_name.clone(),
                    confidence: v.confidence_percent,
                    prediction: v.label.to_string(),
                    processing_time: v.latency_millis,
                    details: v.detail.clone(),
                })
                .collect(),
        }
    }
}

/// `deepfake-analysis-<unix millis>.json`
pub fn report_file_name(timestamp: DateTime<Utc>) -> String {
    format!("deepfake-analysis-{}.json", timestamp.timestamp_millis())
}

/// A report that has been handed to an exporter
#[derive(Debug, Clone)]
pub struct ExportedReport {
    pub file_name: String,
    pub path: Option<PathBuf>,
    pub report: AnalysisReport,
}

#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export(&self, result: &AggregateResult, timestamp: DateTime<Utc>) -> Result<ExportedReport, ExportError>;
}

/// Writes pretty-printed JSON reports into one directory
pub struct JsonReportExporter {
    output_dir: PathBuf,
}

impl JsonReportExporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }
}

#[async_trait]
impl ReportExporter for JsonReportExporter {
    async fn export(&self, result: &AggregateResult, timestamp: DateTime<Utc>) -> Result<ExportedReport, ExportError> {
        let report = AnalysisReport::from_result(result, timestamp);
        let json = serde_json::to_string_pretty(&report)?;
        let file_name = report_file_name(timestamp);
        let path = self.output_dir.join(&file_name);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.output_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(run_id = %result.run_id, path = %path.display(), "Analysis report written");

        Ok(ExportedReport {
            file_name,
            path: Some(path),
            report,
        })
    }
}
