//! Services for dfd-an
//!
//! Input gate, evaluator capability and driver, aggregation, media probe,
//! session state, run orchestration and report export.

pub mod aggregator;
pub mod analysis_session;
pub mod evaluation_driver;
pub mod evaluator;
pub mod input_gate;
pub mod media_probe;
pub mod report_exporter;
pub mod workflow_orchestrator;

pub use aggregator::{majority_label, mean_confidence, AggregationError, Aggregator};
pub use analysis_session::{AnalysisSession, CancelOutcome, RunTicket};
pub use evaluation_driver::{DriverError, EvaluationDriver, EvaluationObserver};
pub use evaluator::{Evaluator, EvaluatorError, SimulatedEvaluator};
pub use input_gate::{canonical_mime, InputGate, RejectionReason};
pub use media_probe::{fallback_metadata, MediaProbe, ProbeError, SyntheticProbe, DEFAULT_RESOLUTION};
pub use report_exporter::{
    report_file_name, AnalysisReport, ExportError, ExportedReport, JsonReportExporter, ReportExporter,
};
pub use workflow_orchestrator::{RunHandle, RunOutcome, UploadTiming, WorkflowOrchestrator};
