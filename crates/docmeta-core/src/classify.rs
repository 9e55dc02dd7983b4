//! Decides what an extraction failure means for the worker.

use crate::config::StageConfig;
use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close the sinks and abort the worker.
    Fatal,
    /// Emit empty metadata plus a fault, then carry on.
    DemoteToFault,
    /// Metadata is already out; add a fault describing the record.
    Annotate,
}

/// The dispositions a failed extraction can have. Failures are never
/// annotated: no metadata exists yet to annotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Fatal,
    DemoteToFault,
}

impl From<FailureDisposition> for Disposition {
    fn from(disposition: FailureDisposition) -> Self {
        match disposition {
            FailureDisposition::Fatal => Disposition::Fatal,
            FailureDisposition::DemoteToFault => Disposition::DemoteToFault,
        }
    }
}

/// Which exception families are promoted from demotion to abort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalityPolicy {
    pub analysis_exception_critical: bool,
    pub other_exception_critical: bool,
}

impl From<&StageConfig> for CriticalityPolicy {
    fn from(config: &StageConfig) -> Self {
        Self {
            analysis_exception_critical: config.analysis_exception_critical(),
            other_exception_critical: config.other_exception_critical(),
        }
    }
}

/// Classify an error raised while extracting one record.
///
/// Schema-shape errors (transformation and document-tree errors) are always
/// fatal. Analyzer errors and everything else are demoted unless the policy
/// marks their family critical.
pub fn classify(error: &ExtractionError, policy: CriticalityPolicy) -> FailureDisposition {
    match error {
        ExtractionError::Transformation(_) | ExtractionError::DocumentTree(_) => {
            FailureDisposition::Fatal
        }
        ExtractionError::Analysis(_) if policy.analysis_exception_critical => {
            FailureDisposition::Fatal
        }
        ExtractionError::Analysis(_) => FailureDisposition::DemoteToFault,
        ExtractionError::Other { .. } if policy.other_exception_critical => FailureDisposition::Fatal,
        ExtractionError::Other { .. } => FailureDisposition::DemoteToFault,
    }
}

/// `Annotate` when a successful extraction took longer than the threshold.
pub fn classify_processing_time(processing_ms: u64, threshold_ms: Option<u64>) -> Option<Disposition> {
    threshold_ms
        .is_some_and(|limit| processing_ms > limit)
        .then_some(Disposition::Annotate)
}

/// Operator-facing log message for a demoted error.
pub fn demotion_message(error: &ExtractionError) -> &'static str {
    match error {
        ExtractionError::Analysis(e) if e.is_invalid_pdf() => "Invalid PDF file",
        ExtractionError::Analysis(_) => "got unexpected analysis exception, just logging",
        _ => "got unexpected exception, just logging",
    }
}
