use thiserror::Error;

use crate::tree::DocumentTree;

/// Underlying reason an analyzer gave up on a document.
#[derive(Error, Debug)]
pub enum AnalysisCause {
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("{0}")]
    Extraction(String),
}

/// Failure reported by a [`ContentAnalyzer`].
#[derive(Error, Debug)]
#[error("{message}")]
pub struct AnalysisError {
    message: String,
    #[source]
    cause: Option<AnalysisCause>,
}

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: AnalysisCause) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn invalid_pdf(detail: impl Into<String>) -> Self {
        Self::with_cause("cannot open document", AnalysisCause::InvalidPdf(detail.into()))
    }

    pub fn cause(&self) -> Option<&AnalysisCause> {
        self.cause.as_ref()
    }

    pub fn is_invalid_pdf(&self) -> bool {
        matches!(self.cause, Some(AnalysisCause::InvalidPdf(_)))
    }
}

/// Capability wrapping a scientific-document analyzer.
///
/// One instance handles exactly one document: it is fed the content once,
/// then asked for the structured tree and, best effort, the raw text.
/// Instances are never reused across records and need not be thread-safe.
pub trait ContentAnalyzer {
    fn feed(&mut self, content: Vec<u8>) -> Result<(), AnalysisError>;

    fn document_tree(&mut self) -> Result<DocumentTree, AnalysisError>;

    fn raw_text(&mut self) -> Result<String, AnalysisError>;
}

/// Produces a fresh [`ContentAnalyzer`] per record.
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ContentAnalyzer>, AnalysisError>;
}

impl<F> AnalyzerFactory for F
where
    F: Fn() -> Box<dyn ContentAnalyzer> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn ContentAnalyzer>, AnalysisError> {
        Ok(self())
    }
}
