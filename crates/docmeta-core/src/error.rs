use std::any::{Any, type_name};
use std::error::Error as StdError;

use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::config::ConfigError;
use crate::convert::{ConvertError, TransformationError};
use crate::sink::SinkError;
use crate::source::SourceError;
use crate::tree::DocumentTreeError;

/// Anything that can go wrong between handing a record to the analyzer and
/// holding its metadata record.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Transformation(#[from] TransformationError),
    #[error(transparent)]
    DocumentTree(#[from] DocumentTreeError),
    #[error("{code}: {source}")]
    Other {
        code: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ExtractionError {
    /// Wrap an arbitrary error, remembering its type name as the fault code.
    pub fn other<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Other {
            code: type_name::<E>().to_string(),
            source: Box::new(error),
        }
    }

    /// Fault code for this error: the Rust type name of the underlying error.
    pub fn code(&self) -> &str {
        match self {
            Self::Analysis(_) => type_name::<AnalysisError>(),
            Self::Transformation(_) => type_name::<TransformationError>(),
            Self::DocumentTree(_) => type_name::<DocumentTreeError>(),
            Self::Other { code, .. } => code,
        }
    }
}

impl From<ConvertError> for ExtractionError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Transformation(e) => Self::Transformation(e),
            ConvertError::DocumentTree(e) => Self::DocumentTree(e),
        }
    }
}

/// A panic that escaped the analyzer, caught at the driver boundary.
#[derive(Error, Debug)]
#[error("analyzer panicked: {message}")]
pub struct AnalyzerPanic {
    message: String,
}

impl AnalyzerPanic {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Failure that aborts a worker.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("invalid stage configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),
    #[error("record source failure: {0}")]
    Source(#[from] SourceError),
    #[error("fatal extraction error for {document_id}: {source}")]
    Extraction {
        document_id: String,
        #[source]
        source: ExtractionError,
    },
}
