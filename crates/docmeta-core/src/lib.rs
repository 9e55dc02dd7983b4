//! Per-record PDF metadata extraction stage.
//!
//! A worker pulls [`InputRecord`]s from a [`RecordSource`], runs a fresh
//! [`ContentAnalyzer`] over each document, and writes a [`MetadataRecord`] or
//! a [`FaultRecord`] (often both) to a [`NamedSinkGroup`]. Which failures abort
//! the worker and which are demoted to per-record faults is decided by
//! [`classify`].

pub mod analyzer;
pub mod classify;
pub mod clock;
pub mod config;
pub mod convert;
pub mod error;
pub mod fault;
pub mod progress;
pub mod record;
pub mod report;
pub mod sink;
pub mod source;
pub mod stage;
pub mod tree;

pub use analyzer::{AnalysisCause, AnalysisError, AnalyzerFactory, ContentAnalyzer};
pub use classify::{CriticalityPolicy, Disposition, FailureDisposition, classify};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigBag, ConfigError, StageConfig};
pub use convert::{ConvertError, TransformationError, convert};
pub use error::{AnalyzerPanic, ExtractionError, StageError};
pub use fault::{FaultBuilder, PROCESSING_TIME_KEY, PROCESSING_TIME_THRESHOLD_EXCEEDED, URL_KEY};
pub use record::{
    Affiliation, AuditData, Author, ContentStream, FaultRecord, InputRecord, MetadataRecord,
    OutputRecord, Range, ReferenceBasicMetadata, ReferenceMetadata,
};
pub use report::{RecordOutcome, StageReport};
pub use sink::{Emitter, JsonLinesSinkGroup, MemorySinkGroup, NamedSinkGroup, SinkError};
pub use source::{RecordSource, SourceError};
pub use stage::{EventCallback, ExtractionWorker, StageEvent, StageRunner, run_stage};
pub use tree::{DocumentTree, DocumentTreeError, Element, Node};
