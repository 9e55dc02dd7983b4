use std::error::Error as StdError;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::ExtractionError;
use crate::record::{AuditData, FaultRecord};

pub const PROCESSING_TIME_THRESHOLD_EXCEEDED: &str = "ProcessingTimeThresholdExceeded";

/// Supplementary-data key carrying the processing time in milliseconds.
pub const PROCESSING_TIME_KEY: &str = "processing_time";

/// Supplementary-data key for the content URL, passed through from upstream audit data.
pub const URL_KEY: &str = "url";

/// Builds [`FaultRecord`]s stamped with the worker's clock.
#[derive(Clone)]
pub struct FaultBuilder {
    clock: Arc<dyn Clock>,
}

impl FaultBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Fault for a demoted extraction error. The code is the error's type
    /// name; the audit map is copied into the supplementary data.
    pub fn from_error(
        &self,
        document_id: &str,
        error: &ExtractionError,
        audit: &AuditData,
    ) -> FaultRecord {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        FaultRecord {
            input_object_id: document_id.to_string(),
            timestamp: self.clock.now_ms(),
            code: error.code().to_string(),
            message: Some(error.to_string()),
            causes,
            supplementary_data: audit.clone(),
        }
    }

    /// Fault annotating a record whose extraction exceeded the time threshold.
    pub fn processing_time_exceeded(
        &self,
        document_id: &str,
        processing_ms: u64,
        audit: &AuditData,
    ) -> FaultRecord {
        let mut supplementary_data = audit.clone();
        supplementary_data.insert(PROCESSING_TIME_KEY.to_string(), processing_ms.to_string());

        FaultRecord {
            input_object_id: document_id.to_string(),
            timestamp: self.clock.now_ms(),
            code: PROCESSING_TIME_THRESHOLD_EXCEEDED.to_string(),
            message: None,
            causes: Vec::new(),
            supplementary_data,
        }
    }
}
