//! The per-partition worker and the driver loop around it.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::analyzer::AnalyzerFactory;
use crate::classify::{
    CriticalityPolicy, Disposition, FailureDisposition, classify, classify_processing_time,
    demotion_message,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigBag, StageConfig};
use crate::convert::convert;
use crate::error::{AnalyzerPanic, ExtractionError, StageError};
use crate::fault::FaultBuilder;
use crate::progress::ProgressMeter;
use crate::record::{AuditData, ContentStream, InputRecord, MetadataRecord};
use crate::report::{RecordOutcome, StageReport};
use crate::sink::{Emitter, NamedSinkGroup, SinkError};
use crate::source::RecordSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    RecordStarted { document_id: String },
    RecordFinished { document_id: String, outcome: RecordOutcome },
}

pub type EventCallback = Arc<dyn Fn(&StageEvent) + Send + Sync>;

/// State owned by one worker: the sink group, the progress window and the
/// running report. Records are processed strictly one at a time.
pub struct ExtractionWorker<S: NamedSinkGroup> {
    config: Arc<StageConfig>,
    policy: CriticalityPolicy,
    analyzers: Arc<dyn AnalyzerFactory>,
    emitter: Emitter<S>,
    faults: FaultBuilder,
    clock: Arc<dyn Clock>,
    progress: ProgressMeter,
    events: Option<EventCallback>,
    report: StageReport,
}

impl<S: NamedSinkGroup> ExtractionWorker<S> {
    pub fn setup(
        config: Arc<StageConfig>,
        sinks: S,
        analyzers: Arc<dyn AnalyzerFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let progress = ProgressMeter::new(config.progress_log_interval(), clock.now_ms());
        Self {
            policy: CriticalityPolicy::from(config.as_ref()),
            emitter: Emitter::new(sinks, &config),
            faults: FaultBuilder::new(Arc::clone(&clock)),
            config,
            analyzers,
            clock,
            progress,
            events: None,
            report: StageReport::default(),
        }
    }

    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    /// Process one record to completion. The record's content stream is
    /// dropped exactly once whatever the outcome.
    ///
    /// An `Err` means the worker must stop; the sinks are already closed.
    pub fn process(&mut self, record: InputRecord) -> Result<RecordOutcome, StageError> {
        let InputRecord {
            document_id,
            content,
            content_length_kb,
            audit,
        } = record;

        self.emit_event(|| StageEvent::RecordStarted {
            document_id: document_id.clone(),
        });
        self.progress.tick(self.clock.now_ms());

        let outcome = if self.config.is_excluded(&document_id) {
            drop(content);
            tracing::warn!(document_id = %document_id, "skipping processing for excluded id");
            RecordOutcome::Skipped
        } else if self.config.exceeds_max_file_size(content_length_kb) {
            drop(content);
            tracing::warn!(
                document_id = %document_id,
                limit_kb = self.config.max_file_size_kb().unwrap_or_default(),
                size_kb = content_length_kb,
                "file size limit exceeded, emitting empty metadata"
            );
            self.emitter.write_meta(MetadataRecord::empty(&document_id))?;
            RecordOutcome::Oversized
        } else {
            self.extract_and_emit(&document_id, content, &audit)?
        };

        self.report.record(&outcome);
        self.emit_event(|| StageEvent::RecordFinished {
            document_id,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    fn extract_and_emit(
        &mut self,
        document_id: &str,
        content: ContentStream,
        audit: &AuditData,
    ) -> Result<RecordOutcome, StageError> {
        tracing::info!(document_id, "starting processing");
        let started_ms = self.clock.now_ms();
        let extracted = self.extract(document_id, content);
        let processing_ms = self.clock.now_ms().saturating_sub(started_ms);

        match extracted {
            Ok(meta) => {
                self.emitter.write_meta(meta)?;
                let threshold = self.config.processing_time_threshold_ms();
                let slow = matches!(
                    classify_processing_time(processing_ms, threshold),
                    Some(Disposition::Annotate)
                );
                if slow {
                    tracing::warn!(
                        document_id,
                        processing_ms,
                        threshold_ms = threshold.unwrap_or_default(),
                        "processing time threshold exceeded"
                    );
                    let fault = self
                        .faults
                        .processing_time_exceeded(document_id, processing_ms, audit);
                    self.emitter.write_fault(fault)?;
                }
                tracing::info!(document_id, processing_ms, "finished processing");
                Ok(RecordOutcome::Extracted {
                    processing_ms,
                    slow,
                })
            }
            Err(error) => {
                let failure = classify(&error, self.policy);
                tracing::debug!(
                    document_id,
                    disposition = ?Disposition::from(failure),
                    "classified failed record"
                );
                self.handle_failure(document_id, error, failure, audit)
            }
        }
    }

    fn handle_failure(
        &mut self,
        document_id: &str,
        error: ExtractionError,
        failure: FailureDisposition,
        audit: &AuditData,
    ) -> Result<RecordOutcome, StageError> {
        match failure {
            FailureDisposition::Fatal => {
                tracing::error!(
                    document_id,
                    code = error.code(),
                    error = %error,
                    "fatal extraction error"
                );
                self.emitter.close_quietly();
                Err(StageError::Extraction {
                    document_id: document_id.to_string(),
                    source: error,
                })
            }
            FailureDisposition::DemoteToFault => {
                tracing::error!(
                    document_id,
                    code = error.code(),
                    error = %error,
                    "{}",
                    demotion_message(&error)
                );
                let fault = self.faults.from_error(document_id, &error, audit);
                let code = fault.code.clone();
                self.emitter.write_meta(MetadataRecord::empty(document_id))?;
                self.emitter.write_fault(fault)?;
                Ok(RecordOutcome::Demoted { code })
            }
        }
    }

    /// Run a fresh analyzer over the content and convert its output.
    fn extract(
        &self,
        document_id: &str,
        content: ContentStream,
    ) -> Result<MetadataRecord, ExtractionError> {
        let bytes = read_content(content)?;

        let mut analyzer = guarded(|| Ok(self.analyzers.create()?))?;
        guarded(|| Ok(analyzer.feed(bytes)?))?;
        let tree = guarded(|| Ok(analyzer.document_tree()?))?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            match tree.to_xml() {
                Ok(xml) => tracing::debug!(document_id, tree = %xml, "document tree"),
                Err(e) => tracing::debug!(document_id, error = %e, "document tree not printable"),
            }
        }

        let text = match guarded(|| Ok(analyzer.raw_text()?)) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(document_id, error = %e, "unable to extract plaintext, writing extracted metadata without it");
                None
            }
        };

        Ok(convert(document_id, Some(&tree), text)?)
    }

    fn emit_event(&self, event: impl FnOnce() -> StageEvent) {
        if let Some(callback) = &self.events {
            callback(&event());
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.report.cancelled = true;
    }

    pub fn report(&self) -> &StageReport {
        &self.report
    }

    /// Teardown: close the sinks. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<(), SinkError> {
        self.emitter.close()
    }
}

/// Reads the whole stream; the stream is dropped on return on every path.
fn read_content(mut content: ContentStream) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    content
        .read_to_end(&mut bytes)
        .map_err(ExtractionError::other)?;
    Ok(bytes)
}

/// Run analyzer code, turning a panic into an "other" extraction error.
fn guarded<T>(f: impl FnOnce() -> Result<T, ExtractionError>) -> Result<T, ExtractionError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(ExtractionError::other(AnalyzerPanic::from_payload(payload))))
}

/// Drives one worker over one input partition.
#[derive(Clone)]
pub struct StageRunner {
    config: Arc<StageConfig>,
    analyzers: Arc<dyn AnalyzerFactory>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    events: Option<EventCallback>,
}

impl StageRunner {
    pub fn new(config: impl Into<Arc<StageConfig>>, analyzers: Arc<dyn AnalyzerFactory>) -> Self {
        Self {
            config: config.into(),
            analyzers,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Process every record of `source` in order. Cancellation is honored
    /// between records. The sinks are closed on every exit.
    pub fn run<R, S>(&self, mut source: R, sinks: S) -> Result<StageReport, StageError>
    where
        R: RecordSource,
        S: NamedSinkGroup,
    {
        let mut worker = ExtractionWorker::setup(
            Arc::clone(&self.config),
            sinks,
            Arc::clone(&self.analyzers),
            Arc::clone(&self.clock),
        );
        if let Some(events) = &self.events {
            worker = worker.with_events(Arc::clone(events));
        }

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(
                    processed = worker.report().processed,
                    "cancelled, stopping before next record"
                );
                worker.mark_cancelled();
                break;
            }
            let Some(next) = source.next_record() else {
                break;
            };
            worker.process(next?)?;
        }

        worker.cleanup()?;
        Ok(worker.report().clone())
    }
}

/// Resolve `bag` and run one worker over `source`, writing to `sinks`.
pub fn run_stage<R, S>(
    bag: &ConfigBag,
    source: R,
    sinks: S,
    analyzers: Arc<dyn AnalyzerFactory>,
) -> Result<StageReport, StageError>
where
    R: RecordSource,
    S: NamedSinkGroup,
{
    let config = StageConfig::from_bag(bag)?;
    StageRunner::new(config, analyzers).run(source, sinks)
}
