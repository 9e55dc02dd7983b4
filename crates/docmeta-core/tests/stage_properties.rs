//! End-to-end behavior of the extraction stage against in-memory fakes.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docmeta_core::tree::{DocumentTree, Element};
use docmeta_core::{
    AnalysisError, AnalyzerFactory, AuditData, ConfigBag, ContentAnalyzer, ExtractionWorker,
    InputRecord, ManualClock, MemorySinkGroup, NamedSinkGroup, OutputRecord, RecordOutcome,
    SinkError, SourceError, StageConfig, StageError, StageEvent, StageRunner, run_stage,
    PROCESSING_TIME_KEY, PROCESSING_TIME_THRESHOLD_EXCEEDED, URL_KEY,
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Byte stream that counts how often it is dropped.
struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    drops: Arc<AtomicUsize>,
    fail_reads: bool,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::other("connection reset"));
        }
        self.inner.read(buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Analyzer whose behavior is picked by the document content.
struct ScriptedAnalyzer {
    clock: Arc<ManualClock>,
    content: Vec<u8>,
}

impl ContentAnalyzer for ScriptedAnalyzer {
    fn feed(&mut self, content: Vec<u8>) -> Result<(), AnalysisError> {
        self.content = content;
        Ok(())
    }

    fn document_tree(&mut self) -> Result<DocumentTree, AnalysisError> {
        match self.content.as_slice() {
            b"invalid" => Err(AnalysisError::invalid_pdf("no startxref")),
            b"broken" => Err(AnalysisError::new("layout analysis failed")),
            b"panic" => panic!("analyzer blew up"),
            b"dangling" => Ok(DocumentTree::new(
                Element::new("article").child(
                    Element::new("front").child(
                        Element::new("article-meta").child(
                            Element::new("contrib-group").child(
                                Element::new("contrib")
                                    .child(Element::new("string-name").text("A B"))
                                    .child(
                                        Element::new("xref")
                                            .attr("ref-type", "aff")
                                            .attr("rid", "missing"),
                                    ),
                            ),
                        ),
                    ),
                ),
            )),
            b"slow" => {
                self.clock.advance(5000);
                Ok(article("Slow Paper"))
            }
            b"slow-invalid" => {
                self.clock.advance(5000);
                Err(AnalysisError::invalid_pdf("truncated after 5s"))
            }
            _ => Ok(article("A Clean Paper")),
        }
    }

    fn raw_text(&mut self) -> Result<String, AnalysisError> {
        match self.content.as_slice() {
            b"no-text" => Err(AnalysisError::new("text layer unreadable")),
            _ => Ok("body text".to_string()),
        }
    }
}

fn article(title: &str) -> DocumentTree {
    DocumentTree::new(
        Element::new("article").child(
            Element::new("front").child(
                Element::new("article-meta").child(
                    Element::new("title-group").child(Element::new("article-title").text(title)),
                ),
            ),
        ),
    )
}

struct FailingSinks {
    closes: Arc<AtomicUsize>,
}

impl NamedSinkGroup for FailingSinks {
    fn write(&mut self, name: &str, _record: &OutputRecord) -> Result<(), SinkError> {
        Err(SinkError::Io {
            name: name.to_string(),
            source: io::Error::other("quota exceeded"),
        })
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    clock: Arc<ManualClock>,
    sinks: MemorySinkGroup,
    drops: Vec<Arc<AtomicUsize>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(1_000_000)),
            sinks: MemorySinkGroup::new(),
            drops: Vec::new(),
        }
    }

    fn factory(&self) -> Arc<dyn AnalyzerFactory> {
        let clock = Arc::clone(&self.clock);
        Arc::new(move || -> Box<dyn ContentAnalyzer> {
            Box::new(ScriptedAnalyzer {
                clock: Arc::clone(&clock),
                content: Vec::new(),
            })
        })
    }

    fn record(&mut self, id: &str, content: &[u8], size_kb: u64) -> InputRecord {
        self.stream_record(id, content, size_kb, false)
    }

    fn stream_record(&mut self, id: &str, content: &[u8], size_kb: u64, fail_reads: bool) -> InputRecord {
        let drops = Arc::new(AtomicUsize::new(0));
        self.drops.push(Arc::clone(&drops));
        let stream = TrackedStream {
            inner: Cursor::new(content.to_vec()),
            drops,
            fail_reads,
        };
        InputRecord::new(id, stream, size_kb)
            .with_audit_entry(URL_KEY, format!("http://example.org/{id}.pdf"))
            .with_audit_entry("harvester", "test")
    }

    fn runner(&self, config: StageConfig) -> StageRunner {
        StageRunner::new(config, self.factory()).with_clock(self.clock.clone())
    }

    fn run(&self, config: StageConfig, records: Vec<InputRecord>) -> Result<docmeta_core::StageReport, StageError> {
        self.runner(config)
            .run(records.into_iter().map(Ok::<_, SourceError>), self.sinks.clone())
    }

    fn meta(&self) -> Vec<docmeta_core::MetadataRecord> {
        self.sinks
            .records_for("meta")
            .into_iter()
            .filter_map(|r| r.as_meta().cloned())
            .collect()
    }

    fn faults(&self) -> Vec<docmeta_core::FaultRecord> {
        self.sinks
            .records_for("fault")
            .into_iter()
            .filter_map(|r| r.as_fault().cloned())
            .collect()
    }

    fn assert_every_stream_closed_once(&self) {
        for (i, drops) in self.drops.iter().enumerate() {
            assert_eq!(drops.load(Ordering::SeqCst), 1, "stream {i} drop count");
        }
    }
}

fn config() -> StageConfig {
    StageConfig::new("meta", "fault")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_clean_extraction_emits_full_meta() {
    let mut h = Harness::new();
    let records = vec![h.record("doc1", b"clean", 10)];
    let report = h.run(config(), records).unwrap();

    let meta = h.meta();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].id, "doc1");
    assert_eq!(meta[0].title.as_deref(), Some("A Clean Paper"));
    assert_eq!(meta[0].text.as_deref(), Some("body text"));
    assert!(h.faults().is_empty());
    assert_eq!(report.extracted, 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_text_failure_keeps_metadata_without_text() {
    let mut h = Harness::new();
    let records = vec![h.record("doc2", b"no-text", 10)];
    h.run(config(), records).unwrap();

    let meta = h.meta();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].title.as_deref(), Some("A Clean Paper"));
    assert!(meta[0].text.is_none());
    assert!(h.faults().is_empty());
}

#[test]
fn test_oversized_emits_empty_meta_and_no_fault() {
    let mut h = Harness::new();
    let records = vec![h.record("doc3", b"clean", 2048)];
    let report = h
        .run(config().with_max_file_size_kb(1024), records)
        .unwrap();

    let meta = h.meta();
    assert_eq!(meta.len(), 1);
    assert!(meta[0].is_empty_shape());
    assert_eq!(meta[0].id, "doc3");
    assert!(h.faults().is_empty());
    assert_eq!(report.oversized, 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_size_at_limit_is_processed() {
    let mut h = Harness::new();
    let records = vec![h.record("doc3", b"clean", 1024)];
    h.run(config().with_max_file_size_kb(1024), records)
        .unwrap();
    assert!(!h.meta()[0].is_empty_shape());
}

#[test]
fn test_excluded_emits_nothing() {
    let mut h = Harness::new();
    let records = vec![h.record("doc4", b"clean", 10)];
    let report = h
        .run(config().with_excluded_ids(["doc4"]), records)
        .unwrap();

    assert!(h.sinks.records().is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_invalid_pdf_is_demoted_to_pair() {
    let mut h = Harness::new();
    let records = vec![h.record("doc5", b"invalid", 10)];
    let report = h.run(config(), records).unwrap();

    let all = h.sinks.records();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, "meta");
    assert!(all[0].1.as_meta().unwrap().is_empty_shape());
    assert_eq!(all[1].0, "fault");

    let fault = all[1].1.as_fault().unwrap();
    assert_eq!(fault.input_object_id, "doc5");
    assert_eq!(fault.code, std::any::type_name::<AnalysisError>());
    assert_eq!(fault.timestamp, 1_000_000);
    assert_eq!(fault.causes, vec!["invalid PDF: no startxref".to_string()]);
    assert_eq!(report.demoted, 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_slow_record_is_annotated_after_meta() {
    let mut h = Harness::new();
    let records = vec![h.record("doc6", b"slow", 10)];
    let report = h
        .run(config().with_processing_time_threshold_ms(1000), records)
        .unwrap();

    let all = h.sinks.records();
    assert_eq!(all.len(), 2);
    let meta = all[0].1.as_meta().unwrap();
    assert_eq!(meta.title.as_deref(), Some("Slow Paper"));

    let fault = all[1].1.as_fault().unwrap();
    assert_eq!(fault.code, PROCESSING_TIME_THRESHOLD_EXCEEDED);
    assert_eq!(fault.supplementary_data[PROCESSING_TIME_KEY], "5000");
    assert!(
        fault.supplementary_data[PROCESSING_TIME_KEY]
            .parse::<u64>()
            .is_ok()
    );
    assert_eq!(report.slow, 1);
}

#[test]
fn test_slow_demoted_record_gets_no_time_annotation() {
    let mut h = Harness::new();
    let records = vec![h.record("doc7", b"slow-invalid", 10)];
    let report = h
        .run(config().with_processing_time_threshold_ms(1000), records)
        .unwrap();

    let all = h.sinks.records();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, "meta");
    assert!(all[0].1.as_meta().unwrap().is_empty_shape());
    assert_eq!(all[1].0, "fault");
    assert_eq!(
        all[1].1.as_fault().unwrap().code,
        std::any::type_name::<AnalysisError>()
    );
    assert!(
        h.faults()
            .iter()
            .all(|f| f.code != PROCESSING_TIME_THRESHOLD_EXCEEDED)
    );
    assert_eq!(report.demoted, 1);
    assert_eq!(report.slow, 0);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_unbounded_threshold_never_annotates() {
    let mut h = Harness::new();
    let records = vec![h.record("doc6", b"slow", 10)];
    h.run(config(), records).unwrap();
    assert!(h.faults().is_empty());
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[test]
fn test_critical_analysis_error_aborts_without_output() {
    let mut h = Harness::new();
    let records = vec![
        h.record("ok", b"clean", 10),
        h.record("bad", b"broken", 10),
        h.record("never", b"clean", 10),
    ];
    let err = h
        .run(config().with_analysis_exception_critical(true), records)
        .unwrap_err();

    match err {
        StageError::Extraction { document_id, .. } => assert_eq!(document_id, "bad"),
        other => panic!("unexpected error: {other}"),
    }
    let ids: Vec<String> = h.meta().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["ok"]);
    assert!(h.faults().is_empty());
    assert_eq!(h.sinks.close_calls(), 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_analysis_flag_does_not_promote_other_errors() {
    let mut h = Harness::new();
    let records = vec![h.record("doc", b"panic", 10)];
    h.run(config().with_analysis_exception_critical(true), records)
        .unwrap();

    let faults = h.faults();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].code.ends_with("AnalyzerPanic"));
}

#[test]
fn test_critical_other_error_aborts() {
    let mut h = Harness::new();
    let records = vec![h.stream_record("doc", b"clean", 10, true)];
    let err = h
        .run(config().with_other_exception_critical(true), records)
        .unwrap_err();
    assert!(matches!(err, StageError::Extraction { .. }));
    assert!(h.sinks.records().is_empty());
    h.assert_every_stream_closed_once();
}

#[test]
fn test_stream_read_failure_is_demoted() {
    let mut h = Harness::new();
    let records = vec![h.stream_record("doc", b"clean", 10, true)];
    h.run(config(), records).unwrap();

    let faults = h.faults();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].code.starts_with("std::io::"));
    assert_eq!(h.meta().len(), 1);
}

#[test]
fn test_schema_errors_abort_even_when_lenient() {
    let mut h = Harness::new();
    let records = vec![h.record("doc", b"dangling", 10)];
    let err = h.run(config(), records).unwrap_err();
    assert!(matches!(err, StageError::Extraction { .. }));
    assert!(h.sinks.records().is_empty());
    assert_eq!(h.sinks.close_calls(), 1);
}

// ---------------------------------------------------------------------------
// Cross-cutting properties
// ---------------------------------------------------------------------------

#[test]
fn test_every_path_closes_stream_once() {
    let mut h = Harness::new();
    let records = vec![
        h.record("clean", b"clean", 10),
        h.record("skip", b"clean", 10),
        h.record("big", b"clean", 5000),
        h.record("invalid", b"invalid", 10),
        h.record("panic", b"panic", 10),
        h.record("slow", b"slow", 10),
        h.stream_record("unreadable", b"", 10, true),
        h.record("fatal", b"dangling", 10),
        h.record("after", b"clean", 10),
    ];
    let config = config()
        .with_excluded_ids(["skip"])
        .with_max_file_size_kb(1024)
        .with_processing_time_threshold_ms(1000);
    assert!(h.run(config, records).is_err());
    h.assert_every_stream_closed_once();
}

#[test]
fn test_faults_carry_audit_data() {
    let mut h = Harness::new();
    let records = vec![
        h.record("invalid", b"invalid", 10),
        h.record("panic", b"panic", 10),
        h.record("slow", b"slow", 10),
    ];
    h.run(config().with_processing_time_threshold_ms(1000), records)
        .unwrap();

    let faults = h.faults();
    assert_eq!(faults.len(), 3);
    for fault in faults {
        let expected_url = format!("http://example.org/{}.pdf", fault.input_object_id);
        assert_eq!(fault.supplementary_data[URL_KEY], expected_url);
        assert_eq!(fault.supplementary_data["harvester"], "test");
    }
}

#[test]
fn test_teardown_is_idempotent() {
    let h = Harness::new();
    let mut worker = ExtractionWorker::setup(
        Arc::new(config()),
        h.sinks.clone(),
        h.factory(),
        h.clock.clone(),
    );
    worker.cleanup().unwrap();
    worker.cleanup().unwrap();
    drop(worker);
    assert_eq!(h.sinks.close_calls(), 1);
}

#[test]
fn test_worker_processes_records_individually() {
    let mut h = Harness::new();
    let first = h.record("a", b"clean", 10);
    let second = h.record("b", b"invalid", 10);
    let mut worker = ExtractionWorker::setup(
        Arc::new(config()),
        h.sinks.clone(),
        h.factory(),
        h.clock.clone(),
    );

    assert!(matches!(
        worker.process(first).unwrap(),
        RecordOutcome::Extracted { slow: false, .. }
    ));
    assert!(matches!(
        worker.process(second).unwrap(),
        RecordOutcome::Demoted { .. }
    ));
    assert_eq!(worker.report().processed, 2);
    worker.cleanup().unwrap();
}

#[test]
fn test_sink_failure_is_fatal_and_closes() {
    let mut h = Harness::new();
    let closes = Arc::new(AtomicUsize::new(0));
    let records = vec![h.record("big", b"clean", 5000)];
    let err = h
        .runner(config().with_max_file_size_kb(1))
        .run(
            records.into_iter().map(Ok::<_, SourceError>),
            FailingSinks {
                closes: Arc::clone(&closes),
            },
        )
        .unwrap_err();

    assert!(matches!(err, StageError::Sink(_)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    h.assert_every_stream_closed_once();
}

#[test]
fn test_source_failure_is_fatal() {
    let mut h = Harness::new();
    let first = h.record("a", b"clean", 10);
    let source = vec![
        Ok(first),
        Err(SourceError::Invalid {
            origin: "manifest.jsonl:2".into(),
            message: "missing path".into(),
        }),
    ];
    let err = h
        .runner(config())
        .run(source.into_iter(), h.sinks.clone())
        .unwrap_err();

    assert!(matches!(err, StageError::Source(_)));
    assert_eq!(h.meta().len(), 1);
    assert_eq!(h.sinks.close_calls(), 1);
}

#[test]
fn test_cancellation_between_records() {
    let mut h = Harness::new();
    let records = vec![
        h.record("a", b"clean", 10),
        h.record("b", b"clean", 10),
        h.record("c", b"clean", 10),
    ];
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);

    let report = h
        .runner(config())
        .with_cancellation(cancel)
        .with_events(Arc::new(move |event: &StageEvent| {
            seen.lock().unwrap().push(event.clone());
            if matches!(event, StageEvent::RecordFinished { .. }) {
                trigger.cancel();
            }
        }))
        .run(records.into_iter().map(Ok::<_, SourceError>), h.sinks.clone())
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 1);
    assert_eq!(h.meta().len(), 1);
    assert_eq!(h.sinks.close_calls(), 1);
    h.assert_every_stream_closed_once();

    let events = events.lock().unwrap();
    assert_eq!(
        events[0],
        StageEvent::RecordStarted {
            document_id: "a".into()
        }
    );
    assert!(matches!(
        &events[1],
        StageEvent::RecordFinished { document_id, outcome: RecordOutcome::Extracted { .. } }
            if document_id == "a"
    ));
    assert_eq!(events.len(), 2);
}

#[test]
fn test_run_stage_resolves_bag() {
    let mut h = Harness::new();
    let bag: ConfigBag = [
        ("output.meta", "m"),
        ("output.fault", "f"),
        ("excluded.ids", "x"),
        ("import.content.max.file.size.mb", "$UNDEFINED$"),
    ]
    .into_iter()
    .collect();
    let records = vec![h.record("x", b"clean", 10), h.record("y", b"invalid", 10)];

    let report = run_stage(
        &bag,
        records.into_iter().map(Ok::<_, SourceError>),
        h.sinks.clone(),
        h.factory(),
    )
    .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.demoted, 1);
    assert_eq!(h.sinks.records_for("m").len(), 1);
    assert_eq!(h.sinks.records_for("f").len(), 1);
}

#[test]
fn test_run_stage_requires_output_names() {
    let h = Harness::new();
    let bag: ConfigBag = [("output.meta", "m")].into_iter().collect();
    let err = run_stage(
        &bag,
        std::iter::empty::<Result<InputRecord, SourceError>>(),
        h.sinks.clone(),
        h.factory(),
    )
    .unwrap_err();
    assert!(matches!(err, StageError::Config(_)));
    assert_eq!(h.sinks.close_calls(), 0);
}

#[test]
fn test_empty_audit_is_allowed() {
    let h = Harness::new();
    let record = InputRecord::new("bare", Cursor::new(b"invalid".to_vec()), 1).with_audit(AuditData::new());
    h.run(config(), vec![record]).unwrap();
    let faults = h.faults();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].supplementary_data.is_empty());
}
