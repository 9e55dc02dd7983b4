use serde::{Deserialize, Serialize};

/// How a single record left the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Skipped,
    Oversized,
    Extracted { processing_ms: u64, slow: bool },
    Demoted { code: String },
}

/// Per-worker counters. Reports from several workers merge by summing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub processed: u64,
    pub skipped: u64,
    pub oversized: u64,
    pub extracted: u64,
    pub demoted: u64,
    pub slow: u64,
    #[serde(default)]
    pub cancelled: bool,
}

impl StageReport {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Oversized => self.oversized += 1,
            RecordOutcome::Extracted { slow, .. } => {
                self.extracted += 1;
                if *slow {
                    self.slow += 1;
                }
            }
            RecordOutcome::Demoted { .. } => self.demoted += 1,
        }
    }

    pub fn merge(&mut self, other: &StageReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.oversized += other.oversized;
        self.extracted += other.extracted;
        self.demoted += other.demoted;
        self.slow += other.slow;
        self.cancelled |= other.cancelled;
    }

    /// Records written to the meta sink.
    pub fn meta_records(&self) -> u64 {
        self.oversized + self.extracted + self.demoted
    }

    /// Records written to the fault sink.
    pub fn fault_records(&self) -> u64 {
        self.demoted + self.slow
    }
}
