use std::num::NonZeroU64;

/// One completed progress window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressWindow {
    /// Records seen so far, including the one that closed this window.
    pub processed: u64,
    /// Number of records in the window.
    pub window_len: u64,
    pub elapsed_ms: u64,
}

/// Counts records entering a worker and reports wall time per window of
/// `interval` records.
#[derive(Debug)]
pub struct ProgressMeter {
    interval: NonZeroU64,
    current: u64,
    window_start_ms: u64,
}

impl ProgressMeter {
    pub fn new(interval: NonZeroU64, now_ms: u64) -> Self {
        Self {
            interval,
            current: 0,
            window_start_ms: now_ms,
        }
    }

    /// Register one record. Returns the closed window when the count reaches
    /// a multiple of the interval.
    pub fn tick(&mut self, now_ms: u64) -> Option<ProgressWindow> {
        self.current += 1;
        if self.current % self.interval.get() != 0 {
            return None;
        }
        let elapsed_ms = now_ms.saturating_sub(self.window_start_ms);
        self.window_start_ms = now_ms;

        // warn, not debug: schedulers commonly run workers with debug suppressed
        tracing::warn!(
            processed = self.current,
            window = self.interval.get(),
            elapsed_secs = elapsed_ms / 1000,
            "metadata extraction progress: {}, time taken to process {} elements: {} secs",
            self.current,
            self.interval.get(),
            elapsed_ms / 1000
        );

        Some(ProgressWindow {
            processed: self.current,
            window_len: self.interval.get(),
            elapsed_ms,
        })
    }

    pub fn processed(&self) -> u64 {
        self.current
    }
}
