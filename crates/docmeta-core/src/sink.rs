use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::config::StageConfig;
use crate::record::{FaultRecord, MetadataRecord, OutputRecord};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink group is closed")]
    Closed,
    #[error("invalid named output `{0}`")]
    InvalidName(String),
    #[error("failed to write to `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize record for `{name}`: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A group of named output channels supplied by the runtime.
pub trait NamedSinkGroup: Send {
    fn write(&mut self, name: &str, record: &OutputRecord) -> Result<(), SinkError>;

    /// Flush and release every channel. Called once by [`Emitter`].
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Writes metadata and fault records to the two configured outputs and owns
/// the sink group for the lifetime of a worker.
///
/// Any write failure closes the group before the error is returned. Closing
/// is idempotent, and a group still open on drop is closed then.
pub struct Emitter<S: NamedSinkGroup> {
    sinks: S,
    meta_output: String,
    fault_output: String,
    closed: bool,
}

impl<S: NamedSinkGroup> Emitter<S> {
    pub fn new(sinks: S, config: &StageConfig) -> Self {
        Self {
            sinks,
            meta_output: config.named_output_meta().to_string(),
            fault_output: config.named_output_fault().to_string(),
            closed: false,
        }
    }

    pub fn write_meta(&mut self, record: MetadataRecord) -> Result<(), SinkError> {
        self.write(true, OutputRecord::Meta(record))
    }

    pub fn write_fault(&mut self, record: FaultRecord) -> Result<(), SinkError> {
        self.write(false, OutputRecord::Fault(record))
    }

    fn write(&mut self, meta: bool, record: OutputRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        let name = if meta {
            &self.meta_output
        } else {
            &self.fault_output
        };
        let result = self.sinks.write(name, &record);
        if result.is_err() {
            self.close_quietly();
        }
        result
    }

    pub fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sinks.close()
    }

    /// Close on an error path, logging rather than returning a close failure
    /// so the original error wins.
    pub fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close sinks");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: NamedSinkGroup> Drop for Emitter<S> {
    fn drop(&mut self) {
        self.close_quietly();
    }
}

/// Shared in-memory sink group. Clones share the same buffer, so a caller can
/// keep one handle while the stage owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkGroup {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<(String, OutputRecord)>,
    close_calls: usize,
}

impl MemorySinkGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every record written, in write order, with its output name.
    pub fn records(&self) -> Vec<(String, OutputRecord)> {
        self.lock().records.clone()
    }

    pub fn records_for(&self, name: &str) -> Vec<OutputRecord> {
        self.lock()
            .records
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

impl NamedSinkGroup for MemorySinkGroup {
    fn write(&mut self, name: &str, record: &OutputRecord) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.close_calls > 0 {
            return Err(SinkError::Closed);
        }
        state.records.push((name.to_string(), record.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.lock().close_calls += 1;
        Ok(())
    }
}

/// Writes each named output as JSON lines under
/// `<root>/<name>/part-<partition>.jsonl`. Files are created on first write.
pub struct JsonLinesSinkGroup {
    root: PathBuf,
    partition: usize,
    writers: HashMap<String, BufWriter<File>>,
    closed: bool,
}

impl JsonLinesSinkGroup {
    pub fn new(root: impl Into<PathBuf>, partition: usize) -> Self {
        Self {
            root: root.into(),
            partition,
            writers: HashMap::new(),
            closed: false,
        }
    }

    /// Path the given output writes to for this partition.
    pub fn part_path(&self, name: &str) -> PathBuf {
        part_path(&self.root, name, self.partition)
    }

    fn writer(&mut self, name: &str) -> Result<&mut BufWriter<File>, SinkError> {
        if !self.writers.contains_key(name) {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(SinkError::InvalidName(name.to_string()));
            }
            let path = self.part_path(name);
            let io_err = |source| SinkError::Io {
                name: name.to_string(),
                source,
            };
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(io_err)?;
            }
            let file = File::create(&path).map_err(io_err)?;
            tracing::debug!(output = name, path = %path.display(), "opened sink");
            self.writers.insert(name.to_string(), BufWriter::new(file));
        }
        self.writers
            .get_mut(name)
            .ok_or_else(|| SinkError::InvalidName(name.to_string()))
    }
}

pub fn part_path(root: &Path, name: &str, partition: usize) -> PathBuf {
    root.join(name).join(format!("part-{partition:05}.jsonl"))
}

impl NamedSinkGroup for JsonLinesSinkGroup {
    fn write(&mut self, name: &str, record: &OutputRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        let writer = self.writer(name)?;
        serde_json::to_writer(&mut *writer, record).map_err(|source| SinkError::Serialize {
            name: name.to_string(),
            source,
        })?;
        writer.write_all(b"\n").map_err(|source| SinkError::Io {
            name: name.to_string(),
            source,
        })
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        let mut first_error = None;
        for (name, mut writer) in self.writers.drain() {
            if let Err(source) = writer.flush() {
                first_error.get_or_insert(SinkError::Io { name, source });
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
