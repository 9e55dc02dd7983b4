use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use docmeta_core::{AuditData, InputRecord, SourceError};

use crate::IngestError;

/// A document located on disk but not yet opened.
///
/// Descriptors are cheap to move between workers; the file is only opened
/// when the record is pulled by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub document_id: String,
    pub path: PathBuf,
    pub length_bytes: u64,
    pub audit: AuditData,
}

impl RecordDescriptor {
    /// Stat `path` and describe it under `document_id`.
    pub fn from_path(
        document_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, IngestError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| IngestError::io(&path, e))?;
        Ok(Self {
            document_id: document_id.into(),
            path,
            length_bytes: metadata.len(),
            audit: AuditData::new(),
        })
    }

    pub fn with_audit_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.audit.insert(key.into(), value.into());
        self
    }

    /// Declared size in whole kilobytes, rounded up so any non-empty file is
    /// at least 1 KB.
    pub fn content_length_kb(&self) -> u64 {
        self.length_bytes.div_ceil(1024)
    }

    /// Open the file and wrap it as an [`InputRecord`].
    pub fn open(&self) -> Result<InputRecord, SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Io {
            origin: self.path.display().to_string(),
            source,
        })?;
        Ok(
            InputRecord::new(&self.document_id, BufReader::new(file), self.content_length_kb())
                .with_audit(self.audit.clone()),
        )
    }
}

/// Derive a document id from a path relative to `root`: the relative path
/// with forward slashes and without its extension.
pub(crate) fn document_id_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// [`RecordSource`](docmeta_core::RecordSource) over a list of descriptors,
/// opening each file as it is pulled.
#[derive(Debug)]
pub struct DescriptorSource {
    inner: std::vec::IntoIter<RecordDescriptor>,
}

impl DescriptorSource {
    pub fn new(descriptors: Vec<RecordDescriptor>) -> Self {
        Self {
            inner: descriptors.into_iter(),
        }
    }
}

impl Iterator for DescriptorSource {
    type Item = Result<InputRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|d| d.open())
    }
}

/// Deal descriptors round-robin into `n` partitions (at least one). Order
/// within each partition follows input order.
pub fn partition(descriptors: Vec<RecordDescriptor>, n: usize) -> Vec<Vec<RecordDescriptor>> {
    let n = n.max(1);
    let mut partitions: Vec<Vec<RecordDescriptor>> = (0..n).map(|_| Vec::new()).collect();
    for (i, descriptor) in descriptors.into_iter().enumerate() {
        partitions[i % n].push(descriptor);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn descriptor(id: &str, length_bytes: u64) -> RecordDescriptor {
        RecordDescriptor {
            document_id: id.into(),
            path: PathBuf::from(format!("{id}.pdf")),
            length_bytes,
            audit: AuditData::new(),
        }
    }

    #[test]
    fn test_content_length_rounds_up() {
        assert_eq!(descriptor("a", 0).content_length_kb(), 0);
        assert_eq!(descriptor("a", 1).content_length_kb(), 1);
        assert_eq!(descriptor("a", 1024).content_length_kb(), 1);
        assert_eq!(descriptor("a", 1025).content_length_kb(), 2);
    }

    #[test]
    fn test_partition_round_robin() {
        let descriptors = (0..5).map(|i| descriptor(&i.to_string(), 1)).collect();
        let parts = partition(descriptors, 2);
        let ids: Vec<Vec<&str>> = parts
            .iter()
            .map(|p| p.iter().map(|d| d.document_id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["0", "2", "4"], vec!["1", "3"]]);
    }

    #[test]
    fn test_partition_zero_means_one() {
        let parts = partition(vec![descriptor("a", 1)], 0);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_document_id_for() {
        let root = Path::new("/data/in");
        assert_eq!(document_id_for(root, Path::new("/data/in/x/paper.pdf")), "x/paper");
        assert_eq!(document_id_for(root, Path::new("/data/in/paper.v2.pdf")), "paper.v2");
    }

    #[test]
    fn test_open_carries_audit_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let desc = RecordDescriptor::from_path("doc", &path)
            .unwrap()
            .with_audit_entry("url", "http://example.org/doc.pdf");
        let mut record = desc.open().unwrap();
        assert_eq!(record.document_id, "doc");
        assert_eq!(record.content_length_kb, 1);
        assert_eq!(record.audit["url"], "http://example.org/doc.pdf");

        let mut body = Vec::new();
        record.content.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"%PDF-1.4 body");
    }

    #[test]
    fn test_open_missing_file_is_source_error() {
        let source = DescriptorSource::new(vec![descriptor("/nonexistent/zzz", 1)]);
        let results: Vec<_> = source.collect();
        assert!(matches!(results[0], Err(SourceError::Io { .. })));
    }
}
