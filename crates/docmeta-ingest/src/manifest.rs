//! JSON-lines manifests: one document per line, carrying the id, the file
//! location and upstream audit data.
//!
//! ```text
//! {"id": "doc-1", "path": "pdfs/doc-1.pdf", "url": "https://example.org/doc-1.pdf"}
//! {"id": "doc-2", "path": "/abs/doc-2.pdf", "audit": {"harvester": "oai"}}
//! ```

use std::path::Path;

use serde::Deserialize;

use docmeta_core::{AuditData, URL_KEY};

use crate::IngestError;
use crate::descriptor::RecordDescriptor;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub audit: AuditData,
}

pub fn is_manifest_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"))
}

/// Read a manifest into descriptors. Relative paths resolve against the
/// manifest's directory; `url` becomes the `url` audit entry.
pub fn read_manifest(path: &Path) -> Result<Vec<RecordDescriptor>, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut descriptors = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let manifest_error = |message: String| IngestError::Manifest {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };

        let entry: ManifestEntry =
            serde_json::from_str(line).map_err(|e| manifest_error(e.to_string()))?;
        if entry.id.trim().is_empty() {
            return Err(manifest_error("empty document id".into()));
        }

        let file = base.join(&entry.path);
        let mut descriptor = RecordDescriptor::from_path(entry.id, file)?;
        descriptor.audit = entry.audit;
        if let Some(url) = entry.url {
            descriptor.audit.insert(URL_KEY.to_string(), url);
        }
        descriptors.push(descriptor);
    }

    tracing::debug!(manifest = %path.display(), entries = descriptors.len(), "read manifest");
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_manifest_resolves_paths_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pdfs")).unwrap();
        std::fs::write(dir.path().join("pdfs/a.pdf"), vec![b'x'; 2048]).unwrap();
        let manifest = dir.path().join("batch.jsonl");
        std::fs::write(
            &manifest,
            "{\"id\": \"a\", \"path\": \"pdfs/a.pdf\", \"url\": \"http://e.org/a\", \"audit\": {\"harvester\": \"oai\"}}\n\n",
        )
        .unwrap();

        let descriptors = read_manifest(&manifest).unwrap();
        assert_eq!(descriptors.len(), 1);
        let a = &descriptors[0];
        assert_eq!(a.document_id, "a");
        assert_eq!(a.content_length_kb(), 2);
        assert_eq!(a.audit["url"], "http://e.org/a");
        assert_eq!(a.audit["harvester"], "oai");
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        let manifest = dir.path().join("batch.jsonl");
        std::fs::write(&manifest, "{\"id\": \"a\", \"path\": \"a.pdf\"}\nnot json\n").unwrap();

        match read_manifest(&manifest).unwrap_err() {
            IngestError::Manifest { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("batch.jsonl");
        std::fs::write(&manifest, "{\"id\": \"a\", \"path\": \"gone.pdf\"}\n").unwrap();
        assert!(matches!(read_manifest(&manifest), Err(IngestError::Io { .. })));
    }
}
