use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::IngestError;
use crate::archive::{extract_archive, is_archive_path};
use crate::descriptor::{RecordDescriptor, document_id_for};
use crate::manifest::{is_manifest_path, read_manifest};

/// Audit key naming the archive a document was unpacked from.
pub const ARCHIVE_KEY: &str = "archive";

#[derive(Debug, Clone, Copy)]
pub struct DiscoverOptions {
    /// Total bytes extracted per archive, 0 = unlimited.
    pub max_archive_size: u64,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            max_archive_size: 500 * 1024 * 1024,
        }
    }
}

/// Turn one input path into record descriptors.
///
/// - a directory is scanned recursively for `*.pdf`; ids are the relative
///   paths without extension
/// - a `.jsonl` file is read as a manifest
/// - a `.zip`, `.tar.gz` or `.tgz` file is unpacked under `staging`
/// - any other file is a single document whose id is its file stem
pub fn discover(
    input: &Path,
    staging: &Path,
    options: &DiscoverOptions,
) -> Result<Vec<RecordDescriptor>, IngestError> {
    let metadata = std::fs::metadata(input).map_err(|e| IngestError::io(input, e))?;

    let descriptors = if metadata.is_dir() {
        scan_directory(input)?
    } else if is_manifest_path(input) {
        read_manifest(input)?
    } else if is_archive_path(input) {
        unpack(input, staging, options)?
    } else {
        let id = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| IngestError::Unsupported(input.to_path_buf()))?;
        vec![RecordDescriptor::from_path(id, input)?]
    };

    tracing::info!(input = %input.display(), records = descriptors.len(), "discovered input records");
    Ok(descriptors)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

fn scan_directory(root: &Path) -> Result<Vec<RecordDescriptor>, IngestError> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files
        .into_iter()
        .map(|path| RecordDescriptor::from_path(document_id_for(root, &path), path))
        .collect()
}

fn walk_error(root: &Path, error: walkdir::Error) -> IngestError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop while scanning directory"));
    IngestError::io(path, source)
}

fn unpack(
    archive: &Path,
    staging: &Path,
    options: &DiscoverOptions,
) -> Result<Vec<RecordDescriptor>, IngestError> {
    let stem = archive_stem(archive);
    let dir = staging.join(&stem);
    std::fs::create_dir_all(&dir).map_err(|e| IngestError::io(&dir, e))?;

    let extraction = extract_archive(archive, &dir, options.max_archive_size)?;
    extraction
        .pdfs
        .into_iter()
        .map(|pdf| {
            let entry = PathBuf::from(&pdf.entry_name);
            let id = format!("{}/{}", stem, document_id_for(Path::new(""), &entry));
            Ok(RecordDescriptor::from_path(id, pdf.path)?
                .with_audit_entry(ARCHIVE_KEY, archive.display().to_string()))
        })
        .collect()
}

fn archive_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let lower = name.to_lowercase();
    for suffix in [".tar.gz", ".tgz", ".zip"] {
        if lower.ends_with(suffix) {
            return name[..name.len() - suffix.len()].to_string();
        }
    }
    name
}
