use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::IngestError;

/// A PDF unpacked from an archive into the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPdf {
    pub path: PathBuf,
    /// Path of the entry inside the archive.
    pub entry_name: String,
}

/// Result of archive extraction, including any warnings (e.g. size limit reached).
#[derive(Debug, Default)]
pub struct ArchiveExtraction {
    pub pdfs: Vec<ExtractedPdf>,
    pub warnings: Vec<String>,
}

/// Returns true if the given path looks like a supported archive.
pub fn is_archive_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".zip") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Read an archive from disk, detect its type and extract its PDFs into `dir`.
///
/// Supports ZIP and tar.gz, detected by extension then magic bytes.
/// `max_size` limits total extracted bytes (0 = unlimited); once reached,
/// extraction stops and a warning is recorded.
pub fn extract_archive(
    archive_path: &Path,
    dir: &Path,
    max_size: u64,
) -> Result<ArchiveExtraction, IngestError> {
    let data = std::fs::read(archive_path).map_err(|source| IngestError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let extraction = if name.ends_with(".zip") || data.starts_with(b"PK") {
        extract_from_zip(&data, dir, max_size)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") || data.starts_with(&[0x1f, 0x8b])
    {
        extract_from_tar_gz(&data, dir, max_size)
    } else {
        return Err(IngestError::Unsupported(archive_path.to_path_buf()));
    };

    let extraction = extraction.map_err(|message| IngestError::Archive {
        path: archive_path.to_path_buf(),
        message,
    })?;
    for warning in &extraction.warnings {
        tracing::warn!(archive = %archive_path.display(), "{warning}");
    }
    if extraction.pdfs.is_empty() {
        return Err(IngestError::Archive {
            path: archive_path.to_path_buf(),
            message: "no PDF files found in archive".into(),
        });
    }
    Ok(extraction)
}

/// Skips directories, path traversal, hidden files, macOS resource forks and
/// non-PDF entries.
fn wanted_entry(name: &Path) -> bool {
    let name_str = name.to_string_lossy();
    if name_str.contains("__MACOSX") {
        return false;
    }
    if name
        .file_name()
        .is_none_or(|f| f.to_string_lossy().starts_with('.'))
    {
        return false;
    }
    name_str.to_lowercase().ends_with(".pdf")
}

/// Collects entries into `dir` under flat `<index>_<basename>` names.
struct Collector<'a> {
    dir: &'a Path,
    max_size: u64,
    total_size: u64,
    result: ArchiveExtraction,
}

impl<'a> Collector<'a> {
    fn new(dir: &'a Path, max_size: u64) -> Self {
        Self {
            dir,
            max_size,
            total_size: 0,
            result: ArchiveExtraction::default(),
        }
    }

    /// Returns false once the size budget is exhausted.
    fn admit(&mut self, size: u64) -> bool {
        if self.max_size == 0 {
            return true;
        }
        self.total_size += size;
        if self.total_size > self.max_size {
            self.result.warnings.push(format!(
                "Size limit ({}MB) reached after {} files, skipping remaining",
                self.max_size / 1024 / 1024,
                self.result.pdfs.len()
            ));
            return false;
        }
        true
    }

    fn store(&mut self, index: usize, name: &Path, mut reader: impl Read) -> Result<(), String> {
        let name_str = name.to_string_lossy().to_string();
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| format!("Failed to extract {}: {}", name_str, e))?;

        if !buf.starts_with(b"%PDF-") {
            tracing::debug!(entry = %name_str, "skipping entry without PDF header");
            return Ok(());
        }

        let basename = name
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let out_name = format!("{}_{}", index, basename);
        let out_path = self.dir.join(&out_name);
        std::fs::write(&out_path, &buf)
            .map_err(|e| format!("Failed to write {}: {}", out_name, e))?;

        self.result.pdfs.push(ExtractedPdf {
            path: out_path,
            entry_name: name_str,
        });
        Ok(())
    }
}

/// Extract PDF files from a ZIP archive.
pub fn extract_from_zip(data: &[u8], dir: &Path, max_size: u64) -> Result<ArchiveExtraction, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| format!("Failed to open ZIP: {}", e))?;
    let mut collector = Collector::new(dir, max_size);

    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| format!("Failed to read ZIP entry: {}", e))?;
        if file.is_dir() {
            continue;
        }
        // enclosed_name rejects path traversal
        let Some(name) = file.enclosed_name() else {
            continue;
        };
        if !wanted_entry(&name) {
            continue;
        }
        if !collector.admit(file.size()) {
            break;
        }
        collector.store(i, &name, file)?;
    }

    Ok(collector.result)
}

/// Extract PDF files from a tar.gz archive.
pub fn extract_from_tar_gz(
    data: &[u8],
    dir: &Path,
    max_size: u64,
) -> Result<ArchiveExtraction, String> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| format!("Failed to read tar.gz: {}", e))?;
    let mut collector = Collector::new(dir, max_size);

    for (i, entry) in entries.enumerate() {
        let entry = entry.map_err(|e| format!("Failed to read tar entry: {}", e))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| format!("Failed to read entry path: {}", e))?
            .to_path_buf();
        let name_str = name.to_string_lossy();
        if name_str.contains("..") || name_str.starts_with('/') {
            continue;
        }
        if !wanted_entry(&name) {
            continue;
        }
        if !collector.admit(entry.size()) {
            break;
        }
        collector.store(i, &name, entry)?;
    }

    Ok(collector.result)
}
