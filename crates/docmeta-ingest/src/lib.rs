use std::path::PathBuf;

use thiserror::Error;

pub mod archive;
pub mod descriptor;
pub mod discover;
pub mod manifest;

pub use archive::{ArchiveExtraction, ExtractedPdf, extract_archive, is_archive_path};
pub use descriptor::{DescriptorSource, RecordDescriptor, partition};
pub use discover::{ARCHIVE_KEY, DiscoverOptions, discover};
pub use manifest::{ManifestEntry, read_manifest};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Manifest {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },
    #[error("unsupported input: {}", .0.display())]
    Unsupported(PathBuf),
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
