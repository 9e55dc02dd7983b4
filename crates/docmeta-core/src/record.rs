use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Byte stream owned by the stage for the duration of one record. Dropping
/// it closes the underlying resource.
pub type ContentStream = Box<dyn Read + Send>;

/// Upstream diagnostic key/value pairs attached to every fault for a record.
pub type AuditData = BTreeMap<String, String>;

/// One unit of work handed to a worker.
pub struct InputRecord {
    pub document_id: String,
    pub content: ContentStream,
    pub content_length_kb: u64,
    pub audit: AuditData,
}

impl InputRecord {
    pub fn new(
        document_id: impl Into<String>,
        content: impl Read + Send + 'static,
        content_length_kb: u64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            content: Box::new(content),
            content_length_kb,
            audit: AuditData::new(),
        }
    }

    pub fn with_audit(mut self, audit: AuditData) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_audit_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.audit.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for InputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRecord")
            .field("document_id", &self.document_id)
            .field("content_length_kb", &self.content_length_kb)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

/// Page range of a document or cited work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub full_name: String,
    /// Indexes into [`MetadataRecord::affiliations`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliation_positions: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceBasicMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Range>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMetadata {
    /// 1-based position in the bibliography.
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub basic_metadata: ReferenceBasicMetadata,
}

/// Extracted document metadata.
///
/// Two shapes matter: *full* (built from a document tree) and *empty* (only
/// `id` set). Both are valid payloads for the metadata sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_identifiers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<Affiliation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MetadataRecord {
    /// The empty shape: document id only.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_empty_shape(&self) -> bool {
        *self == Self::empty(self.id.clone())
    }
}

/// Diagnostic record written to the fault sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub input_object_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Messages of the error's `source()` chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    #[serde(default)]
    pub supplementary_data: BTreeMap<String, String>,
}

/// Payload accepted by a [`NamedSinkGroup`](crate::sink::NamedSinkGroup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutputRecord {
    Meta(MetadataRecord),
    Fault(FaultRecord),
}

impl OutputRecord {
    pub fn as_meta(&self) -> Option<&MetadataRecord> {
        match self {
            OutputRecord::Meta(meta) => Some(meta),
            OutputRecord::Fault(_) => None,
        }
    }

    pub fn as_fault(&self) -> Option<&FaultRecord> {
        match self {
            OutputRecord::Fault(fault) => Some(fault),
            OutputRecord::Meta(_) => None,
        }
    }
}
