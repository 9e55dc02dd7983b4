//! Text heuristics over raw PDF text: front matter, the references section
//! and individual citations.

pub mod citation;
pub mod front;
pub mod identifiers;
pub mod section;
pub mod text;

pub use citation::{CitationFields, parse_citation};
pub use front::{find_abstract, find_keywords, guess_title};
pub use identifiers::{extract_arxiv_id, extract_doi, extract_year};
pub use section::{SegmentationResult, SegmentationStrategy, find_references_section, segment_references};

/// Locate, segment and parse the bibliography of a document.
///
/// Only documents with an explicit references header yield citations; the
/// tail-of-document fallback is too noisy to emit as structured references.
pub fn extract_citations(text: &str) -> Vec<CitationFields> {
    if !section::has_references_header(text) {
        return Vec::new();
    }
    let Some(section) = find_references_section(text) else {
        return Vec::new();
    };
    segment_references(&section)
        .references
        .iter()
        .map(|r| parse_citation(r))
        .collect()
}
