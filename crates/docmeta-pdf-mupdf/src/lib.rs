use mupdf::{Document, MetadataName, TextPageFlags};

use docmeta_core::analyzer::{AnalysisCause, AnalysisError, AnalyzerFactory, ContentAnalyzer};
use docmeta_core::tree::DocumentTree;

pub mod nlm;

pub use nlm::{DocumentInfo, build_tree};

const PDF_MAGIC: &str = "application/pdf";
const PDF_HEADER: &[u8] = b"%PDF-";

/// Header/footer bands excluded from page text.
///
/// By default, text in the bottom 5% of each page (footers) and top 4%
/// (headers) is dropped so running heads and proceedings footers such as
/// "USENIX Association  34th USENIX Security Symposium  5281" do not end up
/// inside titles and citations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextOptions {
    footer_exclusion_ratio: Option<f32>,
    header_exclusion_ratio: Option<f32>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            footer_exclusion_ratio: Some(0.05),
            header_exclusion_ratio: Some(0.04),
        }
    }
}

impl TextOptions {
    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }
}

/// MuPDF-backed [`ContentAnalyzer`].
///
/// This crate is the only one linking mupdf (AGPL-3.0). One instance handles
/// one document; page text is extracted once and shared by
/// [`document_tree`](ContentAnalyzer::document_tree) and
/// [`raw_text`](ContentAnalyzer::raw_text).
#[derive(Debug, Default)]
pub struct MupdfAnalyzer {
    options: TextOptions,
    content: Option<Vec<u8>>,
    pages: Option<Vec<String>>,
}

impl MupdfAnalyzer {
    pub fn new(options: TextOptions) -> Self {
        Self {
            options,
            content: None,
            pages: None,
        }
    }

    fn open(&self) -> Result<Document, AnalysisError> {
        let content = self
            .content
            .as_deref()
            .ok_or_else(|| AnalysisError::new("no content was fed to the analyzer"))?;
        if content.is_empty() {
            return Err(AnalysisError::invalid_pdf("empty content"));
        }
        // The header may be preceded by junk, but only within the first KB
        let head = &content[..content.len().min(1024)];
        if !head.windows(PDF_HEADER.len()).any(|w| w == PDF_HEADER) {
            return Err(AnalysisError::invalid_pdf("missing %PDF- header"));
        }

        let document = Document::from_bytes(content, PDF_MAGIC)
            .map_err(|e| AnalysisError::invalid_pdf(e.to_string()))?;
        let needs_password = document
            .needs_password()
            .map_err(|e| AnalysisError::invalid_pdf(e.to_string()))?;
        if needs_password {
            return Err(AnalysisError::with_cause(
                "cannot read document",
                AnalysisCause::Encrypted,
            ));
        }
        Ok(document)
    }

    fn pages(&mut self, document: &Document) -> Result<&[String], AnalysisError> {
        if self.pages.is_none() {
            let pages = extract_pages(document, self.options)?;
            tracing::debug!(pages = pages.len(), "extracted page text");
            self.pages = Some(pages);
        }
        Ok(self.pages.as_deref().unwrap_or_default())
    }
}

impl ContentAnalyzer for MupdfAnalyzer {
    fn feed(&mut self, content: Vec<u8>) -> Result<(), AnalysisError> {
        self.content = Some(content);
        self.pages = None;
        Ok(())
    }

    fn document_tree(&mut self) -> Result<DocumentTree, AnalysisError> {
        let document = self.open()?;
        let info = read_info(&document);
        let pages = self.pages(&document)?;
        Ok(build_tree(&info, pages))
    }

    fn raw_text(&mut self) -> Result<String, AnalysisError> {
        if let Some(pages) = &self.pages {
            return Ok(pages.join("\n"));
        }
        let document = self.open()?;
        Ok(self.pages(&document)?.join("\n"))
    }
}

/// Builds one [`MupdfAnalyzer`] per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfAnalyzerFactory {
    options: TextOptions,
}

impl MupdfAnalyzerFactory {
    pub fn new(options: TextOptions) -> Self {
        Self { options }
    }
}

impl AnalyzerFactory for MupdfAnalyzerFactory {
    fn create(&self) -> Result<Box<dyn ContentAnalyzer>, AnalysisError> {
        Ok(Box::new(MupdfAnalyzer::new(self.options)))
    }
}

fn read_info(document: &Document) -> DocumentInfo {
    let entry = |name| document.metadata(name).ok().filter(|v| !v.trim().is_empty());
    DocumentInfo {
        title: entry(MetadataName::Title),
        author: entry(MetadataName::Author),
        subject: entry(MetadataName::Subject),
        keywords: entry(MetadataName::Keywords),
    }
}

fn extraction_error(e: mupdf::Error) -> AnalysisError {
    AnalysisError::with_cause("failed to extract page text", AnalysisCause::Extraction(e.to_string()))
}

fn extract_pages(document: &Document, options: TextOptions) -> Result<Vec<String>, AnalysisError> {
    let mut pages_text = Vec::new();

    for page_result in document.pages().map_err(extraction_error)? {
        let page = page_result.map_err(extraction_error)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(extraction_error)?;

        let page_bounds = page.bounds().map_err(extraction_error)?;
        let page_height = page_bounds.y1 - page_bounds.y0;
        let header_threshold = options
            .header_exclusion_ratio
            .map(|r| page_bounds.y0 + page_height * r);
        let footer_threshold = options
            .footer_exclusion_ratio
            .map(|r| page_bounds.y1 - page_height * r);

        // Block/line iteration keeps the natural reading order of each column
        let mut page_text = String::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();
            if header_threshold.is_some_and(|t| block_bounds.y1 <= t) {
                continue;
            }
            if footer_threshold.is_some_and(|t| block_bounds.y0 >= t) {
                continue;
            }

            for line in block.lines() {
                page_text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                page_text.push('\n');
            }
        }
        pages_text.push(docmeta_parsing::text::expand_ligatures(&page_text));
    }

    Ok(pages_text)
}
