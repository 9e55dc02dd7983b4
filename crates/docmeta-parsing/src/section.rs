use once_cell::sync::Lazy;
use regex::Regex;

/// Share of the document (from the start) skipped when no references header
/// is found; the remainder is treated as the references section.
const FALLBACK_FRACTION: f64 = 0.7;

/// Segmentation strategy that produced a reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationStrategy {
    Ieee,
    Numbered,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub strategy: SegmentationStrategy,
    pub references: Vec<String>,
}

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\n\s*(?:References|Bibliography|Works\s+Cited|Literature\s+Cited)\s*\n").unwrap()
});

static END_RE: Lazy<Regex> = Lazy::new(|| {
    // "Appendix" must be followed by whitespace plus a letter/number or end of
    // line, never a colon ("Artifact Appendix: Title" inside a reference).
    Regex::new(r"(?i)\n\s*(?:Appendix(?:\s+[A-Z0-9]|\s*\n|\s*$)|Acknowledgments|Acknowledgements|Supplementary|Ethics\s+Statement|Broader\s+Impact|[A-Z]\n\s*(?:Appendix|Proofs?|Additional|Extended|Experimental|Implementation|Hyperparameters?))")
        .unwrap()
});

/// Locate the references section in the document text.
///
/// Uses the LAST references header (tables and related-work paragraphs can
/// mention "References" earlier) and stops at the first end marker after it.
/// Without a header, the last 30% of the text is returned.
pub fn find_references_section(text: &str) -> Option<String> {
    if let Some(m) = HEADER_RE.find_iter(text).last() {
        let rest = &text[m.end()..];
        let end = END_RE.find(rest).map_or(rest.len(), |e| e.start());
        let section = &rest[..end];
        if !section.trim().is_empty() {
            return Some(section.to_string());
        }
    }

    if text.trim().is_empty() {
        return None;
    }
    let cutoff = (text.len() as f64 * FALLBACK_FRACTION) as usize;
    // Don't split in the middle of a UTF-8 codepoint
    let cutoff = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= cutoff)
        .unwrap_or(text.len());
    Some(text[cutoff..].to_string())
}

/// True when the text has an explicit references header.
pub fn has_references_header(text: &str) -> bool {
    HEADER_RE.is_match(text)
}

/// Split a references section into individual reference strings.
///
/// Strategies are tried in order of specificity: `[1]` markers, then `1.`
/// numbering, then blank-line separated paragraphs.
pub fn segment_references(ref_text: &str) -> SegmentationResult {
    if let Some(references) = try_ieee(ref_text) {
        return SegmentationResult {
            strategy: SegmentationStrategy::Ieee,
            references,
        };
    }
    if let Some(references) = try_numbered(ref_text) {
        return SegmentationResult {
            strategy: SegmentationStrategy::Numbered,
            references,
        };
    }
    SegmentationResult {
        strategy: SegmentationStrategy::Fallback,
        references: fallback_double_newline(ref_text),
    }
}

fn try_ieee(ref_text: &str) -> Option<Vec<String>> {
    // [N] at line start, or after a period, bracket or digit when the
    // extractor lost the newline.
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)(?:^|\n|[.\]0-9])\s*\[(\d+)\]\s*").unwrap());
    split_sequential(&RE, ref_text)
}

fn try_numbered(ref_text: &str) -> Option<Vec<String>> {
    // 1-3 digits only, so four-digit years never look like list markers
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)(?:^|\n)\s*(\d{1,3})\.\s+").unwrap());
    split_sequential(&RE, ref_text)
}

/// Split on `re` when it matches at least three times and the first few
/// captured numbers run 1, 2, 3, ...
fn split_sequential(re: &Regex, ref_text: &str) -> Option<Vec<String>> {
    let matches: Vec<_> = re.find_iter(ref_text).collect();
    if matches.len() < 3 {
        return None;
    }

    let first_nums: Vec<u32> = re
        .captures_iter(ref_text)
        .take(5)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    if first_nums.first() != Some(&1) {
        return None;
    }
    if !first_nums.windows(2).all(|w| w[1] == w[0] + 1) {
        return None;
    }

    let refs = matches
        .iter()
        .enumerate()
        .filter_map(|(i, m)| {
            let end = matches.get(i + 1).map_or(ref_text.len(), |next| next.start());
            let content = ref_text[m.end()..end].trim();
            (!content.is_empty()).then(|| content.to_string())
        })
        .collect();
    Some(refs)
}

fn fallback_double_newline(ref_text: &str) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
    RE.split(ref_text)
        .map(str::trim)
        .filter(|p| p.len() > 20)
        .map(str::to_string)
        .collect()
}
