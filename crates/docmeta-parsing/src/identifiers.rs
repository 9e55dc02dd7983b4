use once_cell::sync::Lazy;
use regex::Regex;

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
fn clean_doi(doi: &str) -> String {
    const TRAILING: [char; 4] = ['.', ',', ';', ':'];
    let mut doi = doi.trim_end_matches(TRAILING);

    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        while doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
            doi = doi[..doi.len() - 1].trim_end_matches(TRAILING);
        }
    }

    doi.to_string()
}

/// Extract a DOI from free text.
///
/// Handles bare DOIs, `doi:` prefixes and `doi.org` URLs, plus DOIs that the
/// PDF text layer split across a line break.
pub fn extract_doi(text: &str) -> Option<String> {
    static SPLIT_PERIOD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(10\.\d{4,}/[^\s\]>,]+\.)\s*\n\s*(\d{3,})").unwrap());
    static SPLIT_DIGITS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(10\.\d{4,}/[^\s\]>,]+\d)\s*\n\s*(\d+(?:\.\d+)*)").unwrap());
    static SPLIT_DASH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(10\.\d{4,}/[^\s\]>,]+-)\s*\n\s*(\S+)").unwrap());

    let text = SPLIT_PERIOD.replace_all(text, "$1$2");
    let text = SPLIT_DIGITS.replace_all(&text, "$1$2");
    let text = SPLIT_DASH.replace_all(&text, "$1$2");

    static URL_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)https?://(?:dx\.)?doi\.org/(10\.\d{4,}/[^\s\]>},]+)").unwrap()
    });
    if let Some(doi) = URL_RE.captures(&text).and_then(|c| c.get(1)) {
        return Some(clean_doi(doi.as_str()));
    }

    static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"10\.\d{4,}/[^\s\]>},]+").unwrap());
    DOI_RE.find(&text).map(|m| clean_doi(m.as_str()))
}

/// Extract an arXiv identifier (`arXiv:2301.12345v2` or an `arxiv.org/abs/` URL).
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:arXiv[:\s]+|arxiv\.org/abs/)(\d{4}\.\d{4,5}(?:v\d+)?)").unwrap()
    });
    RE.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First plausible publication year (1900-2099) in the text.
pub fn extract_year(text: &str) -> Option<i32> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})[a-z]?\b").unwrap());
    RE.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
