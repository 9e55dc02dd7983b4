//! Front-matter heuristics over first-page text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::normalize_whitespace;

const MAX_TITLE_CHARS: usize = 300;
const MAX_ABSTRACT_CHARS: usize = 5000;

/// Guess the title from the text of the first page: the first line that
/// reads like prose rather than a running header, a URL or an affiliation.
pub fn guess_title(first_page: &str) -> Option<String> {
    static NOT_TITLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^(?:arxiv:|preprint|proceedings|journal of|vol\.|volume|doi|https?://|www\.|page \d|\d+$|received|accepted|published|copyright|©)")
            .unwrap()
    });

    first_page
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(15)
        .find(|line| {
            let words = line.split_whitespace().count();
            (2..=40).contains(&words)
                && line.chars().count() <= MAX_TITLE_CHARS
                && !NOT_TITLE.is_match(line)
                && !line.contains('@')
                && line.chars().any(char::is_alphabetic)
        })
        .map(normalize_whitespace)
}

/// Text following an "Abstract" heading, up to the first blank line or the
/// next section heading.
pub fn find_abstract(text: &str) -> Option<String> {
    static START_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\babstract\b\s*[.:\u{2014}-]?\s*").unwrap());
    static END_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\n\s*\n|\n\s*(?:(?:1|I)\.?\s+)?(?:Introduction|Keywords|Key\s+words|Index\s+Terms|CCS\s+Concepts)\b")
            .unwrap()
    });

    let start = START_RE.find(text)?.end();
    let rest = &text[start..];
    let end = END_RE.find(rest).map_or(rest.len(), |m| m.start());
    let abstract_text = normalize_whitespace(&rest[..end]);
    if abstract_text.split_whitespace().count() < 5 {
        return None;
    }
    Some(abstract_text.chars().take(MAX_ABSTRACT_CHARS).collect())
}

/// Keywords from a "Keywords:" / "Index Terms" line.
pub fn find_keywords(text: &str) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?im)^\s*(?:Keywords|Key\s+words|Index\s+Terms)\s*[:\u{2014}-]?\s*(.+)$").unwrap()
    });

    let Some(line) = RE.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    line.as_str()
        .split([',', ';', '\u{00B7}', '\u{2022}'])
        .map(|k| k.trim().trim_end_matches('.').trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST_PAGE: &str = "arXiv:2301.00001v1 [cs.DL] 1 Jan 2023\n\
        Extracting Metadata from Scholarly PDFs\n\
        Ada Lovelace\n\
        ada@example.org\n\
        \n\
        Abstract\n\
        We present a pipeline that extracts\n\
        structured metadata from scientific documents.\n\
        \n\
        Keywords: metadata; PDF, digital libraries.\n\
        1 Introduction\n";

    #[test]
    fn test_guess_title_skips_header_line() {
        assert_eq!(
            guess_title(FIRST_PAGE).as_deref(),
            Some("Extracting Metadata from Scholarly PDFs")
        );
    }

    #[test]
    fn test_guess_title_none_for_noise() {
        assert_eq!(guess_title("12\n\nhttps://example.org\n"), None);
    }

    #[test]
    fn test_find_abstract() {
        assert_eq!(
            find_abstract(FIRST_PAGE).as_deref(),
            Some("We present a pipeline that extracts structured metadata from scientific documents.")
        );
    }

    #[test]
    fn test_abstract_stops_at_introduction() {
        let text = "Abstract: one two three four five six.\n1. Introduction\nBody.";
        assert_eq!(
            find_abstract(text).as_deref(),
            Some("one two three four five six.")
        );
    }

    #[test]
    fn test_find_keywords() {
        assert_eq!(
            find_keywords(FIRST_PAGE),
            vec!["metadata", "PDF", "digital libraries"]
        );
        assert!(find_keywords("no such line").is_empty());
    }
}
