use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::{extract_arxiv_id, extract_doi, extract_year};
use crate::text::{fix_hyphenation, normalize_whitespace};

/// Fields recovered from one reference string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationFields {
    /// Whitespace-normalized reference text.
    pub raw_text: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
}

/// Parse a segmented reference.
///
/// Title detection tries, in order: a quoted title (IEEE), the sentence after
/// an ACM-style `Authors. Year.` prefix, then the second sentence. Whatever
/// precedes the title is split into author names.
pub fn parse_citation(reference: &str) -> CitationFields {
    let raw_text = normalize_whitespace(&fix_hyphenation(reference));

    let title_span = quoted_title(&raw_text)
        .or_else(|| acm_title(&raw_text))
        .or_else(|| second_sentence(&raw_text));

    let (title, authors) = match title_span {
        Some((start, end)) => (
            Some(raw_text[start..end].trim().to_string()),
            split_authors(&raw_text[..start]),
        ),
        None => (None, Vec::new()),
    };

    CitationFields {
        title,
        authors,
        year: extract_year(&raw_text),
        doi: extract_doi(reference),
        arxiv_id: extract_arxiv_id(&raw_text),
        raw_text,
    }
}

/// Byte span of a quoted title, without the quotes and trailing comma.
fn quoted_title(text: &str) -> Option<(usize, usize)> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"[\u{201C}"]([^\u{201D}"]{8,}?)[,.]?[\u{201D}"]"#).unwrap());
    let m = RE.captures(text)?.get(1)?;
    Some((m.start(), m.end()))
}

fn acm_title(text: &str) -> Option<(usize, usize)> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\.\s+(?:19|20)\d{2}[a-z]?\.\s+([^.?!]{8,})[.?!]").unwrap());
    let m = RE.captures(text)?.get(1)?;
    Some((m.start(), m.end()))
}

fn second_sentence(text: &str) -> Option<(usize, usize)> {
    let bounds = sentence_bounds(text);
    let &(start, end) = bounds.get(1)?;
    let sentence = &text[start..end];
    (sentence.split_whitespace().count() >= 3).then_some((start, end))
}

/// Sentence spans split on `. `, ignoring periods that end an initial ("J.").
fn sentence_bounds(text: &str) -> Vec<(usize, usize)> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.?!]\s+").unwrap());

    let mut bounds = Vec::new();
    let mut start = 0;
    for m in RE.find_iter(text) {
        let last_word = text[start..m.start()]
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default();
        let is_initial = last_word.chars().count() <= 2
            && last_word.chars().next().is_some_and(char::is_uppercase);
        if is_initial {
            continue;
        }
        bounds.push((start, m.start()));
        start = m.end();
    }
    if start < text.len() {
        bounds.push((start, text.len()));
    }
    bounds
}

fn split_authors(prefix: &str) -> Vec<String> {
    static SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*(?:and\s+)?|\s+and\s+|;\s*|\s*&\s*").unwrap());
    static INITIALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[A-Z]\.\s*-?)+$").unwrap());
    static YEAR_TAIL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[\s.,(]*(?:19|20)\d{2}[a-z]?\)?[\s.,]*$").unwrap());

    let prefix = prefix.trim_end_matches(|c: char| c.is_whitespace() || "\u{201C}\",.:".contains(c));
    let prefix = YEAR_TAIL.replace(prefix, "");

    let mut authors: Vec<String> = Vec::new();
    for token in SEP.split(&prefix).map(str::trim).filter(|t| !t.is_empty()) {
        let token = token.trim_end_matches('.');
        // "Smith, J." splits into "Smith" and "J"; glue the initials back on
        if let Some(last) = authors.last_mut()
            && INITIALS.is_match(&format!("{token}."))
        {
            last.push_str(", ");
            last.push_str(token);
            last.push('.');
            continue;
        }
        if token.chars().filter(|c| c.is_alphabetic()).count() >= 2 {
            authors.push(token.to_string());
        }
    }
    authors
}
