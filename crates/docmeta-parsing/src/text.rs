use once_cell::sync::Lazy;
use regex::Regex;

/// Expand common typographic ligatures found in PDFs.
pub fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}

/// Rejoin words hyphenated across a line break ("extrac-\ntion").
///
/// Compound words whose second half is a common suffix keep their hyphen
/// ("data-\ndriven" becomes "data-driven").
pub fn fix_hyphenation(text: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\s*\n\s*([a-z]\w*)").unwrap());
    const KEEP_HYPHEN: &[&str] = &[
        "based", "driven", "aware", "oriented", "specific", "dependent", "independent", "free",
        "scale", "level", "time", "world", "grained", "agnostic",
    ];

    RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let tail = &caps[2];
        if KEEP_HYPHEN.contains(&tail) {
            format!("{}-{}", &caps[1], tail)
        } else {
            format!("{}{}", &caps[1], tail)
        }
    })
    .into_owned()
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
