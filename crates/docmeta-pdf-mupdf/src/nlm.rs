//! Builds an NLM-shaped document tree from the PDF info dictionary and
//! page text.

use docmeta_core::tree::{DocumentTree, Element};
use docmeta_parsing::{
    CitationFields, extract_citations, extract_doi, extract_year, find_abstract, find_keywords,
    guess_title,
};

/// Front-matter entries of the PDF info dictionary. Blank values count as
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
}

impl DocumentInfo {
    fn title(&self) -> Option<&str> {
        non_blank(self.title.as_deref()).filter(|t| !looks_like_filename(t))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// Word processors often leave the source file name in the title slot.
fn looks_like_filename(title: &str) -> bool {
    let lower = title.to_ascii_lowercase();
    [".doc", ".docx", ".tex", ".dvi", ".pdf", ".indd"]
        .iter()
        .any(|ext| lower.ends_with(ext))
        || lower.starts_with("microsoft word")
}

/// Assemble the tree. `pages` holds the text of each page in order.
///
/// The info dictionary wins for title, authors and keywords; the first-page
/// heuristics fill whatever it lacks.
pub fn build_tree(info: &DocumentInfo, pages: &[String]) -> DocumentTree {
    let first_page = pages.first().map(String::as_str).unwrap_or_default();
    // Abstracts occasionally start at the bottom of page one
    let opening = pages
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    let full_text = pages.join("\n");

    let mut meta = Element::new("article-meta");

    if let Some(doi) = extract_doi(first_page) {
        meta.push(Element::new("article-id").attr("pub-id-type", "doi").text(doi));
    }

    let title = info
        .title()
        .map(str::to_string)
        .or_else(|| guess_title(first_page));
    if let Some(title) = title {
        meta.push(Element::new("title-group").child(Element::new("article-title").text(title)));
    }

    let authors = non_blank(info.author.as_deref())
        .map(split_names)
        .unwrap_or_default();
    if !authors.is_empty() {
        let mut group = Element::new("contrib-group");
        for name in authors {
            group.push(
                Element::new("contrib")
                    .attr("contrib-type", "author")
                    .child(Element::new("string-name").text(name)),
            );
        }
        meta.push(group);
    }

    if let Some(year) = extract_year(first_page) {
        meta.push(Element::new("pub-date").child(Element::new("year").text(year.to_string())));
    }

    let abstract_text = find_abstract(&opening).or_else(|| non_blank(info.subject.as_deref()).map(str::to_string));
    if let Some(text) = abstract_text {
        meta.push(Element::new("abstract").child(Element::new("p").text(text)));
    }

    let keywords = match non_blank(info.keywords.as_deref()) {
        Some(raw) => raw
            .split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        None => find_keywords(&opening),
    };
    if !keywords.is_empty() {
        let mut group = Element::new("kwd-group");
        for keyword in keywords {
            group.push(Element::new("kwd").text(keyword));
        }
        meta.push(group);
    }

    let mut article = Element::new("article").child(Element::new("front").child(meta));

    let citations = extract_citations(&full_text);
    if !citations.is_empty() {
        let mut ref_list = Element::new("ref-list");
        for (i, citation) in citations.iter().enumerate() {
            ref_list.push(reference(i + 1, citation));
        }
        article.push(Element::new("back").child(ref_list));
    }

    DocumentTree::new(article)
}

fn split_names(raw: &str) -> Vec<String> {
    let separators: &[char] = if raw.contains(';') { &[';'] } else { &[','] };
    raw.split(separators)
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn reference(position: usize, citation: &CitationFields) -> Element {
    let mut structured = Element::new("element-citation");
    for author in &citation.authors {
        structured.push(Element::new("string-name").text(author.as_str()));
    }
    if let Some(title) = &citation.title {
        structured.push(Element::new("article-title").text(title.as_str()));
    }
    if let Some(year) = citation.year {
        structured.push(Element::new("year").text(year.to_string()));
    }
    if let Some(doi) = &citation.doi {
        structured.push(Element::new("pub-id").attr("pub-id-type", "doi").text(doi.as_str()));
    }
    if let Some(arxiv) = &citation.arxiv_id {
        structured.push(Element::new("pub-id").attr("pub-id-type", "arxiv").text(arxiv.as_str()));
    }

    Element::new("ref")
        .attr("id", format!("ref{position}"))
        .child(Element::new("mixed-citation").text(citation.raw_text.as_str()))
        .child(structured)
}
