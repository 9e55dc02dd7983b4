//! Maps an analyzer's NLM tree onto a [`MetadataRecord`].

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::record::{
    Affiliation, Author, MetadataRecord, Range, ReferenceBasicMetadata, ReferenceMetadata,
};
use crate::tree::{DocumentTree, DocumentTreeError, Element, Node};

/// The tree is well formed but does not fit the metadata schema.
#[derive(Error, Debug)]
pub enum TransformationError {
    #[error("author {author:?} references unknown affiliation `{rid}`")]
    DanglingAffiliation { author: String, rid: String },
    #[error("affiliation id `{0}` is declared more than once")]
    DuplicateAffiliation(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Transformation(#[from] TransformationError),
    #[error(transparent)]
    DocumentTree(#[from] DocumentTreeError),
}

/// Build a metadata record from analyzer output.
///
/// With neither a tree nor text this yields the empty shape.
pub fn convert(
    document_id: &str,
    tree: Option<&DocumentTree>,
    text: Option<String>,
) -> Result<MetadataRecord, ConvertError> {
    let mut record = MetadataRecord::empty(document_id);
    record.text = text;

    let Some(tree) = tree else {
        return Ok(record);
    };

    let article = tree.root();
    if article.name() != "article" {
        return Err(DocumentTreeError::UnexpectedRoot {
            found: article.name().to_string(),
        }
        .into());
    }
    record.language = article.attribute("xml:lang").map(str::to_string);

    if let Some(front) = article.first("front") {
        if let Some(journal_meta) = front.first("journal-meta") {
            convert_journal_meta(journal_meta, &mut record);
        }
        if let Some(article_meta) = front.first("article-meta") {
            convert_article_meta(article_meta, &mut record)?;
        }
    }

    if let Some(ref_list) = article.path(&["back", "ref-list"]) {
        record.references = ref_list
            .all("ref")
            .enumerate()
            .map(|(i, r)| convert_reference(i + 1, r))
            .collect();
    }

    Ok(record)
}

fn convert_journal_meta(journal_meta: &Element, record: &mut MetadataRecord) {
    record.journal = journal_meta
        .path(&["journal-title-group", "journal-title"])
        .or_else(|| journal_meta.first("journal-title"))
        .and_then(Element::non_empty_text);
    record.publisher = journal_meta
        .path(&["publisher", "publisher-name"])
        .and_then(Element::non_empty_text);
    for issn in journal_meta.all("issn") {
        if let Some(value) = issn.non_empty_text() {
            let kind = issn.attribute("pub-type").unwrap_or("issn");
            record
                .external_identifiers
                .insert(format!("issn-{kind}"), value);
        }
    }
}

fn convert_article_meta(meta: &Element, record: &mut MetadataRecord) -> Result<(), ConvertError> {
    for id in meta.all("article-id") {
        if let (Some(kind), Some(value)) = (id.attribute("pub-id-type"), id.non_empty_text()) {
            record.external_identifiers.insert(kind.to_string(), value);
        }
    }

    record.title = meta
        .path(&["title-group", "article-title"])
        .and_then(Element::non_empty_text);
    record.abstract_text = meta.first("abstract").and_then(Element::non_empty_text);
    record.keywords = meta
        .all("kwd-group")
        .flat_map(|group| group.all("kwd"))
        .filter_map(Element::non_empty_text)
        .collect();

    record.year = meta
        .path(&["pub-date", "year"])
        .and_then(Element::non_empty_text)
        .and_then(|y| y.parse().ok());
    record.volume = meta.first("volume").and_then(Element::non_empty_text);
    record.issue = meta.first("issue").and_then(Element::non_empty_text);
    record.pages = page_range(meta);

    // Affiliations may sit directly under article-meta or inside a contrib-group.
    let contrib_groups: Vec<&Element> = meta.all("contrib-group").collect();
    let aff_elements = meta
        .all("aff")
        .chain(contrib_groups.iter().flat_map(|g| g.all("aff")));

    let mut aff_positions: HashMap<String, usize> = HashMap::new();
    for aff in aff_elements {
        let position = record.affiliations.len();
        if let Some(id) = aff.attribute("id")
            && aff_positions.insert(id.to_string(), position).is_some()
        {
            return Err(TransformationError::DuplicateAffiliation(id.to_string()).into());
        }
        record.affiliations.push(convert_affiliation(aff));
    }

    for contrib in contrib_groups.iter().flat_map(|g| g.all("contrib")) {
        if contrib.attribute("contrib-type").is_some_and(|t| t != "author") {
            continue;
        }
        let Some(full_name) = person_name(contrib) else {
            continue;
        };
        let mut affiliation_positions = Vec::new();
        for xref in contrib
            .all("xref")
            .filter(|x| x.attribute("ref-type") == Some("aff"))
        {
            for rid in xref.attribute("rid").unwrap_or_default().split_whitespace() {
                let position = aff_positions.get(rid).copied().ok_or_else(|| {
                    TransformationError::DanglingAffiliation {
                        author: full_name.clone(),
                        rid: rid.to_string(),
                    }
                })?;
                affiliation_positions.push(position);
            }
        }
        record.authors.push(Author {
            full_name,
            affiliation_positions,
        });
    }

    Ok(())
}

fn convert_affiliation(aff: &Element) -> Affiliation {
    // Drop the label ("1", "a") so it does not leak into the raw text.
    let raw_text = aff
        .children()
        .iter()
        .filter_map(|node| match node {
            Node::Element(e) if e.name() == "label" => None,
            Node::Element(e) => Some(e.text_content()),
            Node::Text(t) => Some(t.clone()),
        })
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Affiliation {
        organization: aff.first("institution").and_then(Element::non_empty_text),
        address: aff.first("addr-line").and_then(Element::non_empty_text),
        country_name: aff.first("country").and_then(Element::non_empty_text),
        raw_text,
    }
}

fn person_name(person: &Element) -> Option<String> {
    person
        .first("string-name")
        .or_else(|| person.first("name"))
        .and_then(name_text)
}

/// `given-names surname` when structured, otherwise the plain text.
fn name_text(name: &Element) -> Option<String> {
    let given = name.first("given-names").and_then(Element::non_empty_text);
    let surname = name.first("surname").and_then(Element::non_empty_text);
    match (given, surname) {
        (Some(g), Some(s)) => Some(format!("{g} {s}")),
        (None, Some(s)) => Some(s),
        (Some(g), None) => Some(g),
        (None, None) => name.non_empty_text(),
    }
}

fn page_range(element: &Element) -> Option<Range> {
    let start = element.first("fpage").and_then(Element::non_empty_text)?;
    Some(Range {
        start,
        end: element.first("lpage").and_then(Element::non_empty_text),
    })
}

fn convert_reference(position: usize, reference: &Element) -> ReferenceMetadata {
    let mixed = reference.first("mixed-citation");
    let structured = reference.first("element-citation").or(mixed);

    let raw_text = mixed.or(structured).and_then(Element::non_empty_text);

    let basic_metadata = structured
        .map(|citation| {
            let mut external_ids = BTreeMap::new();
            for id in citation.all("pub-id") {
                if let (Some(kind), Some(value)) = (id.attribute("pub-id-type"), id.non_empty_text())
                {
                    external_ids.insert(kind.to_string(), value);
                }
            }
            ReferenceBasicMetadata {
                title: citation.first("article-title").and_then(Element::non_empty_text),
                authors: citation
                    .all("string-name")
                    .chain(citation.all("name"))
                    .filter_map(name_text)
                    .collect(),
                source: citation.first("source").and_then(Element::non_empty_text),
                year: citation.first("year").and_then(Element::non_empty_text),
                volume: citation.first("volume").and_then(Element::non_empty_text),
                issue: citation.first("issue").and_then(Element::non_empty_text),
                pages: page_range(citation),
                external_ids,
            }
        })
        .unwrap_or_default();

    ReferenceMetadata {
        position,
        raw_text,
        basic_metadata,
    }
}
