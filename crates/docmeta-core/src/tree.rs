//! NLM/JATS-shaped document tree produced by content analyzers.
//!
//! The tree is a plain element/text structure. It can be parsed from and
//! written back to XML, which is how analyzers that emit NLM directly plug in
//! and how trees are logged for debugging.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::encoding::Decoder;
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentTreeError {
    #[error("malformed document tree at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("document tree has no root element")]
    Empty,
    #[error("unexpected document root <{found}>, expected <article>")]
    UnexpectedRoot { found: String },
    #[error("failed to serialize document tree: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder: append a child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder: append a text node.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn first(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// Follow a chain of child names, taking the first match at each step.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .try_fold(self, |current, name| current.first(name))
    }

    /// All descendant text, whitespace runs collapsed to single spaces.
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Text content, or `None` when it is empty.
    pub fn non_empty_text(&self) -> Option<String> {
        let text = self.text_content();
        (!text.is_empty()).then_some(text)
    }
}

/// A complete analyzer result rooted at a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTree {
    root: Element,
}

impl DocumentTree {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Parse an XML document.
    ///
    /// Whitespace-only text containing a line break is treated as
    /// indentation and dropped; other text is kept verbatim so mixed content
    /// such as `<given-names>A</given-names> <surname>B</surname>` keeps its
    /// separating space.
    pub fn parse_xml(xml: &str) -> Result<Self, DocumentTreeError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let malformed = |message: String| DocumentTreeError::Malformed { position, message };

            let event = reader.read_event().map_err(|e| malformed(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    stack.push(element_from_start(&start, reader.decoder(), position)?)
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start, reader.decoder(), position)?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| malformed("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|e| malformed(e.to_string()))?;
                    if let Some(parent) = stack.last_mut()
                        && !is_indentation(&value)
                    {
                        parent.children.push(Node::Text(value.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::Text(value));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentTreeError::Malformed {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element <{}>", open.name),
            });
        }
        root.map(DocumentTree::new).ok_or(DocumentTreeError::Empty)
    }

    /// Serialize as indented XML.
    pub fn to_xml(&self) -> Result<String, DocumentTreeError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_element(&mut writer, &self.root)?;
        String::from_utf8(writer.into_inner()).map_err(serialize_error)
    }
}

fn is_indentation(text: &str) -> bool {
    text.contains('\n') && text.trim().is_empty()
}

fn element_from_start(
    start: &BytesStart<'_>,
    decoder: Decoder,
    position: u64,
) -> Result<Element, DocumentTreeError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| DocumentTreeError::Malformed {
            position,
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .decode_and_unescape_value(decoder)
            .map_err(|e| DocumentTreeError::Malformed {
                position,
                message: e.to_string(),
            })?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<(), DocumentTreeError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(DocumentTreeError::Malformed {
            position,
            message: format!("second root element <{}>", element.name),
        });
    }
    *root = Some(element);
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), DocumentTreeError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(serialize_error)?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(serialize_error)?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(serialize_error)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(serialize_error)?;
    Ok(())
}

fn serialize_error(e: impl std::fmt::Display) -> DocumentTreeError {
    DocumentTreeError::Serialize(e.to_string())
}
