//! Owned, mutable XML tree for the WordprocessingML document part.
//!
//! The tree keeps qualified names verbatim (`w:p`, `w:r`, ...) and carries
//! anything it does not model (declarations, comments, processing
//! instructions, CDATA) through as raw text so untouched markup serialises
//! back unchanged apart from entity normalisation.

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::Error;

/// Tag and attribute names used by the paragraph model.
pub mod tags {
    pub const PARAGRAPH: &str = "w:p";
    pub const RUN: &str = "w:r";
    pub const TEXT: &str = "w:t";
    pub const RUN_PROPERTIES: &str = "w:rPr";
    pub const HIGHLIGHT: &str = "w:highlight";
    pub const VALUE_ATTR: &str = "w:val";
    pub const SPACE_ATTR: &str = "xml:space";
    pub const PRESERVE: &str = "preserve";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Raw(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write_to(out),
            Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
            Node::Raw(raw) => out.push_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Updates an existing attribute in place or appends a new one.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Immediate element children, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(el) if el.is(name) => Some(el),
            _ => None,
        })
    }

    /// Concatenated character data of this element and all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Concatenated text of every descendant element named `name`, at any depth.
    pub fn descendant_text(&self, name: &str) -> String {
        let mut out = String::new();
        collect_named_text(self, name, &mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Element(inner) => collect_text(inner, out),
            Node::Text(text) => out.push_str(text),
            Node::Raw(raw) => {
                if let Some(data) = raw
                    .strip_prefix("<![CDATA[")
                    .and_then(|rest| rest.strip_suffix("]]>"))
                {
                    out.push_str(data);
                }
            }
        }
    }
}

fn collect_named_text(el: &Element, name: &str, out: &mut String) {
    for inner in el.elements() {
        if inner.is(name) {
            collect_text(inner, out);
        } else {
            collect_named_text(inner, name, out);
        }
    }
}

/// A parsed document part: the top-level node sequence (prolog, root element, epilog).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupTree {
    nodes: Vec<Node>,
}

impl MarkupTree {
    pub fn parse(xml: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(Error::InvalidMarkup(format!(
                        "{e} (near byte {})",
                        reader.buffer_position()
                    )))
                }
            };
            let after = reader.buffer_position() as usize;
            let node = match event {
                Event::Start(start) => {
                    stack.push(element_from(&start)?);
                    continue;
                }
                Event::End(_) => match stack.pop() {
                    Some(el) => Node::Element(el),
                    None => {
                        return Err(Error::InvalidMarkup(format!(
                            "unexpected closing tag near byte {before}"
                        )))
                    }
                },
                Event::Empty(start) => Node::Element(element_from(&start)?),
                Event::Text(text) => Node::Text(
                    text.unescape()
                        .map_err(|e| Error::InvalidMarkup(e.to_string()))?
                        .into_owned(),
                ),
                Event::Eof => break,
                _ => Node::Raw(xml.get(before..after).unwrap_or_default().to_string()),
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::InvalidMarkup(format!(
                "element `{}` is never closed",
                open.name
            )));
        }
        if !nodes.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(Error::InvalidMarkup("document has no root element".into()));
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(Node::as_element)
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_to(&mut out);
        }
        out
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, Error> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::InvalidMarkup(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::InvalidMarkup(e.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}
