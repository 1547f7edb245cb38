//! Paragraph-as-fragments model.
//!
//! A paragraph is read as the ordered list of its immediate runs. Each run
//! contributes exactly one [`Fragment`], even when its text is split over
//! several text leaves or is empty, so run formatting is never dropped.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::markup::{tags, Element, Node};

/// One formatted run of a paragraph.
///
/// `formatting` borrows the run-properties element from the source tree; it is
/// only cloned when a rewritten run is materialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub text: String,
    pub preserve_whitespace: bool,
    pub formatting: Option<&'a Element>,
}

impl<'a> Fragment<'a> {
    /// A fragment whose whitespace flag is derived from its own text.
    pub fn new(text: impl Into<String>, formatting: Option<&'a Element>) -> Self {
        let text = text.into();
        Self {
            preserve_whitespace: has_edge_whitespace(&text),
            text,
            formatting,
        }
    }
}

pub fn has_edge_whitespace(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// Builds the fragment list from the paragraph's immediate run children.
pub fn fragments_of(paragraph: &Element) -> Vec<Fragment<'_>> {
    paragraph
        .elements()
        .filter(|el| el.is(tags::RUN))
        .map(|run| {
            let mut text = String::new();
            let mut declared_preserve = false;
            for leaf in run.elements().filter(|el| el.is(tags::TEXT)) {
                if leaf.attribute(tags::SPACE_ATTR) == Some(tags::PRESERVE) {
                    declared_preserve = true;
                }
                text.push_str(&leaf.text_content());
            }
            Fragment {
                preserve_whitespace: declared_preserve || has_edge_whitespace(&text),
                text,
                formatting: run.child(tags::RUN_PROPERTIES),
            }
        })
        .collect()
}

/// Logical text of a paragraph plus the byte span each fragment occupies in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParagraphText {
    pub text: String,
    pub spans: Vec<Range<usize>>,
}

impl ParagraphText {
    pub fn of(fragments: &[Fragment<'_>]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let start = text.len();
            text.push_str(&fragment.text);
            spans.push(start..text.len());
        }
        Self { text, spans }
    }
}

/// Visual marker attached to a rewritten span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Marker {
    Substituted,
    Flagged,
}

/// Highlight colours applied per marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HighlightPalette {
    pub substituted: String,
    pub flagged: String,
}

impl Default for HighlightPalette {
    fn default() -> Self {
        Self {
            substituted: "yellow".into(),
            flagged: "red".into(),
        }
    }
}

impl HighlightPalette {
    pub fn color_for(&self, marker: Marker) -> &str {
        match marker {
            Marker::Substituted => &self.substituted,
            Marker::Flagged => &self.flagged,
        }
    }
}

/// A fragment emitted by the rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFragment<'a> {
    pub text: String,
    pub preserve_whitespace: bool,
    pub formatting: Option<&'a Element>,
    pub marker: Option<Marker>,
    /// Index of the source fragment this piece was cut from.
    pub source: usize,
    /// Byte range of the piece within the source fragment's original text.
    pub source_range: Range<usize>,
}

impl<'a> RewrittenFragment<'a> {
    pub fn copied(text: impl Into<String>, formatting: Option<&'a Element>) -> Self {
        Self::build(text.into(), formatting, None)
    }

    pub fn marked(text: impl Into<String>, formatting: Option<&'a Element>, marker: Marker) -> Self {
        Self::build(text.into(), formatting, Some(marker))
    }

    fn build(text: String, formatting: Option<&'a Element>, marker: Option<Marker>) -> Self {
        Self {
            preserve_whitespace: has_edge_whitespace(&text),
            text,
            formatting,
            marker,
            source: 0,
            source_range: 0..0,
        }
    }

    pub fn from_source(mut self, source: usize, range: Range<usize>) -> Self {
        self.source = source;
        self.source_range = range;
        self
    }

    /// Materialises the fragment as a `w:r` element: cloned run properties
    /// (highlight added or recoloured when marked) followed by one text leaf.
    pub fn to_run(&self, palette: &HighlightPalette) -> Element {
        let mut run = Element::new(tags::RUN);

        let properties = match (self.formatting, self.marker) {
            (Some(original), marker) => {
                let mut props = original.clone();
                if let Some(marker) = marker {
                    apply_highlight(&mut props, palette.color_for(marker));
                }
                Some(props)
            }
            (None, Some(marker)) => {
                let mut props = Element::new(tags::RUN_PROPERTIES);
                apply_highlight(&mut props, palette.color_for(marker));
                Some(props)
            }
            (None, None) => None,
        };
        if let Some(props) = properties {
            run.children.push(Node::Element(props));
        }

        let mut leaf = Element::new(tags::TEXT);
        if self.preserve_whitespace {
            leaf.set_attribute(tags::SPACE_ATTR, tags::PRESERVE);
        }
        if !self.text.is_empty() {
            leaf.children.push(Node::Text(self.text.clone()));
        }
        run.children.push(Node::Element(leaf));
        run
    }
}

/// Rebuilds one source run from the rewritten pieces cut from it.
///
/// Every piece becomes its own run. Non-text run content (tabs, breaks,
/// drawings, field characters) keeps its offset in the run's text and is
/// emitted in a run of its own carrying the source run's properties. Content
/// that sat inside a replaced span follows the replacement.
pub fn rebuild_run(
    run: &Element,
    pieces: &[RewrittenFragment<'_>],
    palette: &HighlightPalette,
) -> Vec<Element> {
    let formatting = run.child(tags::RUN_PROPERTIES);
    let mut inline = Vec::new();
    let mut offset = 0;
    for node in &run.children {
        match node {
            Node::Element(el) if el.is(tags::RUN_PROPERTIES) => {}
            Node::Element(el) if el.is(tags::TEXT) => offset += el.text_content().len(),
            Node::Element(_) | Node::Raw(_) => inline.push((offset, node)),
            Node::Text(_) => {}
        }
    }

    let mut out = RunSequence {
        runs: Vec::with_capacity(pieces.len() + inline.len()),
        pending: Vec::new(),
        formatting,
    };
    let mut inline = inline.into_iter().peekable();
    for piece in pieces {
        let Range { start, end } = piece.source_range.clone();
        while let Some((_, node)) = inline.next_if(|(at, _)| *at <= start) {
            out.pending.push(node.clone());
        }
        if piece.marker.is_some() {
            out.push(piece.to_run(palette));
            while let Some((_, node)) = inline.next_if(|(at, _)| *at < end) {
                out.pending.push(node.clone());
            }
            continue;
        }
        // Copied text is the original, so it can be cut at the content offsets.
        let mut cursor = start;
        while let Some((at, node)) = inline.next_if(|(at, _)| *at < end) {
            if at > cursor {
                let text = &piece.text[cursor - start..at - start];
                out.push(RewrittenFragment::copied(text, piece.formatting).to_run(palette));
                cursor = at;
            }
            out.pending.push(node.clone());
        }
        if cursor < end {
            let text = &piece.text[cursor - start..];
            out.push(RewrittenFragment::copied(text, piece.formatting).to_run(palette));
        }
    }
    out.pending.extend(inline.map(|(_, node)| node.clone()));
    out.finish()
}

struct RunSequence<'a> {
    runs: Vec<Element>,
    pending: Vec<Node>,
    formatting: Option<&'a Element>,
}

impl RunSequence<'_> {
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut run = Element::new(tags::RUN);
        if let Some(props) = self.formatting {
            run.children.push(Node::Element(props.clone()));
        }
        run.children.append(&mut self.pending);
        self.runs.push(run);
    }

    fn push(&mut self, run: Element) {
        self.flush();
        self.runs.push(run);
    }

    fn finish(mut self) -> Vec<Element> {
        self.flush();
        self.runs
    }
}

fn apply_highlight(properties: &mut Element, color: &str) {
    match properties.child_mut(tags::HIGHLIGHT) {
        Some(existing) => existing.set_attribute(tags::VALUE_ATTR, color),
        None => properties.children.push(Node::Element(
            Element::new(tags::HIGHLIGHT).with_attribute(tags::VALUE_ATTR, color),
        )),
    }
}
