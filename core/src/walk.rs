//! Section tracking and document-order paragraph traversal.

use tracing::debug;

use crate::markup::{tags, Element, Node};

pub const DEFAULT_SECTION_HEADING: &str = "Detailed Description";

/// What the walker should do with one paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphGate {
    /// The paragraph is the section heading; it is not matched.
    Heading,
    Body { in_section: bool },
}

/// One-way switch flipped by the section heading paragraph.
///
/// Once inside, every later paragraph counts as inside; a repeated heading
/// is skipped again but never resets the state.
#[derive(Debug, Clone)]
pub struct SectionTracker {
    heading: String,
    inside: bool,
}

impl SectionTracker {
    pub fn new(heading: &str) -> Self {
        Self {
            heading: heading.trim().to_lowercase(),
            inside: false,
        }
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// Classifies a paragraph by its full text, entering the section on the heading.
    pub fn observe(&mut self, paragraph_text: &str) -> ParagraphGate {
        if !self.heading.is_empty() && paragraph_text.trim().to_lowercase() == self.heading {
            if !self.inside {
                debug!(heading = %paragraph_text.trim(), "entering target section");
            }
            self.inside = true;
            return ParagraphGate::Heading;
        }
        ParagraphGate::Body {
            in_section: self.inside,
        }
    }
}

impl Default for SectionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_HEADING)
    }
}

fn gate(paragraph: &Element, tracker: &mut SectionTracker) -> ParagraphGate {
    tracker.observe(&paragraph.descendant_text(tags::TEXT))
}

/// Depth-first, pre-order walk. Paragraphs are visited as units and never
/// descended into; heading paragraphs are consumed by the tracker.
pub fn walk_paragraphs<F>(nodes: &[Node], tracker: &mut SectionTracker, visit: &mut F)
where
    F: FnMut(&Element, bool),
{
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        if el.is(tags::PARAGRAPH) {
            if let ParagraphGate::Body { in_section } = gate(el, tracker) {
                visit(el, in_section);
            }
            continue;
        }
        walk_paragraphs(&el.children, tracker, visit);
    }
}

/// Same traversal and gating as [`walk_paragraphs`], with mutable access.
pub fn walk_paragraphs_mut<F>(nodes: &mut [Node], tracker: &mut SectionTracker, visit: &mut F)
where
    F: FnMut(&mut Element, bool),
{
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        if el.is(tags::PARAGRAPH) {
            if let ParagraphGate::Body { in_section } = gate(el, tracker) {
                visit(el, in_section);
            }
            continue;
        }
        walk_paragraphs_mut(&mut el.children, tracker, visit);
    }
}
