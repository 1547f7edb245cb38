//! Read-phase matching of vocabulary keys and flag phrases in one paragraph.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::fragment::{Fragment, ParagraphText};
use crate::registry::PatternRegistry;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Vocabulary,
    FlagPhrase,
}

/// One occurrence, as byte offsets into the paragraph's logical text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub matched_text: String,
    /// Registry key or flag phrase that produced the match.
    pub key: String,
    pub kind: SourceKind,
    /// Default candidate for vocabulary matches; `None` for flag phrases.
    pub substitution: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ParagraphMatches {
    pub vocabulary: Vec<Match>,
    pub flags: Vec<Match>,
}

impl ParagraphMatches {
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty() && self.flags.is_empty()
    }

    /// Occurrences per vocabulary key.
    pub fn term_counts(&self) -> BTreeMap<&str, usize> {
        count_by_key(&self.vocabulary)
    }

    /// Occurrences per flag phrase.
    pub fn flag_counts(&self) -> BTreeMap<&str, usize> {
        count_by_key(&self.flags)
    }
}

fn count_by_key(matches: &[Match]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for m in matches {
        *counts.entry(m.key.as_str()).or_default() += 1;
    }
    counts
}

pub fn match_paragraph(
    fragments: &[Fragment<'_>],
    registry: &PatternRegistry,
    flags_active: bool,
) -> ParagraphMatches {
    let logical = ParagraphText::of(fragments);
    match_text(&logical.text, registry, flags_active)
}

/// Every non-overlapping occurrence of each key, scanned independently per key.
/// Matches of different keys may overlap; the rewriter resolves that.
pub fn match_text(text: &str, registry: &PatternRegistry, flags_active: bool) -> ParagraphMatches {
    let mut out = ParagraphMatches::default();
    if text.is_empty() {
        return out;
    }

    for (key, pattern) in registry.term_patterns() {
        let default = registry
            .candidates_for(key)
            .ok()
            .and_then(|c| c.first())
            .cloned();
        for found in pattern.find_iter(text) {
            out.vocabulary.push(Match {
                start: found.start(),
                end: found.end(),
                matched_text: found.as_str().to_string(),
                key: key.to_string(),
                kind: SourceKind::Vocabulary,
                substitution: default.clone(),
            });
        }
    }

    if flags_active {
        for (phrase, pattern) in registry.phrase_patterns() {
            for found in pattern.find_iter(text) {
                out.flags.push(Match {
                    start: found.start(),
                    end: found.end(),
                    matched_text: found.as_str().to_string(),
                    key: phrase.to_string(),
                    kind: SourceKind::FlagPhrase,
                    substitution: None,
                });
            }
        }
    }

    out
}
