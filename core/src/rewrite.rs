//! Write-phase paragraph rewriting.
//!
//! Pending edits are located in the paragraph's logical text, sorted, made
//! disjoint, and then laid back over the original fragment spans. Text outside
//! an edit is copied through with its fragment's formatting; text inside an
//! edit is emitted as a marked sub-fragment per covered fragment, so an edit
//! spanning several runs keeps each run's own formatting.

use tracing::debug;

use crate::fragment::{Fragment, Marker, ParagraphText, RewrittenFragment};
use crate::registry::PatternRegistry;
use crate::selection::Selections;

/// A pending change over `[start, end)` of the logical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub output: String,
    pub marker: Marker,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphRewrite<'a> {
    pub fragments: Vec<RewrittenFragment<'a>>,
    /// Edits that were applied, in text order.
    pub edits: Vec<Edit>,
    pub overlaps_dropped: usize,
}

impl<'a> ParagraphRewrite<'a> {
    pub fn is_unchanged(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    /// The rewritten pieces cut from source fragment `source`, in order.
    pub fn pieces_of(&self, source: usize) -> &[RewrittenFragment<'a>] {
        let lo = self.fragments.partition_point(|f| f.source < source);
        let hi = self.fragments.partition_point(|f| f.source <= source);
        &self.fragments[lo..hi]
    }

    /// Whether any edit touched source fragment `source`.
    pub fn touches(&self, source: usize) -> bool {
        self.pieces_of(source).iter().any(|f| f.marker.is_some())
    }
}

pub fn rewrite_paragraph<'a>(
    fragments: &[Fragment<'a>],
    registry: &PatternRegistry,
    selections: &Selections,
    flags_active: bool,
) -> ParagraphRewrite<'a> {
    let logical = ParagraphText::of(fragments);
    let planned = plan_edits(&logical.text, registry, selections, flags_active);
    let (edits, overlaps_dropped) = resolve_overlaps(planned);
    if overlaps_dropped > 0 {
        debug!(overlaps_dropped, "dropped edits overlapping an earlier match");
    }
    ParagraphRewrite {
        fragments: apply_edits(fragments, &logical, &edits),
        edits,
        overlaps_dropped,
    }
}

/// Substitutions for every selected key, then flag highlights when active,
/// stably sorted by start offset.
pub fn plan_edits(
    text: &str,
    registry: &PatternRegistry,
    selections: &Selections,
    flags_active: bool,
) -> Vec<Edit> {
    let mut edits = Vec::new();
    if text.is_empty() {
        return edits;
    }
    for (key, pattern) in registry.term_patterns() {
        let Some(choice) = selections.get(key) else {
            continue;
        };
        for found in pattern.find_iter(text) {
            edits.push(Edit {
                start: found.start(),
                end: found.end(),
                output: choice.to_string(),
                marker: Marker::Substituted,
                key: key.to_string(),
            });
        }
    }
    if flags_active {
        for (phrase, pattern) in registry.phrase_patterns() {
            for found in pattern.find_iter(text) {
                edits.push(Edit {
                    start: found.start(),
                    end: found.end(),
                    output: found.as_str().to_string(),
                    marker: Marker::Flagged,
                    key: phrase.to_string(),
                });
            }
        }
    }
    edits.sort_by_key(|e| e.start);
    edits
}

/// Earlier start wins; an edit beginning before the previous kept edit ends is dropped.
/// Input must be sorted by start.
pub fn resolve_overlaps(edits: Vec<Edit>) -> (Vec<Edit>, usize) {
    let mut kept: Vec<Edit> = Vec::with_capacity(edits.len());
    let mut dropped = 0;
    for edit in edits {
        if edit.start >= edit.end || kept.last().is_some_and(|prev| edit.start < prev.end) {
            dropped += 1;
            continue;
        }
        kept.push(edit);
    }
    (kept, dropped)
}

/// Lays disjoint, sorted edits over the fragment spans.
pub fn apply_edits<'a>(
    fragments: &[Fragment<'a>],
    logical: &ParagraphText,
    edits: &[Edit],
) -> Vec<RewrittenFragment<'a>> {
    let text = logical.text.as_str();
    let mut out = Vec::with_capacity(fragments.len() + edits.len() * 2);
    let mut next = 0;

    for (idx, (fragment, span)) in fragments.iter().zip(&logical.spans).enumerate() {
        let formatting = fragment.formatting;
        let local = |from: usize, to: usize| from - span.start..to - span.start;
        if span.is_empty() {
            out.push(RewrittenFragment::copied("", formatting).from_source(idx, 0..0));
            continue;
        }

        let mut pos = span.start;
        while pos < span.end {
            while next < edits.len() && edits[next].end <= pos {
                next += 1;
            }
            match edits.get(next) {
                Some(edit) if edit.start < span.end => {
                    if pos < edit.start {
                        out.push(
                            RewrittenFragment::copied(&text[pos..edit.start], formatting)
                                .from_source(idx, local(pos, edit.start)),
                        );
                        pos = edit.start;
                    }
                    let piece_end = edit.end.min(span.end);
                    let piece = output_piece(edit, text, pos, piece_end);
                    out.push(
                        RewrittenFragment::marked(piece, formatting, edit.marker)
                            .from_source(idx, local(pos, piece_end)),
                    );
                    pos = piece_end;
                }
                _ => {
                    out.push(
                        RewrittenFragment::copied(&text[pos..span.end], formatting)
                            .from_source(idx, local(pos, span.end)),
                    );
                    pos = span.end;
                }
            }
        }
    }

    out
}

/// The part of `edit.output` that belongs to the matched bytes `[from, to)`.
///
/// The output is divided in proportion to the characters of the match each
/// piece covers; pieces of one edit concatenate back to the full output.
fn output_piece<'e>(edit: &'e Edit, text: &str, from: usize, to: usize) -> &'e str {
    let total = text[edit.start..edit.end].chars().count().max(1);
    let before = text[edit.start..from].chars().count();
    let through = text[edit.start..to].chars().count();
    let output_len = edit.output.chars().count();

    let lo = output_len * before / total;
    let hi = if to >= edit.end {
        output_len
    } else {
        output_len * through / total
    };
    let start = char_to_byte(&edit.output, lo);
    let end = char_to_byte(&edit.output, hi);
    &edit.output[start..end]
}

fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Element;
    use crate::registry::{default_registry, TermEntry};

    fn texts(rewrite: &ParagraphRewrite<'_>) -> Vec<String> {
        rewrite.fragments.iter().map(|f| f.text.clone()).collect()
    }

    fn select(pairs: &[(&str, &str)]) -> Selections {
        let mut selections = Selections::new();
        for (key, candidate) in pairs {
            selections.choose(default_registry(), key, candidate).unwrap();
        }
        selections
    }

    fn edit(start: usize, end: usize, output: &str) -> Edit {
        Edit {
            start,
            end,
            output: output.into(),
            marker: Marker::Substituted,
            key: "k".into(),
        }
    }

    #[test]
    fn unmatched_paragraph_is_preserved_exactly() {
        let fragments = vec![
            Fragment::new("  Nothing to ", None),
            Fragment::new("see here.\t", None),
        ];
        let selections = select(&[("Best", "Perfect")]);
        let rewrite = rewrite_paragraph(&fragments, default_registry(), &selections, true);
        assert!(rewrite.is_unchanged());
        assert_eq!(rewrite.text(), "  Nothing to see here.\t");
        assert_eq!(texts(&rewrite), vec!["  Nothing to ", "see here.\t"]);
    }

    #[test]
    fn zero_selections_without_flags_round_trips() {
        let bold = Element::new("w:rPr").with_child(Element::new("w:b"));
        let fragments = vec![
            Fragment::new("The Best ", Some(&bold)),
            Fragment::new("wherein all", None),
        ];
        let rewrite =
            rewrite_paragraph(&fragments, default_registry(), &Selections::new(), false);
        assert!(rewrite.is_unchanged());
        assert_eq!(texts(&rewrite), vec!["The Best ", "wherein all"]);
        assert_eq!(rewrite.fragments[0].formatting, Some(&bold));
        assert!(rewrite.fragments.iter().all(|f| f.marker.is_none()));
    }

    #[test]
    fn cross_fragment_match_splits_per_original_fragment() {
        let first = Element::new("w:rPr").with_child(Element::new("w:i"));
        let second = Element::new("w:rPr").with_child(Element::new("w:b"));
        let third = Element::new("w:rPr").with_child(Element::new("w:u"));
        let fragments = vec![
            Fragment::new("Thi", Some(&first)),
            Fragment::new("s is Bes", Some(&second)),
            Fragment::new("t", Some(&third)),
        ];
        let selections = select(&[("Best", "Perfect")]);
        let rewrite = rewrite_paragraph(&fragments, default_registry(), &selections, false);

        assert_eq!(texts(&rewrite), vec!["Thi", "s is ", "Perfe", "ct"]);
        assert_eq!(rewrite.text(), "This is Perfect");
        assert_eq!(rewrite.fragments[1].formatting, Some(&second));
        assert_eq!(rewrite.fragments[1].marker, None);
        assert_eq!(rewrite.fragments[2].formatting, Some(&second));
        assert_eq!(rewrite.fragments[2].marker, Some(Marker::Substituted));
        assert_eq!(rewrite.fragments[3].formatting, Some(&third));
        assert_eq!(rewrite.fragments[3].marker, Some(Marker::Substituted));
    }

    #[test]
    fn pieces_remember_their_source_fragment_and_range() {
        let fragments = vec![
            Fragment::new("Thi", None),
            Fragment::new("s is Bes", None),
            Fragment::new("t", None),
        ];
        let selections = select(&[("Best", "Perfect")]);
        let rewrite = rewrite_paragraph(&fragments, default_registry(), &selections, false);

        let sources: Vec<(usize, std::ops::Range<usize>)> = rewrite
            .fragments
            .iter()
            .map(|f| (f.source, f.source_range.clone()))
            .collect();
        assert_eq!(sources, vec![(0, 0..3), (1, 0..5), (1, 5..8), (2, 0..1)]);
        assert_eq!(rewrite.pieces_of(1).len(), 2);
        assert!(!rewrite.touches(0));
        assert!(rewrite.touches(1));
        assert!(rewrite.touches(2));
        assert!(rewrite.pieces_of(3).is_empty());
    }

    #[test]
    fn flagged_phrase_keeps_original_characters_per_fragment() {
        let fragments = vec![Fragment::new("where", None), Fragment::new("in the", None)];
        let rewrite =
            rewrite_paragraph(&fragments, default_registry(), &Selections::new(), true);
        assert_eq!(texts(&rewrite), vec!["where", "in", " the"]);
        assert_eq!(rewrite.fragments[0].marker, Some(Marker::Flagged));
        assert_eq!(rewrite.fragments[1].marker, Some(Marker::Flagged));
        assert_eq!(rewrite.fragments[2].marker, None);
        assert!(rewrite.fragments[2].preserve_whitespace);
    }

    #[test]
    fn earlier_overlapping_edit_wins() {
        let fragments = vec![Fragment::new("Characterized By Necessity today", None)];
        let selections = select(&[
            ("Characterized By", "Defined by"),
            ("By Necessity", "Obligatory"),
        ]);
        let rewrite = rewrite_paragraph(&fragments, default_registry(), &selections, false);
        assert_eq!(rewrite.overlaps_dropped, 1);
        assert_eq!(rewrite.edits.len(), 1);
        assert_eq!(rewrite.edits[0].key, "Characterized By");
        assert_eq!(rewrite.text(), "Defined by Necessity today");
        let original = "Characterized By Necessity today";
        assert_eq!(
            rewrite.text().len(),
            original.len() - "Characterized By".len() + "Defined by".len()
        );
    }

    #[test]
    fn resolve_overlaps_drops_later_starts_inside_kept_span() {
        let (kept, dropped) =
            resolve_overlaps(vec![edit(0, 5, "a"), edit(3, 8, "b"), edit(5, 6, "c")]);
        assert_eq!(dropped, 1);
        let spans: Vec<(usize, usize)> = kept.iter().map(|e| (e.start, e.end)).collect();
        assert_eq!(spans, vec![(0, 5), (5, 6)]);
    }

    #[test]
    fn empty_output_still_emits_marked_fragment() {
        let registry = crate::registry::PatternRegistry::new(
            vec![TermEntry::new("very", &[""])],
            Vec::new(),
        )
        .unwrap();
        let mut selections = Selections::new();
        selections.choose(&registry, "very", "").unwrap();
        let fragments = vec![Fragment::new("a very good day", None)];
        let rewrite = rewrite_paragraph(&fragments, &registry, &selections, false);
        assert_eq!(texts(&rewrite), vec!["a ", "", " good day"]);
        assert_eq!(rewrite.fragments[1].marker, Some(Marker::Substituted));
    }

    #[test]
    fn whitespace_flag_is_derived_from_new_text() {
        let mut source = Fragment::new("All systems", None);
        source.preserve_whitespace = true;
        let selections = select(&[("All", "Every single")]);
        let rewrite = rewrite_paragraph(&[source], default_registry(), &selections, false);
        assert_eq!(texts(&rewrite), vec!["Every single", " systems"]);
        assert!(!rewrite.fragments[0].preserve_whitespace);
        assert!(rewrite.fragments[1].preserve_whitespace);
    }

    #[test]
    fn empty_fragments_survive_with_their_formatting() {
        let props = Element::new("w:rPr");
        let fragments = vec![
            Fragment::new("", Some(&props)),
            Fragment::new("Best", None),
        ];
        let selections = select(&[("Best", "Ace")]);
        let rewrite = rewrite_paragraph(&fragments, default_registry(), &selections, false);
        assert_eq!(texts(&rewrite), vec!["", "Ace"]);
        assert_eq!(rewrite.fragments[0].formatting, Some(&props));
    }

    #[test]
    fn output_pieces_concatenate_to_full_replacement() {
        let text = "abcdefgh";
        let e = edit(1, 7, "XYZ");
        let pieces = [
            output_piece(&e, text, 1, 2),
            output_piece(&e, text, 2, 5),
            output_piece(&e, text, 5, 7),
        ];
        assert_eq!(pieces.concat(), "XYZ");
    }
}
