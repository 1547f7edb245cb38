//! docswap core engine.
//! Finds predefined vocabulary and claim-specific phrases in the body text of
//! a `.docx` document and rewrites it with chosen substitutions, highlighting
//! every change while keeping run formatting intact.

pub mod fragment;
pub mod markup;
pub mod matcher;
pub mod package;
pub mod registry;
pub mod rewrite;
pub mod selection;
pub mod summary;
pub mod walk;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use fragment::{
    fragments_of, rebuild_run, Fragment, HighlightPalette, Marker, RewrittenFragment,
};
pub use markup::{Element, MarkupTree, Node};
pub use matcher::{match_paragraph, Match, ParagraphMatches, SourceKind};
pub use package::{DocxPackage, DOCUMENT_ENTRY};
pub use registry::{default_registry, PatternRegistry, TermEntry};
pub use rewrite::{rewrite_paragraph, Edit, ParagraphRewrite};
pub use selection::Selections;
pub use walk::{SectionTracker, DEFAULT_SECTION_HEADING};

use markup::tags;
use walk::{walk_paragraphs, walk_paragraphs_mut};

/// Failure and outcome kinds surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a readable .docx container: {0}")]
    InvalidContainer(#[source] zip::result::ZipError),
    #[error("invalid .docx file: missing {0}")]
    MissingRequiredEntry(String),
    #[error("no predefined words or claim-specific terms found in the document")]
    NoMatchesFound,
    #[error("malformed document markup: {0}")]
    InvalidMarkup(String),
    #[error("unknown vocabulary term `{0}`")]
    UnknownTerm(String),
    #[error("`{candidate}` is not a replacement option for `{term}`")]
    UnknownCandidate { term: String, candidate: String },
    #[error("invalid vocabulary: {0}")]
    InvalidRegistry(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vocabulary: Vec<TermEntry>,
    pub flag_phrases: Vec<String>,
    /// `false` turns the engine into plain vocabulary replacement.
    pub flag_phrases_enabled: bool,
    pub section_heading: String,
    pub highlight: HighlightPalette,
    pub document_entry: String,
    pub ignore_globs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocabulary: registry::builtin_terms(),
            flag_phrases: registry::builtin_flag_phrases(),
            flag_phrases_enabled: true,
            section_heading: DEFAULT_SECTION_HEADING.into(),
            highlight: HighlightPalette::default(),
            document_entry: DOCUMENT_ENTRY.into(),
            ignore_globs: Vec::new(),
        }
    }
}

/// Read-phase result: what was found and how often.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    pub term_counts: BTreeMap<String, usize>,
    /// Matched vocabulary keys in order of first discovery.
    pub matched_terms: Vec<String>,
    pub flag_counts: BTreeMap<String, usize>,
    pub matched_flags: Vec<String>,
    pub paragraphs_scanned: usize,
    pub section_found: bool,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.matched_terms.is_empty() && self.matched_flags.is_empty()
    }

    pub fn total_terms(&self) -> usize {
        self.term_counts.values().sum()
    }

    pub fn total_flags(&self) -> usize {
        self.flag_counts.values().sum()
    }

    fn record(&mut self, matches: &ParagraphMatches) {
        for m in &matches.vocabulary {
            *self.term_counts.entry(m.key.clone()).or_default() += 1;
            if !self.matched_terms.contains(&m.key) {
                self.matched_terms.push(m.key.clone());
            }
        }
        for m in &matches.flags {
            *self.flag_counts.entry(m.key.clone()).or_default() += 1;
            if !self.matched_flags.contains(&m.key) {
                self.matched_flags.push(m.key.clone());
            }
        }
    }
}

/// Write-phase counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewriteStats {
    pub paragraphs_rewritten: usize,
    pub substitutions: BTreeMap<String, usize>,
    pub flags_highlighted: usize,
    pub overlaps_dropped: usize,
}

impl RewriteStats {
    pub fn total_substitutions(&self) -> usize {
        self.substitutions.values().sum()
    }

    fn record(&mut self, rewrite: &ParagraphRewrite<'_>) {
        self.paragraphs_rewritten += 1;
        self.overlaps_dropped += rewrite.overlaps_dropped;
        for edit in &rewrite.edits {
            match edit.marker {
                Marker::Substituted => {
                    *self.substitutions.entry(edit.key.clone()).or_default() += 1;
                }
                Marker::Flagged => self.flags_highlighted += 1,
            }
        }
    }
}

/// Rewritten container bytes plus what changed.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub bytes: Vec<u8>,
    pub stats: RewriteStats,
}

/// Engine holds the compiled registry and runs both phases with identical
/// traversal and section gating.
pub struct Engine {
    config: Config,
    registry: PatternRegistry,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, Error> {
        let registry =
            PatternRegistry::new(config.vocabulary.clone(), config.flag_phrases.clone())?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    fn flags_active(&self, in_section: bool) -> bool {
        self.config.flag_phrases_enabled && in_section
    }

    /// Read phase over a `.docx` buffer.
    pub fn scan(&self, bytes: &[u8]) -> Result<ScanReport, Error> {
        let mut package = DocxPackage::read(bytes)?;
        let xml = package.entry_text(&self.config.document_entry)?;
        self.scan_markup(&xml)
    }

    /// Read phase over the document markup. An empty result is `NoMatchesFound`.
    pub fn scan_markup(&self, xml: &str) -> Result<ScanReport, Error> {
        let tree = MarkupTree::parse(xml)?;
        let report = self.scan_tree(&tree);
        if report.is_empty() {
            return Err(Error::NoMatchesFound);
        }
        Ok(report)
    }

    pub fn scan_tree(&self, tree: &MarkupTree) -> ScanReport {
        let mut tracker = SectionTracker::new(&self.config.section_heading);
        let mut report = ScanReport::default();
        walk_paragraphs(tree.nodes(), &mut tracker, &mut |paragraph, in_section| {
            let fragments = fragments_of(paragraph);
            if fragments.is_empty() {
                return;
            }
            report.paragraphs_scanned += 1;
            let matches = match_paragraph(&fragments, &self.registry, self.flags_active(in_section));
            if !matches.is_empty() {
                debug!(
                    terms = matches.vocabulary.len(),
                    flags = matches.flags.len(),
                    in_section,
                    "paragraph matched"
                );
            }
            report.record(&matches);
        });
        report.section_found = tracker.is_inside();
        info!(
            paragraphs = report.paragraphs_scanned,
            terms = report.total_terms(),
            flags = report.total_flags(),
            "scan complete"
        );
        report
    }

    /// Write phase over a `.docx` buffer. Only the document entry changes.
    pub fn apply(&self, bytes: &[u8], selections: &Selections) -> Result<ApplyOutcome, Error> {
        let mut package = DocxPackage::read(bytes)?;
        let xml = package.entry_text(&self.config.document_entry)?;
        let (rewritten, stats) = self.apply_markup(&xml, selections)?;
        let bytes = package.replace_entry(&self.config.document_entry, rewritten.as_bytes())?;
        Ok(ApplyOutcome { bytes, stats })
    }

    pub fn apply_markup(
        &self,
        xml: &str,
        selections: &Selections,
    ) -> Result<(String, RewriteStats), Error> {
        let mut tree = MarkupTree::parse(xml)?;
        let stats = self.rewrite_tree(&mut tree, selections);
        Ok((tree.to_xml(), stats))
    }

    pub fn rewrite_tree(&self, tree: &mut MarkupTree, selections: &Selections) -> RewriteStats {
        let mut tracker = SectionTracker::new(&self.config.section_heading);
        let mut stats = RewriteStats::default();
        let palette = &self.config.highlight;
        walk_paragraphs_mut(tree.nodes_mut(), &mut tracker, &mut |paragraph, in_section| {
            let replacements = {
                let fragments = fragments_of(paragraph);
                if fragments.is_empty() {
                    return;
                }
                let rewrite = rewrite_paragraph(
                    &fragments,
                    &self.registry,
                    selections,
                    self.flags_active(in_section),
                );
                if rewrite.is_unchanged() {
                    return;
                }
                stats.record(&rewrite);
                paragraph
                    .elements()
                    .filter(|el| el.is(tags::RUN))
                    .enumerate()
                    .map(|(idx, run)| {
                        rewrite
                            .touches(idx)
                            .then(|| rebuild_run(run, rewrite.pieces_of(idx), palette))
                    })
                    .collect::<Vec<_>>()
            };
            splice_runs(paragraph, replacements);
        });
        info!(
            paragraphs = stats.paragraphs_rewritten,
            substitutions = stats.total_substitutions(),
            flags = stats.flags_highlighted,
            "rewrite complete"
        );
        stats
    }
}

/// Swaps each immediate run for its replacement runs, in place. `replacements`
/// holds one entry per immediate run; `None` keeps the run as it was.
fn splice_runs(paragraph: &mut Element, replacements: Vec<Option<Vec<Element>>>) {
    let mut replacements = replacements.into_iter();
    for node in std::mem::take(&mut paragraph.children) {
        match node {
            Node::Element(run) if run.is(tags::RUN) => match replacements.next().flatten() {
                Some(runs) => paragraph
                    .children
                    .extend(runs.into_iter().map(Node::Element)),
                None => paragraph.children.push(Node::Element(run)),
            },
            other => paragraph.children.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(Config::default()).unwrap()
    }

    fn document(paragraphs: &[&str]) -> String {
        let mut xml = String::from(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        );
        for text in paragraphs {
            xml.push_str(&format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#));
        }
        xml.push_str("</w:body></w:document>");
        xml
    }

    #[test]
    fn section_gating_counts_flags_only_after_heading() {
        let xml = document(&[
            "Summary",
            "wherein X",
            "Detailed Description",
            "wherein Y",
            "Conclusion",
            "wherein Z",
            "Detailed Description",
        ]);
        let report = engine().scan_markup(&xml).unwrap();
        assert_eq!(report.flag_counts.get("wherein"), Some(&2));
        assert_eq!(report.matched_flags, vec!["wherein".to_string()]);
        assert!(report.section_found);
        assert_eq!(report.paragraphs_scanned, 5);
    }

    #[test]
    fn disabled_flag_phrases_never_match() {
        let mut cfg = Config::default();
        cfg.flag_phrases_enabled = false;
        let engine = Engine::new(cfg).unwrap();
        let xml = document(&["Detailed Description", "wherein the best part"]);
        let report = engine.scan_markup(&xml).unwrap();
        assert!(report.flag_counts.is_empty());
        assert_eq!(report.term_counts.get("Best"), Some(&1));
    }

    #[test]
    fn matched_terms_keep_discovery_order() {
        let xml = document(&["Every widget", "All of it is the Best", "every day"]);
        let report = engine().scan_markup(&xml).unwrap();
        assert_eq!(report.matched_terms, vec!["Every", "All", "Best"]);
        assert_eq!(report.term_counts.get("Every"), Some(&2));
    }

    #[test]
    fn empty_document_is_no_matches_found() {
        let xml = document(&["Nothing of note."]);
        assert!(matches!(engine().scan_markup(&xml), Err(Error::NoMatchesFound)));
    }

    #[test]
    fn apply_rewrites_and_highlights() {
        let engine = engine();
        let xml = document(&["Detailed Description", "The Best widget wherein parts fit"]);
        let report = engine.scan_markup(&xml).unwrap();
        let selections = Selections::defaults(engine.registry(), &report);
        let (out, stats) = engine.apply_markup(&xml, &selections).unwrap();

        assert!(out.contains(r#"<w:highlight w:val="yellow"/></w:rPr><w:t>Perfect</w:t>"#));
        assert!(out.contains(r#"<w:highlight w:val="red"/></w:rPr><w:t>wherein</w:t>"#));
        assert_eq!(stats.paragraphs_rewritten, 1);
        assert_eq!(stats.substitutions.get("Best"), Some(&1));
        assert_eq!(stats.flags_highlighted, 1);

        let tree = MarkupTree::parse(&out).unwrap();
        let text = tree.root().unwrap().descendant_text(tags::TEXT);
        assert_eq!(text, "Detailed DescriptionThe Perfect widget wherein parts fit");
    }

    #[test]
    fn untouched_paragraphs_serialise_unchanged() {
        let xml = document(&["Plain text only.", "The Best"]);
        let mut selections = Selections::new();
        selections.choose(default_registry(), "Best", "Ace").unwrap();
        let (out, _) = engine().apply_markup(&xml, &selections).unwrap();
        assert!(out.contains(r#"<w:p><w:r><w:t xml:space="preserve">Plain text only.</w:t></w:r></w:p>"#));
    }

    #[test]
    fn splice_replaces_each_run_where_it_stood() {
        let mut paragraph = Element::new(tags::PARAGRAPH)
            .with_child(Element::new("w:pPr"))
            .with_child(Element::new(tags::RUN).with_attribute("id", "a"))
            .with_child(Element::new("w:bookmarkStart"))
            .with_child(Element::new(tags::RUN).with_attribute("id", "b"));
        splice_runs(
            &mut paragraph,
            vec![
                None,
                Some(vec![
                    Element::new(tags::RUN).with_attribute("id", "b1"),
                    Element::new(tags::RUN).with_attribute("id", "b2"),
                ]),
            ],
        );
        let layout: Vec<(&str, Option<&str>)> = paragraph
            .elements()
            .map(|e| (e.name.as_str(), e.attribute("id")))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("w:pPr", None),
                ("w:r", Some("a")),
                ("w:bookmarkStart", None),
                ("w:r", Some("b1")),
                ("w:r", Some("b2")),
            ]
        );
    }

    #[test]
    fn runs_after_a_hyperlink_stay_after_it() {
        let xml = concat!(
            r#"<w:document><w:body><w:p>"#,
            r#"<w:r><w:t xml:space="preserve">Click </w:t></w:r>"#,
            r#"<w:hyperlink r:id="rId5"><w:r><w:t>here</w:t></w:r></w:hyperlink>"#,
            r#"<w:r><w:t xml:space="preserve"> for the Best</w:t></w:r>"#,
            r#"</w:p></w:body></w:document>"#,
        );
        let mut selections = Selections::new();
        selections.choose(default_registry(), "Best", "Ace").unwrap();
        let (out, _) = engine().apply_markup(xml, &selections).unwrap();
        let tree = MarkupTree::parse(&out).unwrap();
        let text = tree.root().unwrap().descendant_text(tags::TEXT);
        assert_eq!(text, "Click here for the Ace");
        assert!(out.contains(r#"<w:r><w:t xml:space="preserve">Click </w:t></w:r><w:hyperlink"#));
    }

    #[test]
    fn config_accepts_partial_yaml() {
        let cfg: Config = serde_yaml::from_str(
            "section_heading: Claims\nvocabulary:\n  - term: Huge\n    candidates: [Large]\n",
        )
        .unwrap();
        assert_eq!(cfg.section_heading, "Claims");
        assert_eq!(cfg.vocabulary.len(), 1);
        assert_eq!(cfg.flag_phrases.len(), 5);
        assert_eq!(cfg.highlight.flagged, "red");
    }

    #[test]
    fn report_serialises_for_automation() {
        let xml = document(&["All good"]);
        let report = engine().scan_markup(&xml).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["term_counts"]["All"], 1);
        assert_eq!(json["matched_terms"][0], "All");
    }
}
