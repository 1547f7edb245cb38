//! Fixed-width plain-text tables for match summaries and confirmation.

use unicode_segmentation::UnicodeSegmentation;

use crate::registry::PatternRegistry;
use crate::selection::Selections;
use crate::ScanReport;

const TERM_WIDTH: usize = 25;
const CANDIDATE_WIDTH: usize = 40;
const COUNT_WIDTH: usize = 10;

/// Pads to `width` grapheme clusters; longer values are left as is.
fn pad_end(value: &str, width: usize) -> String {
    let len = value.graphemes(true).count();
    let mut out = String::with_capacity(value.len() + width.saturating_sub(len));
    out.push_str(value);
    for _ in len..width {
        out.push(' ');
    }
    out
}

fn table(headers: [&str; 3], rows: Vec<[String; 3]>) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!(
        "{}| {}| {}",
        pad_end(headers[0], TERM_WIDTH),
        pad_end(headers[1], CANDIDATE_WIDTH),
        headers[2]
    ));
    lines.push(format!(
        "{}+{}+{}",
        "-".repeat(TERM_WIDTH),
        "-".repeat(CANDIDATE_WIDTH),
        "-".repeat(COUNT_WIDTH)
    ));
    for [first, second, third] in rows {
        lines.push(format!(
            "{}| {}| {}",
            pad_end(&first, TERM_WIDTH),
            pad_end(&second, CANDIDATE_WIDTH),
            pad_end(&third, COUNT_WIDTH)
        ));
    }
    lines.join("\n")
}

/// Matched vocabulary with every candidate and its occurrence count.
pub fn render_term_table(registry: &PatternRegistry, report: &ScanReport) -> String {
    let rows = report
        .matched_terms
        .iter()
        .map(|term| {
            let candidates = registry
                .candidates_for(term)
                .map(|c| c.join(", "))
                .unwrap_or_default();
            let count = report.term_counts.get(term).copied().unwrap_or(0);
            [term.clone(), candidates, count.to_string()]
        })
        .collect();
    table(["Predefined Words", "Alternative Words", "Count"], rows)
}

/// Flag phrases found inside the target section.
pub fn render_flag_table(report: &ScanReport) -> String {
    let rows = report
        .matched_flags
        .iter()
        .map(|phrase| {
            let count = report.flag_counts.get(phrase).copied().unwrap_or(0);
            [phrase.clone(), "highlighted".to_string(), count.to_string()]
        })
        .collect();
    table(["Claim-Specific Terms", "Action", "Count"], rows)
}

/// The chosen replacement per matched term, shown before writing.
pub fn render_selection_table(report: &ScanReport, selections: &Selections) -> String {
    let rows = report
        .matched_terms
        .iter()
        .map(|term| {
            let chosen = selections.get(term).unwrap_or("(unchanged)").to_string();
            let count = report.term_counts.get(term).copied().unwrap_or(0);
            [term.clone(), chosen, count.to_string()]
        })
        .collect();
    table(["Predefined Word", "Alternative Word", "Count"], rows)
}
