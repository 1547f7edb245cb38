//! Fixed vocabulary and flag-only phrases, compiled once into case-insensitive patterns.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Match, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One vocabulary key and its ordered substitution candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermEntry {
    pub term: String,
    pub candidates: Vec<String>,
}

impl TermEntry {
    pub fn new(term: impl Into<String>, candidates: &[&str]) -> Self {
        Self {
            term: term.into(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }
}

const BUILTIN_TERMS: &[(&str, &[&str])] = &[
    ("Above", &["Surpassing", "Beyond"]),
    ("Adapted For", &["Altered for", "Modified for"]),
    ("Adapted To", &["Made adjustments to", "Modified to"]),
    ("All", &["The total", "Every single"]),
    ("Always", &["Perpetually", "Invariably"]),
    ("Allow", &["Permit", "Grant"]),
    ("Appropriately", &["Accordingly", "Fittingly"]),
    ("Authoritative", &["Attested", "Authenticated"]),
    ("Approximate", &["Closer", "Almost"]),
    ("Around", &["On all sides", "Throughout"]),
    ("Below", &["Less than", "Lower than"]),
    ("Big", &["Oversize", "Hefty"]),
    ("Best", &["Perfect", "Ace", "Incomparable"]),
    ("Biggest", &["Largest", "Huge"]),
    ("Bigger", &["Greater", "Heftier"]),
    ("Black Hat", &["Cybercriminal", "Cracker"]),
    ("But", &["Although", "In spite"]),
    ("By Necessity", &["Obligatory", "Inescapable"]),
    ("Black List", &["Ban list", "Prohibited list"]),
    ("Broadest", &["Spacious", "Widespread"]),
    ("Certain", &["Undoubtful", "Assertively"]),
    ("Certainly", &["Exactly", "Assertively"]),
    ("Characterized By", &["Defined by", "Recognised by"]),
    ("Chief", &["Head", "First"]),
    ("Chinese Wall", &["Information Partition", "Ethical barrier"]),
    ("Compel", &["Enforce", "Urge"]),
    ("Clearly", &["Noticeably", "Undoubtedly"]),
    ("Completely", &["To the limit", "Fully"]),
    ("Compelled", &["Bound", "Forced"]),
    ("Composed Of", &["Involving", "Constructed from"]),
    ("Compelling", &["Forcing"]),
    ("Every", &["each"]),
];

const BUILTIN_FLAG_PHRASES: &[&str] = &[
    "at least one",
    "at least two",
    "one or more",
    "plurality of",
    "wherein",
];

pub fn builtin_terms() -> Vec<TermEntry> {
    BUILTIN_TERMS
        .iter()
        .map(|(term, candidates)| TermEntry::new(*term, candidates))
        .collect()
}

pub fn builtin_flag_phrases() -> Vec<String> {
    BUILTIN_FLAG_PHRASES.iter().map(|p| p.to_string()).collect()
}

static DEFAULT_REGISTRY: Lazy<PatternRegistry> = Lazy::new(|| {
    PatternRegistry::new(builtin_terms(), builtin_flag_phrases()).expect("built-in patterns")
});

/// Registry of the built-in vocabulary and flag phrases.
pub fn default_registry() -> &'static PatternRegistry {
    &DEFAULT_REGISTRY
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A compiled vocabulary key or flag phrase.
///
/// Word boundaries are judged against ASCII word characters only, and keys
/// written in ASCII fold case over ASCII only, so `Beſt` is not `Best` while
/// `Allé` still contains `All`.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
    bounded: bool,
}

impl KeyPattern {
    /// Keys made only of word characters match on word boundaries; anything
    /// with a space or punctuation matches literally, wherever it occurs.
    pub fn term(term: &str) -> Result<Self, Error> {
        Self::compile(term, term.chars().all(is_word_char))
    }

    /// Flag phrases always match on word boundaries.
    pub fn phrase(phrase: &str) -> Result<Self, Error> {
        Self::compile(phrase, true)
    }

    fn compile(key: &str, bounded: bool) -> Result<Self, Error> {
        let literal = regex::escape(key);
        let pattern = if key.is_ascii() {
            format!("(?-u:{literal})")
        } else {
            literal
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::InvalidRegistry(format!("invalid pattern for `{key}`: {e}")))?;
        Ok(Self { regex, bounded })
    }

    pub fn is_bounded(&self) -> bool {
        self.bounded
    }

    /// Successive non-overlapping matches, leftmost first.
    pub fn find_iter<'t>(&'t self, text: &'t str) -> impl Iterator<Item = Match<'t>> + 't {
        let mut pos = 0;
        std::iter::from_fn(move || {
            while let Some(found) = self.regex.find_at(text, pos) {
                if !self.bounded || on_boundaries(text, found.start(), found.end()) {
                    pos = found.end();
                    return Some(found);
                }
                // A rejected match may still hide an accepted one starting inside it.
                pos = found.start() + text[found.start()..].chars().next().map_or(1, char::len_utf8);
            }
            None
        })
    }
}

fn on_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back().is_some_and(is_word_char);
    let after = text[end..].chars().next().is_some_and(is_word_char);
    !before && !after
}

#[derive(Debug, Clone)]
struct CompiledTerm {
    entry: TermEntry,
    pattern: KeyPattern,
}

#[derive(Debug, Clone)]
struct CompiledPhrase {
    phrase: String,
    pattern: KeyPattern,
}

/// Immutable lookup and iteration over the vocabulary and the flag phrases.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    terms: Vec<CompiledTerm>,
    index: HashMap<String, usize>,
    phrases: Vec<CompiledPhrase>,
}

impl PatternRegistry {
    pub fn new(terms: Vec<TermEntry>, flag_phrases: Vec<String>) -> Result<Self, Error> {
        let mut compiled = Vec::with_capacity(terms.len());
        let mut index = HashMap::new();
        for entry in terms {
            let key = entry.term.trim();
            if key.is_empty() {
                return Err(Error::InvalidRegistry("empty vocabulary term".into()));
            }
            if entry.candidates.is_empty() {
                return Err(Error::InvalidRegistry(format!(
                    "term `{key}` has no substitution candidates"
                )));
            }
            if index.insert(key.to_lowercase(), compiled.len()).is_some() {
                return Err(Error::InvalidRegistry(format!("duplicate term `{key}`")));
            }
            let entry = TermEntry {
                term: key.to_string(),
                candidates: entry.candidates,
            };
            let pattern = KeyPattern::term(&entry.term)?;
            compiled.push(CompiledTerm { entry, pattern });
        }

        let mut phrases = Vec::with_capacity(flag_phrases.len());
        for phrase in flag_phrases {
            let phrase = phrase.trim().to_string();
            if phrase.is_empty() {
                continue;
            }
            if phrases
                .iter()
                .any(|p: &CompiledPhrase| p.phrase.eq_ignore_ascii_case(&phrase))
            {
                continue;
            }
            let pattern = KeyPattern::phrase(&phrase)?;
            phrases.push(CompiledPhrase { phrase, pattern });
        }

        Ok(Self {
            terms: compiled,
            index,
            phrases,
        })
    }

    /// Vocabulary keys in definition order.
    pub fn all_terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.entry.term.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &TermEntry> {
        self.terms.iter().map(|t| &t.entry)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Candidates for `key`, looked up case-insensitively.
    pub fn candidates_for(&self, key: &str) -> Result<&[String], Error> {
        self.lookup(key)
            .map(|t| t.entry.candidates.as_slice())
            .ok_or_else(|| Error::UnknownTerm(key.to_string()))
    }

    /// The key as spelled in the registry.
    pub fn canonical_key(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|t| t.entry.term.as_str())
    }

    pub fn flag_phrases(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(|p| p.phrase.as_str())
    }

    pub(crate) fn term_patterns(&self) -> impl Iterator<Item = (&str, &KeyPattern)> {
        self.terms
            .iter()
            .map(|t| (t.entry.term.as_str(), &t.pattern))
    }

    pub(crate) fn phrase_patterns(&self) -> impl Iterator<Item = (&str, &KeyPattern)> {
        self.phrases.iter().map(|p| (p.phrase.as_str(), &p.pattern))
    }

    fn lookup(&self, key: &str) -> Option<&CompiledTerm> {
        self.index
            .get(&key.trim().to_lowercase())
            .map(|&idx| &self.terms[idx])
    }
}
