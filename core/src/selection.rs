//! User-chosen substitution per vocabulary key, collected between the two phases.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::registry::PatternRegistry;
use crate::{Error, ScanReport};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Selections {
    choices: BTreeMap<String, String>,
}

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    /// First candidate for every term the read phase matched.
    pub fn defaults(registry: &PatternRegistry, report: &ScanReport) -> Self {
        let mut selections = Self::new();
        for term in &report.matched_terms {
            if let Some(first) = registry
                .candidates_for(term)
                .ok()
                .and_then(|c| c.first())
            {
                selections.choices.insert(term.clone(), first.clone());
            }
        }
        selections
    }

    /// Chooses `candidate` for `key`; both are matched case-insensitively
    /// against the registry and stored as spelled there.
    pub fn choose(
        &mut self,
        registry: &PatternRegistry,
        key: &str,
        candidate: &str,
    ) -> Result<(), Error> {
        let canonical = registry
            .canonical_key(key)
            .ok_or_else(|| Error::UnknownTerm(key.to_string()))?;
        let wanted = candidate.trim();
        let chosen = registry
            .candidates_for(canonical)?
            .iter()
            .find(|c| c.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownCandidate {
                term: canonical.to_string(),
                candidate: candidate.to_string(),
            })?;
        self.choices.insert(canonical.to_string(), chosen.clone());
        Ok(())
    }

    /// Chooses the `index`-th candidate (1-based) for `key`.
    pub fn choose_index(
        &mut self,
        registry: &PatternRegistry,
        key: &str,
        index: usize,
    ) -> Result<(), Error> {
        let canonical = registry
            .canonical_key(key)
            .ok_or_else(|| Error::UnknownTerm(key.to_string()))?;
        let chosen = index
            .checked_sub(1)
            .and_then(|i| registry.candidates_for(canonical).ok()?.get(i))
            .ok_or_else(|| Error::UnknownCandidate {
                term: canonical.to_string(),
                candidate: format!("#{index}"),
            })?;
        self.choices.insert(canonical.to_string(), chosen.clone());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.choices.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.choices.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}
