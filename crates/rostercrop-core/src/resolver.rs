//! Filename → roster identity resolution.
//!
//! A crop filename is reduced to a label and tried against the roster in
//! layers of decreasing strictness; the first layer that hits wins.

use crate::roster::RosterIndex;
use crate::types::IdentityRecord;
use serde::Serialize;

/// Marker suffixes written by the cropper.
pub const FACE_SUFFIX: &str = "_face.jpg";
pub const ANNOTATED_SUFFIX: &str = "_ann.jpg";

const MIN_SUB_TOKEN_CHARS: usize = 2;
const MIN_FUZZY_CHARS: usize = 3;

/// Which layer produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchLayer {
    /// The whole label is a key.
    Exact,
    /// The text before the first `-` / `_` is a key.
    PrimaryToken,
    /// One word of the primary token is a key.
    SubToken,
    /// A key starts with one word of the primary token.
    FuzzyPrefix,
}

/// How the fuzzy layer picks among several keys that match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixTieBreak {
    /// Earliest key in roster insertion order; tokens tried in label order per key.
    #[default]
    FirstInserted,
    /// Longest matching key; insertion order among equal lengths.
    LongestKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub record: &'a IdentityRecord,
    pub layer: MatchLayer,
}

/// Label and primary token derived from a crop filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLabel {
    pub raw: String,
    pub primary: String,
}

impl NameLabel {
    pub fn from_filename(filename: &str) -> Self {
        let raw = filename.replace(FACE_SUFFIX, "").replace(ANNOTATED_SUFFIX, "");
        let primary = raw
            .split('-')
            .next()
            .and_then(|s| s.split('_').next())
            .unwrap_or_default()
            .trim()
            .to_string();
        Self { raw, primary }
    }

    /// Whitespace-separated words of the primary token.
    fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.primary.split_whitespace()
    }
}

/// Resolves crop filenames against a roster.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver<'a> {
    index: &'a RosterIndex,
    tie_break: PrefixTieBreak,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(index: &'a RosterIndex) -> Self {
        Self {
            index,
            tie_break: PrefixTieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: PrefixTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn resolve(&self, filename: &str) -> Option<Resolution<'a>> {
        let label = NameLabel::from_filename(filename);
        let found = self.resolve_label(&label);
        match &found {
            Some(r) => tracing::debug!(filename, layer = ?r.layer, name = %r.record.full_name, "resolved"),
            None => tracing::debug!(filename, label = %label.raw, "no roster match"),
        }
        found
    }

    fn resolve_label(&self, label: &NameLabel) -> Option<Resolution<'a>> {
        let hit = |record, layer| Some(Resolution { record, layer });

        if let Some(record) = self.index.get(&label.raw.to_uppercase()) {
            return hit(record, MatchLayer::Exact);
        }

        if let Some(record) = self.index.get(&label.primary.to_uppercase()) {
            return hit(record, MatchLayer::PrimaryToken);
        }

        let sub_token = label
            .words()
            .filter(|w| w.chars().count() > MIN_SUB_TOKEN_CHARS)
            .find_map(|w| self.index.get(&w.to_uppercase()));
        if let Some(record) = sub_token {
            return hit(record, MatchLayer::SubToken);
        }

        self.fuzzy_prefix(label)
            .and_then(|record| hit(record, MatchLayer::FuzzyPrefix))
    }

    fn fuzzy_prefix(&self, label: &NameLabel) -> Option<&'a IdentityRecord> {
        let prefixes: Vec<String> = label
            .words()
            .filter(|w| w.chars().count() > MIN_FUZZY_CHARS)
            .map(str::to_uppercase)
            .collect();
        if prefixes.is_empty() {
            return None;
        }

        let mut matches = self
            .index
            .entries()
            .filter(|(key, _)| key.chars().count() > MIN_FUZZY_CHARS)
            .filter(|(key, _)| prefixes.iter().any(|p| key.starts_with(p.as_str())));

        match self.tie_break {
            PrefixTieBreak::FirstInserted => matches.next().map(|(_, record)| record),
            PrefixTieBreak::LongestKey => matches
                .fold(None, |best: Option<(&str, &'a IdentityRecord)>, (key, record)| match best {
                    Some((best_key, _)) if best_key.chars().count() >= key.chars().count() => best,
                    _ => Some((key, record)),
                })
                .map(|(_, record)| record),
        }
    }
}
