//! Employee roster and its multi-key lookup index.
//!
//! Every record is reachable through several normalized keys: the full name
//! and each name token longer than two characters. Keys are uppercase.
//!
//! # Collision policy
//!
//! Different people can share a token ("BUDI"). The most recently loaded
//! record wins the binding. The key keeps the position of its first insertion
//! in [`RosterIndex::keys`], which is the order fuzzy matching walks.

use crate::types::IdentityRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

const FIELD_SEPARATOR: char = ';';
const MIN_FIELDS: usize = 3;
/// Tokens must be longer than this to become keys.
const MIN_TOKEN_CHARS: usize = 2;

/// Lookup structure built once per run, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    records: Vec<IdentityRecord>,
    /// Keys in first-insertion order.
    keys: Vec<String>,
    /// Key → slot in `records`.
    bindings: HashMap<String, usize>,
}

/// Headcount by distinct full name, overall and per department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub unique_employees: usize,
    /// Sorted by department name.
    pub departments: Vec<(String, usize)>,
}

impl RosterIndex {
    /// Build from roster lines. The first line is a header and is skipped.
    ///
    /// Blank lines and lines with fewer than three fields are ignored.
    pub fn build<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for (n, line) in lines.into_iter().enumerate().skip(1) {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(record) => index.insert(record),
                None => tracing::trace!(line = n + 1, "skipping malformed roster line"),
            }
        }
        index
    }

    /// Build from the text of a roster file.
    pub fn parse(text: &str) -> Self {
        Self::build(text.lines())
    }

    /// Load a roster file. A missing or unreadable file yields an empty index.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let index = Self::parse(&text);
                tracing::info!(path = %path.display(), records = index.len(), keys = index.key_count(), "roster loaded");
                index
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "roster not available, no identities can be resolved");
                Self::default()
            }
        }
    }

    /// Add a record under its full name and every long-enough token,
    /// overwriting earlier bindings of the same keys.
    pub fn insert(&mut self, record: IdentityRecord) {
        let slot = self.records.len();
        let full_key = record.full_name.to_uppercase();
        let token_keys: Vec<String> = record
            .full_name
            .split_whitespace()
            .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
            .map(str::to_uppercase)
            .collect();
        self.records.push(record);

        for key in std::iter::once(full_key).chain(token_keys) {
            self.bind(key, slot);
        }
    }

    fn bind(&mut self, key: String, slot: usize) {
        if let Some(previous) = self.bindings.insert(key.clone(), slot) {
            if previous != slot {
                tracing::trace!(key = %key, "roster key rebound to a later record");
            }
        } else {
            self.keys.push(key);
        }
    }

    /// Look up a normalized (uppercase) key.
    pub fn get(&self, key: &str) -> Option<&IdentityRecord> {
        self.bindings.get(key).map(|&slot| &self.records[slot])
    }

    /// Keys with their records, in first-insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &IdentityRecord)> + '_ {
        self.keys
            .iter()
            .map(move |key| (key.as_str(), &self.records[self.bindings[key]]))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(String::as_str)
    }

    /// Every loaded record, in roster order.
    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    /// Number of records loaded.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Duplicate roster rows for the same full name count once.
    pub fn stats(&self) -> RosterStats {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        let mut departments: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for record in &self.records {
            names.insert(record.full_name.as_str());
            departments
                .entry(record.department.as_str())
                .or_default()
                .insert(record.full_name.as_str());
        }
        RosterStats {
            unique_employees: names.len(),
            departments: departments
                .into_iter()
                .map(|(name, members)| (name.to_string(), members.len()))
                .collect(),
        }
    }
}

fn parse_line(line: &str) -> Option<IdentityRecord> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < MIN_FIELDS || fields[0].is_empty() {
        return None;
    }
    Some(IdentityRecord {
        full_name: fields[0].to_string(),
        id_code: fields[1].to_string(),
        department: fields[2].to_string(),
    })
}
