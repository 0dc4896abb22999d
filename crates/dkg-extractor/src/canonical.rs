//! Entity canonicalization
//!
//! Maps every surface form of an entity to one canonical key. The mapping is
//! pure and idempotent: a canonical key canonicalizes to itself.

use std::collections::{BTreeMap, BTreeSet};

use dkg_core::{CanonicalConfig, ConfigError};
use serde::{Deserialize, Serialize};

/// Determiners dropped from the front of a name
pub(crate) const LEADING_DETERMINERS: &[&str] = &["the", "a", "an", "this", "that", "these", "those"];

/// Normalized identity of an entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Surface-to-canonical mapping with a resolved alias table
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    aliases: BTreeMap<String, String>,
}

impl Canonicalizer {
    /// Build from an alias table (alias -> canonical name)
    ///
    /// Both sides are normalized and chains (`a -> b`, `b -> c`) are
    /// resolved up front, so lookups are a single step.
    pub fn new(aliases: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut normalized = BTreeMap::new();

        for (alias, canonical) in aliases {
            let from = normalize(alias);
            let to = normalize(canonical);
            if from.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "canonical.aliases".to_string(),
                    value: alias.clone(),
                });
            }
            if to.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("canonical.aliases.{alias}"),
                    value: canonical.clone(),
                });
            }
            if from != to {
                normalized.insert(from, to);
            }
        }

        let mut resolved = BTreeMap::new();
        for from in normalized.keys() {
            let mut seen = BTreeSet::from([from.as_str()]);
            let mut target = &normalized[from];
            while let Some(next) = normalized.get(target) {
                if !seen.insert(target.as_str()) {
                    return Err(ConfigError::AliasCycle(from.clone()));
                }
                target = next;
            }
            resolved.insert(from.clone(), target.clone());
        }

        tracing::debug!(aliases = resolved.len(), "Built canonicalizer");
        Ok(Self { aliases: resolved })
    }

    /// Create from config
    pub fn from_config(config: &CanonicalConfig) -> Result<Self, ConfigError> {
        Self::new(&config.aliases)
    }

    /// Canonical key of a surface string; never fails
    pub fn canonicalize(&self, surface: &str) -> CanonicalKey {
        let normalized = normalize(surface);
        match self.aliases.get(&normalized) {
            Some(canonical) => CanonicalKey(canonical.clone()),
            None => CanonicalKey(normalized),
        }
    }

    /// Number of resolved aliases
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

/// Lower-case, strip possessives and punctuation, collapse whitespace and
/// drop leading determiners
pub fn normalize(surface: &str) -> String {
    let lower = strip_possessives(&surface.to_lowercase());
    let spaced = punctuation_to_spaces(&lower);

    let mut words: &[&str] = &spaced.split_whitespace().collect::<Vec<_>>();
    while let Some((first, rest)) = words.split_first() {
        if !LEADING_DETERMINERS.contains(first) {
            break;
        }
        words = rest;
    }

    words.join(" ")
}

/// Normalize a predicate phrase: lower-case, punctuation removed, whitespace
/// collapsed
pub fn canonicalize_predicate(surface: &str) -> String {
    punctuation_to_spaces(&surface.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn punctuation_to_spaces(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

/// Remove `'s` (or `’s`) at the end of a word
fn strip_possessives(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let is_apostrophe = matches!(chars[i], '\'' | '\u{2019}');
        let followed_by_s = chars.get(i + 1) == Some(&'s');
        let at_word_end = chars.get(i + 2).map_or(true, |c| !c.is_alphanumeric());

        if is_apostrophe && followed_by_s && at_word_end {
            i += 2;
            continue;
        }

        out.push(chars[i]);
        i += 1;
    }

    out
}
