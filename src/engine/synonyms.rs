//! Synonym table for the semantic tier.
//!
//! The table is an explicit value: build it (or take
//! [`SynonymTable::default_english`]) before constructing the matcher, then
//! share it through `Arc`. It is never mutated after the matcher is built.
//!
//! Groups are symmetric and transitive within the group: adding
//! `["big", "large", "huge"]` makes each word a synonym of the other two.
//! A word that appears in several groups collects the union.

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

const DEFAULT_GROUPS: &[&[&str]] = &[
    &["hello", "hi", "hey", "greetings", "howdy"],
    &["goodbye", "bye", "farewell", "cya"],
    &["like", "love", "enjoy", "adore", "fancy"],
    &["hate", "dislike", "loathe", "detest"],
    &["big", "large", "huge", "enormous"],
    &["small", "little", "tiny"],
    &["happy", "glad", "joyful", "cheerful"],
    &["sad", "unhappy", "down", "gloomy"],
    &["yes", "yeah", "yep", "sure", "ok", "okay"],
    &["no", "nope", "nah"],
    &["quick", "fast", "rapid", "speedy"],
    &["buy", "purchase"],
    &["help", "assist", "support"],
    &["smart", "clever", "intelligent", "bright"],
    &["movie", "film"],
    &["car", "automobile", "vehicle"],
    &["thanks", "thank", "thx", "cheers"],
    &["want", "need", "desire"],
    &["talk", "speak", "chat"],
    &["begin", "start", "commence"],
    &["end", "finish", "stop"],
];

static DEFAULT_ENGLISH: Lazy<SynonymTable> =
    Lazy::new(|| DEFAULT_GROUPS.iter().fold(SynonymTable::new(), |table, group| table.with_group(group.iter())));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynonymTable {
    groups: HashMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    /// An empty table: the semantic tier then only accepts literal equality.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small built-in table of common English equivalents, built once per
    /// process.
    pub fn default_english() -> Self {
        DEFAULT_ENGLISH.clone()
    }

    pub fn with_group<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_group(words);
        self
    }

    /// Register `words` as mutually equivalent.
    pub fn add_group<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words.into_iter().map(|w| w.as_ref().to_lowercase()).collect();
        for word in &words {
            let entry = self.groups.entry(word.clone()).or_default();
            entry.extend(words.iter().filter(|other| *other != word).cloned());
        }
    }

    /// Words registered as equivalent to `word` (lowercased, excluding itself).
    pub fn synonyms(&self, word: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(&word.to_lowercase())
    }

    /// Whether two words are equivalent. Both arguments must already be
    /// lowercase.
    pub(crate) fn equivalent_folded(&self, a: &str, b: &str) -> bool {
        a == b || self.groups.get(a).is_some_and(|set| set.contains(b))
    }

    pub fn are_synonyms(&self, a: &str, b: &str) -> bool {
        self.equivalent_folded(&a.to_lowercase(), &b.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
