//! Knowledge-base access.
//!
//! The engine only ever reads the knowledge base. Loading rule files and
//! populating collections is the host's job; [`MemoryKnowledgeBase`] is a
//! ready-made in-memory implementation for hosts and tests.

use std::collections::HashMap;

/// Read-only access to named collections and bot properties.
///
/// Implementations must stay unchanged for the duration of a single match or
/// evaluation; the engine may look the same name up several times.
pub trait KnowledgeBase: Send + Sync {
    /// Members of the set `name`, in declared order.
    fn set(&self, name: &str) -> Option<&[String]>;

    /// Members of the topic collection `name`, in declared order.
    fn topic(&self, name: &str) -> Option<&[String]>;

    /// A bot property such as `name` or `age`.
    fn bot_property(&self, name: &str) -> Option<&str>;
}

/// Which kind of collection a pattern reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Set,
    Topic,
}

impl CollectionKind {
    pub fn tag(self) -> &'static str {
        match self {
            CollectionKind::Set => "set",
            CollectionKind::Topic => "topic",
        }
    }

    pub(crate) fn members<'kb>(self, kb: &'kb dyn KnowledgeBase, name: &str) -> Option<&'kb [String]> {
        match self {
            CollectionKind::Set => kb.set(name),
            CollectionKind::Topic => kb.topic(name),
        }
    }
}

/// In-memory knowledge base. Collection and property names are matched
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryKnowledgeBase {
    sets: HashMap<String, Vec<String>>,
    topics: HashMap<String, Vec<String>>,
    properties: HashMap<String, String>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set<I, S>(mut self, name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_set(name, members);
        self
    }

    pub fn with_topic<I, S>(mut self, name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.insert(name.to_lowercase(), members.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<String>) -> Self {
        self.properties.insert(name.to_lowercase(), value.into());
        self
    }

    /// Insert or replace a set.
    pub fn insert_set<I, S>(&mut self, name: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets.insert(name.to_lowercase(), members.into_iter().map(Into::into).collect());
    }
}

impl KnowledgeBase for MemoryKnowledgeBase {
    fn set(&self, name: &str) -> Option<&[String]> {
        self.sets.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    fn topic(&self, name: &str) -> Option<&[String]> {
        self.topics.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    fn bot_property(&self, name: &str) -> Option<&str> {
        self.properties.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case_and_keep_order() {
        let kb = MemoryKnowledgeBase::new()
            .with_set("Colors", ["RED", "GREEN", "BLUE"])
            .with_topic("pets", ["cat", "dog"])
            .with_property("NAME", "Colloquy");

        assert_eq!(kb.set("COLORS").unwrap(), ["RED", "GREEN", "BLUE"]);
        assert_eq!(kb.topic("Pets").unwrap(), ["cat", "dog"]);
        assert_eq!(kb.bot_property("name"), Some("Colloquy"));
        assert!(kb.set("pets").is_none());
        assert_eq!(CollectionKind::Topic.members(&kb, "PETS").map(|m| m.len()), Some(2));
    }
}
