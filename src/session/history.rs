//! Bounded conversational histories.
//!
//! Each history is a ring buffer over a `VecDeque`, newest entry at the back.
//! Once the history is full, an append first evicts from the front, so the
//! length never exceeds `max_depth`, not even between the eviction and the
//! push.
//!
//! ```text
//! max_depth = 3
//!
//! append("d"):  [a, b, c]  ──evict a──▶  [b, c]  ──push──▶  [b, c, d]
//!                                                              │  │  └ index 1
//!                                                              │  └─── index 2
//!                                                              └────── index 3
//! ```
//!
//! Lowering the depth with `reconfigure` does not touch stored entries. If a
//! history ends up more than `compression_threshold` entries over its bound,
//! the next append drops the whole excess in one compression pass instead of
//! evicting one entry per append.

use crate::config::HistoryConfig;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// The three histories a session keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryKind {
    /// Bot utterances, the target of `<that>`.
    That,
    /// User inputs.
    Request,
    /// Full bot responses.
    Response,
}

impl HistoryKind {
    pub const ALL: [HistoryKind; 3] = [HistoryKind::That, HistoryKind::Request, HistoryKind::Response];

    pub fn name(self) -> &'static str {
        match self {
            HistoryKind::That => "that",
            HistoryKind::Request => "request",
            HistoryKind::Response => "response",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary returned by [`History::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    pub total_items: usize,
    pub max_depth: usize,
    pub newest_item: Option<String>,
    pub oldest_item: Option<String>,
    /// Bulk compression passes since the history was created.
    pub compressions: u64,
}

/// A problem reported by session validation. Validation never repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryIssue {
    /// An entry that is empty or whitespace only. `position` is 1-based from
    /// the most recent entry, like [`History::get_by_index`].
    EmptyEntry { kind: HistoryKind, position: usize },
    /// Two adjacent entries with the same text; `position` names the newer one.
    ConsecutiveDuplicate { kind: HistoryKind, position: usize, item: String },
    /// Stored strings of all histories exceed the configured ceiling.
    MemoryCeilingExceeded { used: usize, ceiling: usize },
}

impl fmt::Display for HistoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryIssue::EmptyEntry { kind, position } => write!(f, "{kind} history entry {position} is empty"),
            HistoryIssue::ConsecutiveDuplicate { kind, position, item } => {
                write!(f, "{kind} history entry {position} repeats the previous entry: {item:?}")
            }
            HistoryIssue::MemoryCeilingExceeded { used, ceiling } => {
                write!(f, "histories use {used} bytes, above the ceiling of {ceiling}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    max_depth: usize,
    compression_threshold: usize,
    compressions: u64,
}

impl History {
    /// `config` must already be validated (non-zero depth).
    pub(crate) fn new(config: &HistoryConfig) -> Self {
        History {
            entries: VecDeque::with_capacity(config.max_depth),
            max_depth: config.max_depth,
            compression_threshold: config.compression_threshold,
            compressions: 0,
        }
    }

    /// Push `item` as the most recent entry, evicting the oldest entries first
    /// when the history is full.
    pub fn append(&mut self, item: impl Into<String>) {
        if self.entries.len() > self.max_depth + self.compression_threshold {
            let excess = self.entries.len() - (self.max_depth - 1);
            self.entries.drain(..excess);
            self.compressions += 1;
            debug!(dropped = excess, max_depth = self.max_depth, "compressed history");
        }
        while self.entries.len() >= self.max_depth {
            self.entries.pop_front();
        }
        self.entries.push_back(item.into());
        debug_assert!(self.entries.len() <= self.max_depth);
    }

    /// 1-based lookup from the most recent entry.
    pub fn get_by_index(&self, index: usize) -> Option<&str> {
        if index == 0 || index > self.entries.len() {
            return None;
        }
        self.entries.get(self.entries.len() - index).map(String::as_str)
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    /// All entries, oldest first.
    pub fn get_all(&self) -> Vec<&str> {
        self.entries.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            total_items: self.entries.len(),
            max_depth: self.max_depth,
            newest_item: self.entries.back().cloned(),
            oldest_item: self.entries.front().cloned(),
            compressions: self.compressions,
        }
    }

    /// Bytes held by the stored strings.
    pub fn memory_usage(&self) -> usize {
        self.entries.iter().map(String::len).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn reconfigure(&mut self, config: &HistoryConfig) {
        self.max_depth = config.max_depth;
        self.compression_threshold = config.compression_threshold;
    }

    pub(crate) fn issues(&self, kind: HistoryKind, out: &mut Vec<HistoryIssue>) {
        let len = self.entries.len();
        let mut previous: Option<&str> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let position = len - i;
            if entry.trim().is_empty() {
                out.push(HistoryIssue::EmptyEntry { kind, position });
            } else if previous == Some(entry.as_str()) {
                out.push(HistoryIssue::ConsecutiveDuplicate { kind, position, item: entry.clone() });
            }
            previous = Some(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(max_depth: usize, compression_threshold: usize) -> History {
        History::new(&HistoryConfig { max_depth, compression_threshold, ..HistoryConfig::default() })
    }

    #[test]
    fn indexes_from_most_recent() {
        let mut h = history(5, 10);
        for item in ["one", "two", "three"] {
            h.append(item);
        }
        assert_eq!(h.get_by_index(1), Some("three"));
        assert_eq!(h.get_by_index(3), Some("one"));
        assert_eq!(h.get_by_index(0), None);
        assert_eq!(h.get_by_index(4), None);
        assert_eq!(h.get_all(), ["one", "two", "three"]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut h = history(20, 10);
        for i in 1..=25 {
            h.append(format!("item {i}"));
            assert!(h.len() <= 20);
            assert_eq!(h.get_by_index(1), Some(format!("item {i}").as_str()));
        }
        assert_eq!(h.len(), 20);
        assert_eq!(h.get_all()[0], "item 6");
        assert_eq!(h.stats().oldest_item.as_deref(), Some("item 6"));
        assert_eq!(h.stats().newest_item.as_deref(), Some("item 25"));
        assert_eq!(h.stats().compressions, 0);
    }

    #[test]
    fn lowering_depth_compresses_in_one_pass() {
        let mut h = history(30, 10);
        for i in 0..30 {
            h.append(i.to_string());
        }
        h.reconfigure(&HistoryConfig { max_depth: 5, compression_threshold: 10, ..HistoryConfig::default() });
        assert_eq!(h.len(), 30);

        h.append("last");
        assert_eq!(h.len(), 5);
        assert_eq!(h.stats().compressions, 1);
        assert_eq!(h.get_all(), ["26", "27", "28", "29", "last"]);
    }

    #[test]
    fn small_excess_is_evicted_without_compression() {
        let mut h = history(10, 10);
        for i in 0..10 {
            h.append(i.to_string());
        }
        h.reconfigure(&HistoryConfig { max_depth: 8, compression_threshold: 10, ..HistoryConfig::default() });
        h.append("x");
        assert_eq!(h.len(), 8);
        assert_eq!(h.stats().compressions, 0);
    }

    #[test]
    fn memory_counts_bytes() {
        let mut h = history(4, 0);
        h.append("héllo");
        h.append("abc");
        assert_eq!(h.memory_usage(), 6 + 3);
        h.clear();
        assert_eq!(h.memory_usage(), 0);
        assert!(h.is_empty());
        assert_eq!(h.get_by_index(1), None);
        assert_eq!(h.latest(), None);
        assert!(h.get_all().is_empty());
    }

    #[test]
    fn issues_report_empty_and_repeated_entries() {
        let mut h = history(10, 10);
        for item in ["hi", "  ", "again", "again"] {
            h.append(item);
        }
        let mut issues = Vec::new();
        h.issues(HistoryKind::Request, &mut issues);
        assert_eq!(
            issues,
            [
                HistoryIssue::EmptyEntry { kind: HistoryKind::Request, position: 3 },
                HistoryIssue::ConsecutiveDuplicate { kind: HistoryKind::Request, position: 1, item: "again".into() },
            ]
        );
        assert_eq!(issues[0].to_string(), "request history entry 3 is empty");
    }
}
