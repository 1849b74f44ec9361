//! Per-session conversational state.
//!
//! A [`Session`] owns its variables, its current topic and three bounded
//! histories (see [`HistoryKind`]). Evaluation takes `&mut Session`, so one
//! session is never evaluated twice at the same time; [`SessionStore`] adds
//! the same guarantee for hosts that look sessions up by id from several
//! threads.
//!
//! ```text
//! SessionStore ── RwLock<HashMap<id, Arc<Mutex<Session>>>>
//!                   │ read lock held only for the lookup
//!                   v
//!               Arc<Mutex<Session>> ── lock for the whole turn
//!                   ├── variables        name → value
//!                   ├── topic
//!                   ├── that history     (bot utterances)
//!                   ├── request history  (user inputs)
//!                   └── response history (full replies)
//! ```

#[path = "session/history.rs"]
mod history;

pub use history::{History, HistoryIssue, HistoryKind, HistoryStats};

use crate::config::HistoryConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    variables: HashMap<String, String>,
    topic: String,
    that: History,
    requests: History,
    responses: History,
    config: HistoryConfig,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(id.into(), config))
    }

    pub(crate) fn from_validated(id: String, config: HistoryConfig) -> Self {
        let now = Utc::now();
        Session {
            id,
            variables: HashMap::new(),
            topic: String::new(),
            that: History::new(&config),
            requests: History::new(&config),
            responses: History::new(&config),
            config,
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last history append.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    /// The current topic, empty when none was set.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    /// The most recent bot utterance, empty before the first reply.
    pub fn that(&self) -> &str {
        self.that.latest().unwrap_or("")
    }

    pub fn history(&self, kind: HistoryKind) -> &History {
        match kind {
            HistoryKind::That => &self.that,
            HistoryKind::Request => &self.requests,
            HistoryKind::Response => &self.responses,
        }
    }

    fn history_mut(&mut self, kind: HistoryKind) -> &mut History {
        match kind {
            HistoryKind::That => &mut self.that,
            HistoryKind::Request => &mut self.requests,
            HistoryKind::Response => &mut self.responses,
        }
    }

    pub fn append(&mut self, kind: HistoryKind, item: impl Into<String>) {
        self.history_mut(kind).append(item);
        self.last_active = Utc::now();
    }

    pub fn get_by_index(&self, kind: HistoryKind, index: usize) -> Option<&str> {
        self.history(kind).get_by_index(index)
    }

    pub fn get_all(&self, kind: HistoryKind) -> Vec<&str> {
        self.history(kind).get_all()
    }

    pub fn stats(&self, kind: HistoryKind) -> HistoryStats {
        self.history(kind).stats()
    }

    /// Report empty entries, adjacent duplicates and memory above the ceiling.
    pub fn validate(&self) -> Vec<HistoryIssue> {
        let mut issues = Vec::new();
        for kind in HistoryKind::ALL {
            self.history(kind).issues(kind, &mut issues);
        }
        let used = self.memory_usage();
        if used > self.config.max_memory_bytes {
            issues.push(HistoryIssue::MemoryCeilingExceeded { used, ceiling: self.config.max_memory_bytes });
        }
        issues
    }

    /// Bytes held by all three histories. Variables are not counted.
    pub fn memory_usage(&self) -> usize {
        HistoryKind::ALL.iter().map(|&kind| self.history(kind).memory_usage()).sum()
    }

    /// Empty all three histories. Variables and topic are kept.
    pub fn clear(&mut self) {
        for kind in HistoryKind::ALL {
            self.history_mut(kind).clear();
        }
    }

    /// Swap in new history bounds. Existing entries are trimmed lazily by the
    /// next append to each history.
    pub fn reconfigure(&mut self, config: HistoryConfig) -> Result<()> {
        config.validate()?;
        for kind in HistoryKind::ALL {
            self.history_mut(kind).reconfigure(&config);
        }
        self.config = config;
        Ok(())
    }
}

/// Thread-safe registry of sessions keyed by id.
#[derive(Debug)]
pub struct SessionStore {
    config: HistoryConfig,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new(config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, sessions: RwLock::new(HashMap::new()) })
    }

    /// The session for `id`, created on first contact.
    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(session = id, "created session");
            Arc::new(Mutex::new(Session::from_validated(id.to_string(), self.config)))
        });
        Arc::clone(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner).remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
