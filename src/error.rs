//! Error types.
//!
//! Two layers of failure exist in the engine:
//!
//! - [`EngineError`] is returned to callers. It only covers configuration
//!   problems and internal invariant checks; nothing a single conversational
//!   turn does can produce one.
//! - [`EvalError`] is produced by a single template node. The evaluator always
//!   contains it: the node is replaced by a default substitution and the error
//!   is recorded as a [`Diagnostic`] on the evaluation result.
//!
//! "No rule matched" is not an error at all: the matcher returns `None`.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration value is out of range (zero depth, zero capacity, ...).
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The TOML configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The pattern cache holds more entries than its capacity.
    ///
    /// Indicates a bug in eviction bookkeeping.
    #[error("pattern cache holds {len} entries but capacity is {capacity}")]
    CacheCapacityInvariantViolation { len: usize, capacity: usize },
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig { field, reason: reason.into() }
    }
}

/// Errors reported by external collaborators (extension handlers and the
/// external-call service).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no collaborator registered for '{0}'")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// A failure of a single template node.
///
/// Never escapes [`crate::Evaluator::evaluate`]; see the module docs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("lookup miss: {0}")]
    LookupMiss(String),

    #[error("collaborator '{name}' failed: {source}")]
    Collaborator { name: String, source: CollaboratorError },

    #[error("recursion limit of {limit} exceeded for input '{input}'")]
    RecursionLimitExceeded { limit: usize, input: String },

    #[error("malformed <{tag}>: {reason}")]
    MalformedAttribute { tag: String, reason: String },

    #[error("no rule matches recursive input '{0}'")]
    NoMatchingRule(String),
}

impl EvalError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            EvalError::LookupMiss(_) | EvalError::NoMatchingRule(_) => DiagnosticKind::LookupMiss,
            EvalError::Collaborator { .. } => DiagnosticKind::CollaboratorFailure,
            EvalError::RecursionLimitExceeded { .. } => DiagnosticKind::RecursionLimitExceeded,
            EvalError::MalformedAttribute { .. } => DiagnosticKind::MalformedAttribute,
        }
    }
}

/// Category of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    LookupMiss,
    CollaboratorFailure,
    RecursionLimitExceeded,
    MalformedAttribute,
}

/// A contained failure recorded during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Recursion depth at which the failure happened (0 = top-level template).
    pub depth: usize,
}

impl Diagnostic {
    pub(crate) fn from_error(err: &EvalError, depth: usize) -> Self {
        Diagnostic { kind: err.kind(), message: err.to_string(), depth }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?} @ depth {}] {}", self.kind, self.depth, self.message)
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
