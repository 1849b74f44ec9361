//! Rule-based conversational responses.
//!
//! `colloquy` matches user input against AIML-style categories and evaluates
//! the selected response template against per-session state.
//!
//! ```text
//! input ──▶ Responder::respond(&mut Session, input)
//!             ├─ request history  ◀── append input
//!             ├─ RuleSet::select ──▶ ContextMatcher (exact → sets → fuzzy → semantic)
//!             │                        └─ PatternCache (shared LRU of compiled patterns)
//!             ├─ Evaluator::evaluate ──▶ Template tree (think, set, condition, srai, ...)
//!             └─ response + that history ◀── append reply
//! ```
//!
//! The pieces are usable on their own: [`ContextMatcher`] answers "does this
//! utterance satisfy this pattern", [`Session`] keeps bounded histories, and
//! [`Evaluator`] interprets templates for any [`RuleLookup`].
//!
//! Loading rule files, the individual text transforms behind extension tags,
//! and the network side of external calls are left to the host; see
//! [`KnowledgeBase`], [`ExtensionHandler`] and [`ExternalService`].
//!
//! The crate logs through `tracing` and never installs a subscriber.

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod knowledge;
mod rules;
mod session;
mod template;


pub use api::{Reply, Responder, ResponderBuilder};
pub use config::{EngineConfig, EvalConfig, HistoryConfig, MatcherConfig};
pub use engine::{
    CacheStats, CompiledPattern, ContextMatcher, FuzzyOutcome, MatchOutcome, MatchTier, MatchTiers, PatternCache,
    PatternToken, SynonymTable, WildcardKind, expand, levenshtein, similarity, tokenize,
};
pub use error::{CollaboratorError, Diagnostic, DiagnosticKind, EngineError, EvalError, Result};
pub use knowledge::{CollectionKind, KnowledgeBase, MemoryKnowledgeBase};
pub use rules::{Category, RuleSet, normalize_input};
pub use session::{History, HistoryIssue, HistoryKind, HistoryStats, Session, SessionStore};
pub use template::{
    Attributes, Branch, Captures, Condition, EvalMetrics, EvalOptions, Evaluation, Evaluator, ExtensionHandler,
    ExtensionRegistry, ExternalService, RuleLookup, RuleMatch, ServiceDescriptor, Template, TemplateNode, VarScope,
};
