//! Context pattern matching.
//!
//! This module is the matching half of the engine. It decides whether an
//! utterance satisfies a pattern and which substrings the pattern captured.
//!
//! ## How the parts work together
//!
//! ```text
//! pattern ── PatternCache::get_or_compile ──▶ Arc<CompiledPattern>
//!            (cache.rs, compile in pattern.rs)        │
//!                                                     v
//! utterance ──────────────▶ ContextMatcher::match_pattern (matcher.rs)
//!                             (1) exact/wildcard alignment
//!                             (2) set/topic expansion   (expand.rs)
//!                             (3) fuzzy alignment       (similarity.rs)
//!                             (4) semantic alignment    (synonyms.rs)
//!                                                     │
//!                                                     v
//!                                     Option<MatchOutcome { tier, score, captures }>
//! ```
//!
//! Tiers are tried in that order and the first tier that matches wins; no
//! scores are blended across tiers. A `None` result is a plain "no match",
//! not an error.
//!
//! ## Responsibilities by module
//!
//! - `pattern.rs`: tokenizes a raw pattern string (wildcards, `<set>` and
//!   `<topic>` references) into a `CompiledPattern`.
//! - `cache.rs`: process-wide LRU cache of compiled patterns with hit/miss and
//!   eviction accounting.
//! - `expand.rs`: rewrites collection references into one concrete pattern per
//!   member.
//! - `similarity.rs`: normalized edit-distance scores for the fuzzy tier.
//! - `synonyms.rs`: the synonym table consulted by the semantic tier.
//! - `matcher.rs`: the backtracking aligner shared by all tiers, and the tier
//!   orchestration.
//!
//! ## Concurrency
//!
//! A `ContextMatcher` is `Send + Sync` and is meant to be built once per
//! process and shared through `Arc`. The cache serializes its own updates;
//! the synonym table is immutable after construction.
//!
//! ## Debugging
//!
//! Tier decisions are logged at `trace` level under the `colloquy::engine`
//! targets; cache evictions at `trace`, expansion truncation at `warn`.

#[path = "engine/cache.rs"]
mod cache;
#[path = "engine/expand.rs"]
mod expand;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/pattern.rs"]
mod pattern;
#[path = "engine/similarity.rs"]
mod similarity;
#[path = "engine/synonyms.rs"]
mod synonyms;

pub use cache::{CacheStats, PatternCache};
pub use expand::expand;
pub use matcher::{ContextMatcher, FuzzyOutcome, MatchOutcome, MatchTier, MatchTiers};
pub use pattern::{CompiledPattern, PatternToken, WildcardKind, tokenize};
pub use similarity::{levenshtein, similarity};
pub use synonyms::SynonymTable;
