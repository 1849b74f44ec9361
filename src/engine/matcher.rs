//! Tiered context matching.
//!
//! All four tiers share one backtracking aligner. What differs per tier is how
//! a literal compares with a word, how a collection reference may consume
//! words, and whether the final aggregate score is acceptable; that is the
//! `TierRules` seam below.
//!
//! ## Alignment
//!
//! The aligner walks pattern tokens left to right. A wildcard first tries the
//! fewest words it may take and only grows when the rest of the pattern cannot
//! match, so the leftmost wildcard binds as little as possible:
//!
//! ```text
//! pattern:   *      LIKE   *
//! input:     I  do  like   red  wine
//!            └─1─┘ (fails: "do" != like)
//!            └──2──┘ ✓     └── rest ──┘
//! captures:  ["I do", "red wine"]
//! ```
//!
//! For tiers whose acceptance does not depend on earlier scores, failed
//! `(token, word)` states are memoized, which keeps patterns with many
//! wildcards polynomial. Every search also has a fixed step budget; running
//! out counts as "no match", is logged at `debug`, and is deterministic for a
//! given input.
//!
//! ## Tiers
//!
//! | Tier | Literal test | Reference | Score |
//! |------|--------------|-----------|-------|
//! | Exact | equal | never matches | 1.0 |
//! | Expanded | equal (after `expand`) | member words equal | 1.0 |
//! | Fuzzy | similarity (optional floor) | closest member | mean similarity ≥ threshold |
//! | Semantic | equal or synonym | member or synonym of member | mean of 1.0 / synonym weight |
//!
//! An unknown collection matches any single word, in the expanded tier through
//! the placeholder `expand` leaves behind and in the fuzzy and semantic tiers
//! directly.

use super::cache::PatternCache;
use super::expand::{expand, expand_compiled};
use super::pattern::{CompiledPattern, PatternToken, tokenize};
use super::similarity::similarity;
use super::synonyms::SynonymTable;
use crate::config::MatcherConfig;
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

const MAX_ALIGN_STEPS: usize = 100_000;

bitflags::bitflags! {
    /// Tiers the matcher may attempt. Disabled tiers are skipped, the order of
    /// the remaining ones never changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MatchTiers: u8 {
        const EXACT    = 1 << 0;
        const SETS     = 1 << 1;
        const FUZZY    = 1 << 2;
        const SEMANTIC = 1 << 3;
    }
}

/// The tier that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    Exact,
    Expanded,
    Fuzzy,
    Semantic,
}

impl MatchTier {
    /// Lower is better; used when ranking candidate rules.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub tier: MatchTier,
    /// 1.0 for the exact and expanded tiers, the aggregate otherwise.
    pub score: f64,
    /// Wildcard and reference captures, left to right.
    pub captures: Vec<String>,
}

/// Result of the fuzzy tier on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyOutcome {
    pub matched: bool,
    /// The accepted score, or the best rejected aggregate (0.0 when no
    /// alignment passed the per-token floor).
    pub score: f64,
    pub captures: Vec<String>,
}

/// Decides whether utterances satisfy patterns.
///
/// Build one per process and share it; see the module docs of
/// [`crate::engine`].
#[derive(Debug)]
pub struct ContextMatcher {
    config: MatcherConfig,
    cache: Arc<PatternCache>,
    synonyms: Arc<SynonymTable>,
}

impl ContextMatcher {
    /// Build a matcher with its own pattern cache.
    pub fn new(config: MatcherConfig, synonyms: Arc<SynonymTable>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(PatternCache::new(config.cache_capacity)?);
        Ok(Self { config, cache, synonyms })
    }

    /// Build a matcher around an existing (possibly shared) cache.
    pub fn with_cache(config: MatcherConfig, cache: Arc<PatternCache>, synonyms: Arc<SynonymTable>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, cache, synonyms })
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn compile(&self, pattern: &str) -> Arc<CompiledPattern> {
        self.cache.get_or_compile(pattern)
    }

    /// Run the enabled tiers in order and return the first match.
    pub fn match_pattern(&self, utterance: &str, pattern: &str, kb: &dyn KnowledgeBase) -> Option<MatchOutcome> {
        let compiled = self.compile(pattern);
        let input = Utterance::new(utterance);
        let tiers = self.config.tiers;

        if tiers.contains(MatchTiers::EXACT) {
            if let Some((captures, _)) = align(&compiled, &input, &ExactRules, None) {
                trace!(pattern, utterance, "exact match");
                return Some(MatchOutcome { tier: MatchTier::Exact, score: 1.0, captures });
            }
        }

        if tiers.contains(MatchTiers::SETS) && compiled.has_references() {
            for expanded in expand_compiled(&compiled, kb, self.config.max_expansions) {
                if let Some((captures, _)) = align(&expanded, &input, &ExactRules, None) {
                    trace!(pattern, utterance, expanded = %expanded.render(), "expanded match");
                    return Some(MatchOutcome { tier: MatchTier::Expanded, score: 1.0, captures });
                }
            }
        }

        if tiers.contains(MatchTiers::FUZZY) {
            let fuzzy = self.fuzzy(&compiled, &input, kb);
            if fuzzy.matched {
                trace!(pattern, utterance, score = fuzzy.score, "fuzzy match");
                return Some(MatchOutcome { tier: MatchTier::Fuzzy, score: fuzzy.score, captures: fuzzy.captures });
            }
        }

        if tiers.contains(MatchTiers::SEMANTIC) {
            if let Some(outcome) = self.semantic(&compiled, &input, kb) {
                trace!(pattern, utterance, score = outcome.score, "semantic match");
                return Some(outcome);
            }
        }

        trace!(pattern, utterance, "no tier matched");
        None
    }

    /// Whether `utterance` matches `pattern` in any enabled tier.
    pub fn is_match(&self, utterance: &str, pattern: &str, kb: &dyn KnowledgeBase) -> bool {
        self.match_pattern(utterance, pattern, kb).is_some()
    }

    /// Tier 1 only: literal tokens and wildcards, no knowledge base.
    pub fn match_exact(&self, utterance: &str, pattern: &str) -> Option<Vec<String>> {
        let compiled = self.compile(pattern);
        align(&compiled, &Utterance::new(utterance), &ExactRules, None).map(|(captures, _)| captures)
    }

    /// Tier 3 only, reporting the score even when it is below the threshold.
    pub fn match_fuzzy(&self, utterance: &str, pattern: &str, kb: &dyn KnowledgeBase) -> FuzzyOutcome {
        let compiled = self.compile(pattern);
        self.fuzzy(&compiled, &Utterance::new(utterance), kb)
    }

    /// Tier 4 only.
    pub fn match_semantic(&self, utterance: &str, pattern: &str, kb: &dyn KnowledgeBase) -> Option<MatchOutcome> {
        let compiled = self.compile(pattern);
        self.semantic(&compiled, &Utterance::new(utterance), kb)
    }

    /// [`expand`] bounded by the configured expansion limit.
    pub fn expand(&self, pattern: &str, kb: &dyn KnowledgeBase) -> Vec<String> {
        let compiled = self.compile(pattern);
        if !compiled.has_references() {
            return expand(pattern, kb);
        }
        expand_compiled(&compiled, kb, self.config.max_expansions).iter().map(CompiledPattern::render).collect()
    }

    fn fuzzy(&self, compiled: &CompiledPattern, input: &Utterance, kb: &dyn KnowledgeBase) -> FuzzyOutcome {
        let rules = FuzzyRules { threshold: self.config.fuzzy_threshold, floor: self.config.fuzzy_token_floor };
        let mut aligner = Aligner::new(compiled, input, &rules, Some(kb));
        match aligner.run() {
            Some((captures, score)) => FuzzyOutcome { matched: true, score, captures },
            None => FuzzyOutcome { matched: false, score: aligner.best_rejected, captures: Vec::new() },
        }
    }

    fn semantic(&self, compiled: &CompiledPattern, input: &Utterance, kb: &dyn KnowledgeBase) -> Option<MatchOutcome> {
        let rules = SemanticRules { synonyms: &self.synonyms, weight: self.config.synonym_weight };
        align(compiled, input, &rules, Some(kb))
            .map(|(captures, score)| MatchOutcome { tier: MatchTier::Semantic, score, captures })
    }
}

/// An utterance split into words, with lowercase comparison keys.
struct Utterance<'u> {
    words: Vec<&'u str>,
    folded: Vec<String>,
}

impl<'u> Utterance<'u> {
    fn new(text: &'u str) -> Self {
        let words: Vec<&str> = tokenize(text).collect();
        let folded = words.iter().map(|w| w.to_lowercase()).collect();
        Utterance { words, folded }
    }
}

/// One way a collection reference can bind at the current position.
struct Candidate {
    consumed: usize,
    capture: String,
    score: f64,
}

/// Per-tier comparison policy for the aligner.
trait TierRules {
    /// Score of a literal against one word, `None` when they cannot match.
    /// Both sides are lowercase.
    fn literal(&self, literal: &str, word: &str) -> Option<f64>;

    /// Bindings for a known collection at the start of `words`, best first.
    fn reference(&self, members: &[String], words: &[String]) -> Vec<Candidate>;

    /// Aggregate of the per-token scores of a complete alignment.
    fn aggregate(&self, scores: &[f64]) -> f64 {
        if scores.is_empty() { 1.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 }
    }

    fn accepts(&self, _aggregate: f64) -> bool {
        true
    }

    /// Failed states may be cached only when acceptance ignores earlier scores.
    fn memoizable(&self) -> bool {
        true
    }
}

struct ExactRules;

impl TierRules for ExactRules {
    fn literal(&self, literal: &str, word: &str) -> Option<f64> {
        (literal == word).then_some(1.0)
    }

    fn reference(&self, _members: &[String], _words: &[String]) -> Vec<Candidate> {
        Vec::new()
    }
}

struct FuzzyRules {
    threshold: f64,
    floor: f64,
}

impl TierRules for FuzzyRules {
    fn literal(&self, literal: &str, word: &str) -> Option<f64> {
        let score = similarity(literal, word);
        (score >= self.floor).then_some(score)
    }

    fn reference(&self, members: &[String], words: &[String]) -> Vec<Candidate> {
        let mut best: Option<Candidate> = None;
        for member in members {
            let len = tokenize(member).count();
            if len == 0 || len > words.len() {
                continue;
            }
            let window = words[..len].join(" ");
            let score = similarity(member, &window);
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(Candidate { consumed: len, capture: member.clone(), score });
            }
        }
        best.into_iter().filter(|c| c.score >= self.floor).collect()
    }

    fn accepts(&self, aggregate: f64) -> bool {
        aggregate >= self.threshold
    }

    fn memoizable(&self) -> bool {
        false
    }
}

struct SemanticRules<'s> {
    synonyms: &'s SynonymTable,
    weight: f64,
}

impl SemanticRules<'_> {
    fn word_score(&self, expected: &str, word: &str) -> Option<f64> {
        if expected == word {
            Some(1.0)
        } else if self.synonyms.equivalent_folded(expected, word) {
            Some(self.weight)
        } else {
            None
        }
    }
}

impl TierRules for SemanticRules<'_> {
    fn literal(&self, literal: &str, word: &str) -> Option<f64> {
        self.word_score(literal, word)
    }

    fn reference(&self, members: &[String], words: &[String]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for member in members {
            let member_words: Vec<String> = tokenize(member).map(str::to_lowercase).collect();
            if member_words.is_empty() || member_words.len() > words.len() {
                continue;
            }
            let scores: Option<Vec<f64>> =
                member_words.iter().zip(words).map(|(expected, word)| self.word_score(expected, word)).collect();
            if let Some(scores) = scores {
                let score = scores.iter().sum::<f64>() / scores.len() as f64;
                out.push(Candidate { consumed: member_words.len(), capture: member.clone(), score });
            }
        }
        out
    }
}

fn align<R: TierRules>(
    pattern: &CompiledPattern,
    input: &Utterance<'_>,
    rules: &R,
    kb: Option<&dyn KnowledgeBase>,
) -> Option<(Vec<String>, f64)> {
    Aligner::new(pattern, input, rules, kb).run()
}

struct Aligner<'a, R> {
    source: &'a str,
    tokens: &'a [PatternToken],
    words: &'a [&'a str],
    folded: &'a [String],
    /// `min_suffix[i]`: fewest words `tokens[i..]` can consume.
    min_suffix: Vec<usize>,
    rules: &'a R,
    /// `None` makes every collection reference fail.
    kb: Option<&'a dyn KnowledgeBase>,
    memoize: bool,
    failed: HashSet<(usize, usize)>,
    captures: Vec<String>,
    scores: Vec<f64>,
    steps: usize,
    best_rejected: f64,
}

impl<'a, R: TierRules> Aligner<'a, R> {
    fn new(
        pattern: &'a CompiledPattern,
        input: &'a Utterance<'a>,
        rules: &'a R,
        kb: Option<&'a dyn KnowledgeBase>,
    ) -> Self {
        let tokens = pattern.tokens();
        let mut min_suffix = vec![0; tokens.len() + 1];
        for i in (0..tokens.len()).rev() {
            min_suffix[i] = min_suffix[i + 1] + tokens[i].min_words();
        }
        Aligner {
            source: pattern.source(),
            tokens,
            words: &input.words,
            folded: &input.folded,
            min_suffix,
            rules,
            kb,
            memoize: rules.memoizable(),
            failed: HashSet::new(),
            captures: Vec::new(),
            scores: Vec::new(),
            steps: 0,
            best_rejected: 0.0,
        }
    }

    fn run(&mut self) -> Option<(Vec<String>, f64)> {
        let score = self.align(0, 0)?;
        Some((std::mem::take(&mut self.captures), score))
    }

    fn align(&mut self, pi: usize, ui: usize) -> Option<f64> {
        self.steps += 1;
        if self.steps > MAX_ALIGN_STEPS {
            if self.steps == MAX_ALIGN_STEPS + 1 {
                debug!(pattern = self.source, words = self.words.len(), "alignment step budget exhausted");
            }
            return None;
        }
        if self.words.len() - ui < self.min_suffix[pi] {
            return None;
        }
        if pi == self.tokens.len() {
            return self.finish(ui);
        }
        if self.memoize && self.failed.contains(&(pi, ui)) {
            return None;
        }

        let result = self.align_token(pi, ui);
        if result.is_none() && self.memoize {
            self.failed.insert((pi, ui));
        }
        result
    }

    fn finish(&mut self, ui: usize) -> Option<f64> {
        if ui != self.words.len() {
            return None;
        }
        let aggregate = self.rules.aggregate(&self.scores);
        if self.rules.accepts(aggregate) {
            Some(aggregate)
        } else {
            self.best_rejected = self.best_rejected.max(aggregate);
            None
        }
    }

    fn align_token(&mut self, pi: usize, ui: usize) -> Option<f64> {
        let tokens = self.tokens;
        let folded = self.folded;

        match &tokens[pi] {
            PatternToken::Literal { folded: literal, .. } => {
                let score = self.rules.literal(literal, &folded[ui])?;
                self.attempt(pi + 1, ui + 1, None, &[score])
            }
            PatternToken::Wildcard(kind) => self.take_wildcard(pi, ui, kind.min_words()),
            PatternToken::AnyWord => self.take_word(pi, ui),
            PatternToken::Member { text, words } => {
                if ui + words.len() > folded.len() {
                    return None;
                }
                let scores: Option<Vec<f64>> =
                    words.iter().zip(&folded[ui..]).map(|(want, word)| self.rules.literal(want, word)).collect();
                self.attempt(pi + 1, ui + words.len(), Some(text.clone()), &scores?)
            }
            PatternToken::Reference { kind, name } => {
                let kb = self.kb?;
                let Some(members) = kind.members(kb, name) else {
                    return self.take_word(pi, ui);
                };
                for candidate in self.rules.reference(members, &folded[ui..]) {
                    let next = ui + candidate.consumed;
                    if let Some(score) = self.attempt(pi + 1, next, Some(candidate.capture), &[candidate.score]) {
                        return Some(score);
                    }
                }
                None
            }
        }
    }

    /// Bind exactly one word at `pi`.
    fn take_word(&mut self, pi: usize, ui: usize) -> Option<f64> {
        let capture = self.words[ui].to_string();
        self.attempt(pi + 1, ui + 1, Some(capture), &[])
    }

    /// Bind `min..` words to a wildcard at `pi`, shortest first.
    fn take_wildcard(&mut self, pi: usize, ui: usize, min: usize) -> Option<f64> {
        let words = self.words;
        let max = words.len() - ui - self.min_suffix[pi + 1];
        for take in min..=max {
            let capture = words[ui..ui + take].join(" ");
            if let Some(score) = self.attempt(pi + 1, ui + take, Some(capture), &[]) {
                return Some(score);
            }
        }
        None
    }

    /// Record a binding, recurse, and undo the binding if the rest fails.
    fn attempt(&mut self, pi: usize, ui: usize, capture: Option<String>, scores: &[f64]) -> Option<f64> {
        let (captures_len, scores_len) = (self.captures.len(), self.scores.len());
        self.captures.extend(capture);
        self.scores.extend_from_slice(scores);

        let result = self.align(pi, ui);
        if result.is_none() {
            self.captures.truncate(captures_len);
            self.scores.truncate(scores_len);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::MemoryKnowledgeBase;

    fn matcher() -> ContextMatcher {
        ContextMatcher::new(MatcherConfig::default(), Arc::new(SynonymTable::default_english())).unwrap()
    }

    fn kb() -> MemoryKnowledgeBase {
        MemoryKnowledgeBase::new()
            .with_set("COLORS", ["RED", "GREEN", "BLUE", "light blue"])
            .with_topic("PETS", ["cat", "dog"])
    }

    #[test]
    fn exact_literals_ignore_case() {
        let m = matcher();
        assert_eq!(m.match_exact("hello THERE", "HELLO there"), Some(vec![]));
        assert_eq!(m.match_exact("hello there friend", "HELLO there"), None);
        assert_eq!(m.match_exact("hello", "HELLO there"), None);
    }

    #[test]
    fn literal_only_patterns_match_iff_tokens_are_equal() {
        let m = matcher();
        let cases = [
            ("what is your name", "WHAT IS YOUR NAME", true),
            ("what  is your\tname", "WHAT IS YOUR NAME", true),
            ("what is my name", "WHAT IS YOUR NAME", false),
            ("what is your", "WHAT IS YOUR NAME", false),
            ("", "WHAT", false),
        ];
        for (input, pattern, expected) in cases {
            assert_eq!(m.match_exact(input, pattern).is_some(), expected, "{input:?} vs {pattern:?}");
        }
    }

    #[test]
    fn leftmost_wildcard_binds_the_fewest_words() {
        let m = matcher();
        assert_eq!(
            m.match_exact("I do like red wine", "* LIKE *"),
            Some(vec!["I do".to_string(), "red wine".to_string()])
        );
        assert_eq!(m.match_exact("a b c d", "* *"), Some(vec!["a".to_string(), "b c d".to_string()]));
        assert_eq!(m.match_exact("x is y is z", "* IS *"), Some(vec!["x".to_string(), "y is z".to_string()]));
    }

    #[test]
    fn empty_and_bare_wildcard_edges() {
        let m = matcher();
        assert_eq!(m.match_exact("", ""), Some(vec![]));
        assert_eq!(m.match_exact("anything", ""), None);
        assert_eq!(m.match_exact("", "*"), None);
        assert_eq!(m.match_exact("one two", "*"), Some(vec!["one two".to_string()]));
        assert_eq!(m.match_exact("one", "* *"), None);
        assert_eq!(m.match_exact("one two", "* _"), Some(vec!["one".to_string(), "two".to_string()]));
    }

    #[test]
    fn zero_or_more_wildcards_may_capture_nothing() {
        let m = matcher();
        assert_eq!(m.match_exact("hello", "^ HELLO #"), Some(vec![String::new(), String::new()]));
        assert_eq!(m.match_exact("well hello there", "^ HELLO #"), Some(vec!["well".into(), "there".into()]));
    }

    #[test]
    fn captures_keep_original_case() {
        let m = matcher();
        assert_eq!(m.match_exact("My name is Alice Smith", "MY NAME IS *"), Some(vec!["Alice Smith".to_string()]));
    }

    #[test]
    fn references_never_match_in_the_exact_tier() {
        let m = matcher();
        assert_eq!(m.match_exact("I like RED", "I like <set>COLORS</set>"), None);
    }

    #[test]
    fn set_reference_matches_through_expansion() {
        let m = matcher();
        let out = m.match_pattern("I like RED", "I like <set>COLORS</set>", &kb()).unwrap();
        assert_eq!(out.tier, MatchTier::Expanded);
        assert_eq!(out.captures, ["RED"]);

        let out = m.match_pattern("i like Light Blue", "I like <set>COLORS</set>", &kb()).unwrap();
        assert_eq!(out.captures, ["light blue"]);
    }

    #[test]
    fn captures_interleave_wildcards_and_references() {
        let m = matcher();
        let out = m.match_pattern("my cat is RED and fat", "my <topic>PETS</topic> is * and *", &kb()).unwrap();
        assert_eq!(out.captures, ["cat", "RED", "fat"]);
    }

    #[test]
    fn unknown_collection_matches_exactly_one_word() {
        let m = matcher();
        let out = m.match_pattern("I like Mint", "I like <set>FLAVORS</set>", &kb()).unwrap();
        assert_eq!(out.tier, MatchTier::Expanded);
        assert_eq!(out.captures, ["Mint"]);

        assert!(m.match_pattern("I like mint tea", "I like <set>FLAVORS</set>", &kb()).is_none());
        assert!(m.match_pattern("I like", "I like <set>FLAVORS</set>", &kb()).is_none());

        let fuzzy = m.match_fuzzy("I lika mint", "I like <set>FLAVORS</set>", &kb());
        assert!(fuzzy.matched);
        assert_eq!(fuzzy.captures, ["mint"]);
        assert!(!m.match_fuzzy("I lika mint tea", "I like <set>FLAVORS</set>", &kb()).matched);
    }

    #[test]
    fn fuzzy_tier_tolerates_typos_and_reports_score() {
        let m = matcher();
        let out = m.match_pattern("what is the wether", "WHAT IS THE WEATHER", &kb()).unwrap();
        assert_eq!(out.tier, MatchTier::Fuzzy);
        assert!(out.score >= 0.8 && out.score < 1.0);

        let fuzzy = m.match_fuzzy("I like REDD", "I like <set>COLORS</set>", &kb());
        assert!(fuzzy.matched);
        assert_eq!(fuzzy.captures, ["RED"]);
    }

    #[test]
    fn fuzzy_identical_input_scores_one() {
        let m = matcher();
        let out = m.match_fuzzy("good morning bot", "GOOD MORNING BOT", &kb());
        assert!(out.matched);
        assert_eq!(out.score, 1.0);
    }

    #[test]
    fn fuzzy_never_accepts_below_threshold() {
        let m = matcher();
        for (input, pattern) in [("what is the wthr", "WHAT IS THE WEATHER"), ("hxxlo wxxld", "HELLO WORLD")] {
            let out = m.match_fuzzy(input, pattern, &kb());
            if out.matched {
                assert!(out.score >= m.config().fuzzy_threshold);
            } else {
                assert!(out.score < m.config().fuzzy_threshold);
            }
        }
        let out = m.match_fuzzy("hxxlo wxxld", "HELLO WORLD", &kb());
        assert!(!out.matched);
        assert!((out.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_decides_on_the_mean_alone() {
        let m = matcher();
        // "day" shares nothing with "time", yet the mean reaches the threshold.
        let out = m.match_fuzzy("what is the day now", "WHAT IS THE TIME NOW", &kb());
        assert!(out.matched);
        assert!((out.score - 0.8).abs() < 1e-9);

        let out = m.match_fuzzy("what is the day", "WHAT IS THE TIME", &kb());
        assert!(!out.matched);
        assert!((out.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn token_floor_still_applies_when_configured() {
        let config = MatcherConfig { fuzzy_token_floor: 0.5, ..MatcherConfig::default() };
        let m = ContextMatcher::new(config, Arc::new(SynonymTable::new())).unwrap();
        let out = m.match_fuzzy("what is the day now", "WHAT IS THE TIME NOW", &kb());
        assert!(!out.matched);
        assert_eq!(out.score, 0.0);
    }

    #[test]
    fn semantic_tier_accepts_synonyms_of_literals_and_members() {
        let m = matcher();
        let out = m.match_pattern("I adore RED", "I like <set>COLORS</set>", &kb()).unwrap();
        assert_eq!(out.tier, MatchTier::Semantic);
        assert_eq!(out.captures, ["RED"]);
        assert!(out.score < 1.0);

        let kb = MemoryKnowledgeBase::new().with_set("VEHICLES", ["car", "bike"]);
        let out = m.match_pattern("automobile please", "<set>VEHICLES</set> please", &kb).unwrap();
        assert_eq!(out.tier, MatchTier::Semantic);
        assert_eq!(out.captures, ["car"]);
    }

    #[test]
    fn semantic_tier_does_not_guess() {
        let m = matcher();
        assert!(m.match_pattern("I adore PURPLE", "I like <set>COLORS</set>", &kb()).is_none());
    }

    #[test]
    fn disabled_tiers_are_skipped() {
        let config = MatcherConfig { tiers: MatchTiers::EXACT | MatchTiers::SETS, ..MatcherConfig::default() };
        let m = ContextMatcher::new(config, Arc::new(SynonymTable::default_english())).unwrap();
        assert!(m.match_pattern("what is the wether", "WHAT IS THE WEATHER", &kb()).is_none());
        assert!(m.match_pattern("I like RED", "I like <set>COLORS</set>", &kb()).is_some());
    }

    #[test]
    fn matching_is_deterministic_across_cache_states() {
        let m = matcher();
        let first = m.match_pattern("I do like red wine", "* LIKE *", &kb());
        m.cache().clear();
        let second = m.match_pattern("I do like red wine", "* LIKE *", &kb());
        let third = m.match_pattern("I do like red wine", "* LIKE *", &kb());
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert!(m.cache().stats().hits >= 1);
    }

    #[test]
    fn many_wildcards_stay_fast() {
        let m = matcher();
        let input = vec!["w"; 40].join(" ");
        assert!(m.match_exact(&input, "* * * * * * * * * * X").is_none());
    }

    #[test]
    fn search_budget_ends_in_no_match() {
        let pattern = CompiledPattern::compile("* * * * * * * * * * X");
        let text = vec!["w"; 40].join(" ");
        let input = Utterance::new(&text);
        let rules = FuzzyRules { threshold: 0.8, floor: 0.0 };
        let mut aligner = Aligner::new(&pattern, &input, &rules, None);

        assert!(aligner.run().is_none());
        assert!(aligner.steps > MAX_ALIGN_STEPS);
    }

    #[test]
    fn expand_uses_the_configured_limit() {
        let config = MatcherConfig { max_expansions: 2, ..MatcherConfig::default() };
        let m = ContextMatcher::new(config, Arc::new(SynonymTable::new())).unwrap();
        assert_eq!(m.expand("<set>COLORS</set>", &kb()), ["RED", "GREEN"]);
        assert_eq!(m.expand("no refs", &kb()), ["no refs"]);
    }
}
