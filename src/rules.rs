//! In-memory rule table.
//!
//! A [`Category`] pairs an input pattern, optional that- and topic-patterns
//! and a template. [`RuleSet`] selects the category for an input:
//!
//! ```text
//! input ── normalize_input ──▶ for each category, in declaration order
//!                                 ├─ pattern   vs input          (all tiers)
//!                                 ├─ that      vs session.that()  (if present)
//!                                 └─ topic     vs session.topic() (if present)
//!                              rank: (tier, score desc, declaration order)
//!                                 │
//!                                 v
//!                         Option<RuleMatch>
//! ```
//!
//! A category without a that- or topic-pattern ignores that context entirely.
//! An empty that or topic only satisfies patterns that accept zero words
//! (`^`, `#`).

use crate::engine::{ContextMatcher, MatchOutcome};
use crate::knowledge::KnowledgeBase;
use crate::session::Session;
use crate::template::{Captures, RuleLookup, RuleMatch, Template};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Category {
    pub pattern: String,
    pub that: Option<String>,
    pub topic: Option<String>,
    pub template: Arc<Template>,
}

impl Category {
    pub fn new(pattern: impl Into<String>, template: impl Into<Template>) -> Self {
        Category { pattern: pattern.into(), that: None, topic: None, template: Arc::new(template.into()) }
    }

    pub fn with_that(mut self, that: impl Into<String>) -> Self {
        self.that = Some(that.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

pub struct RuleSet {
    categories: Vec<Category>,
    matcher: Arc<ContextMatcher>,
    knowledge: Arc<dyn KnowledgeBase>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet").field("categories", &self.categories.len()).finish()
    }
}

impl RuleSet {
    pub fn new(matcher: Arc<ContextMatcher>, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        RuleSet { categories: Vec::new(), matcher, knowledge }
    }

    pub fn with(mut self, category: Category) -> Self {
        self.add(category);
        self
    }

    pub fn add(&mut self, category: Category) {
        self.categories.push(category);
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Pick the best category for `input` in the given that/topic context.
    pub fn select(&self, input: &str, that: &str, topic: &str) -> Option<RuleMatch> {
        let input = normalize_input(input);
        let that = normalize_input(that);
        let kb = self.knowledge.as_ref();

        let mut best: Option<(usize, MatchOutcome, Captures)> = None;
        for (index, category) in self.categories.iter().enumerate() {
            let Some(outcome) = self.matcher.match_pattern(&input, &category.pattern, kb) else {
                continue;
            };
            let Some(that_stars) = self.context_captures(&that, category.that.as_deref()) else {
                continue;
            };
            let Some(topic_stars) = self.context_captures(topic, category.topic.as_deref()) else {
                continue;
            };

            if best.as_ref().is_none_or(|(_, current, _)| outranks(&outcome, current)) {
                let perfect = outcome.tier.rank() == 0;
                let captures = Captures { stars: outcome.captures.clone(), that_stars, topic_stars };
                best = Some((index, outcome, captures));
                // Nothing later can beat the earliest exact match.
                if perfect {
                    break;
                }
            }
        }

        let (index, outcome, captures) = best?;
        let category = &self.categories[index];
        trace!(input = %input, index, pattern = %category.pattern, tier = ?outcome.tier, "selected rule");
        Some(RuleMatch { template: Arc::clone(&category.template), captures, tier: outcome.tier, score: outcome.score })
    }

    /// Captures of an optional context pattern; `None` when it does not match.
    fn context_captures(&self, context: &str, pattern: Option<&str>) -> Option<Vec<String>> {
        match pattern {
            None => Some(Vec::new()),
            Some(pattern) => {
                self.matcher.match_pattern(context, pattern, self.knowledge.as_ref()).map(|outcome| outcome.captures)
            }
        }
    }
}

impl RuleLookup for RuleSet {
    fn match_and_select(&self, input: &str, session: &Session) -> Option<RuleMatch> {
        self.select(input, session.that(), session.topic())
    }
}

/// Strictly better tier, or the same tier with a strictly higher score.
/// Ties keep the earlier category.
fn outranks(candidate: &MatchOutcome, current: &MatchOutcome) -> bool {
    match candidate.tier.rank().cmp(&current.tier.rank()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => candidate.score > current.score,
        std::cmp::Ordering::Greater => false,
    }
}

/// Replace sentence punctuation with spaces and collapse whitespace.
pub fn normalize_input(input: &str) -> String {
    let punctuation = static_regex!(r"[!?.,;:]+");
    punctuation.replace_all(input, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HistoryConfig, MatcherConfig};
    use crate::engine::{MatchTier, SynonymTable};
    use crate::knowledge::MemoryKnowledgeBase;
    use crate::session::HistoryKind;

    fn rules(categories: Vec<Category>) -> RuleSet {
        let matcher =
            ContextMatcher::new(MatcherConfig::default(), Arc::new(SynonymTable::default_english())).unwrap();
        let kb = MemoryKnowledgeBase::new().with_set("COLORS", ["red", "green"]);
        categories.into_iter().fold(RuleSet::new(Arc::new(matcher), Arc::new(kb)), RuleSet::with)
    }

    fn chosen(rules: &RuleSet, input: &str) -> Option<String> {
        chosen_in(rules, input, "", "")
    }

    fn chosen_in(rules: &RuleSet, input: &str, that: &str, topic: &str) -> Option<String> {
        let m = rules.select(input, that, topic)?;
        match m.template.nodes() {
            [crate::template::TemplateNode::Text(text)] => Some(text.clone()),
            _ => None,
        }
    }

    #[test]
    fn punctuation_is_ignored() {
        assert_eq!(normalize_input("  Hello,   world!! How are you? "), "Hello world How are you");
    }

    #[test]
    fn earliest_category_wins_within_a_tier() {
        let set = rules(vec![
            Category::new("HELLO *", Template::text("wild")),
            Category::new("HELLO THERE", Template::text("exact")),
        ]);
        assert_eq!(chosen(&set, "hello there").as_deref(), Some("wild"));
    }

    #[test]
    fn exact_tier_beats_expansion_regardless_of_order() {
        let set = rules(vec![
            Category::new("I LIKE <set>COLORS</set>", Template::text("expanded")),
            Category::new("I LIKE RED", Template::text("exact")),
        ]);
        assert_eq!(chosen(&set, "I like red").as_deref(), Some("exact"));
    }

    #[test]
    fn higher_tiers_win_and_scores_break_ties() {
        let set = rules(vec![
            Category::new("WHAT IS THE WEATHER", Template::text("fuzzy")),
            Category::new("WHAT IS THE WETHER TODAY", Template::text("no")),
            Category::new("I LIKE <set>COLORS</set>", Template::text("colors")),
        ]);
        let m = set.select("what is the wether", "", "").unwrap();
        assert_eq!(m.tier, MatchTier::Fuzzy);
        assert_eq!(chosen(&set, "I adore green").as_deref(), Some("colors"));
        assert!(set.select("completely unrelated", "", "").is_none());
    }

    #[test]
    fn that_and_topic_patterns_filter_and_capture() {
        let set = rules(vec![
            Category::new("YES", Template::text("glad you like *")).with_that("DO YOU LIKE *"),
            Category::new("YES", Template::text("pet yes")).with_topic("PETS"),
            Category::new("YES", Template::text("plain yes")),
        ]);

        let m = set.select("yes", "Do you like jazz?", "").unwrap();
        assert_eq!(m.captures.that_stars, ["jazz"]);
        assert_eq!(m.captures.stars, Vec::<String>::new());

        assert_eq!(set.select("yes", "", "pets").unwrap().captures.topic_stars, Vec::<String>::new());
        assert_eq!(chosen_in(&set, "yes", "", "pets").as_deref(), Some("pet yes"));
        assert_eq!(chosen(&set, "yes").as_deref(), Some("plain yes"));
    }

    #[test]
    fn lookup_reads_context_from_session() {
        let set = rules(vec![Category::new("WHY", Template::text("because")).with_that("I AM *")]);
        let mut session = Session::new("s", HistoryConfig::default()).unwrap();
        assert!(set.match_and_select("why", &session).is_none());

        session.append(HistoryKind::That, "I am a bot.");
        let m = set.match_and_select("Why?", &session).unwrap();
        assert_eq!(m.captures.that_stars, ["a bot"]);
    }
}
