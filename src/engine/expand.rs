//! Set/topic expansion.
//!
//! Rewrites every collection reference into one concrete pattern per member:
//!
//! ```text
//! "I like <set>COLORS</set>"   COLORS = [RED, GREEN, BLUE]
//!     ──▶ ["I like RED", "I like GREEN", "I like BLUE"]
//! ```
//!
//! Several references expand to their cartesian product with the first
//! reference outermost, so output order follows the members of the first
//! reference, then the second, and so on. A reference to an unknown collection
//! becomes a placeholder for exactly one word, rendered as `*`. A known but
//! empty collection contributes no patterns at all.

use super::pattern::{CompiledPattern, PatternToken};
use crate::knowledge::KnowledgeBase;
use tracing::warn;

/// Expand `pattern` against `kb`, producing pattern strings.
///
/// A pattern without references comes back unchanged as the only element.
pub fn expand(pattern: &str, kb: &dyn KnowledgeBase) -> Vec<String> {
    let compiled = CompiledPattern::compile(pattern);
    if !compiled.has_references() {
        return vec![pattern.to_string()];
    }
    expand_compiled(&compiled, kb, usize::MAX).iter().map(CompiledPattern::render).collect()
}

/// Expand a compiled pattern, keeping member tokens so matches can capture
/// the member. At most `limit` patterns are produced.
pub(crate) fn expand_compiled(pattern: &CompiledPattern, kb: &dyn KnowledgeBase, limit: usize) -> Vec<CompiledPattern> {
    let mut prefixes: Vec<Vec<PatternToken>> = vec![Vec::with_capacity(pattern.tokens().len())];
    let mut truncated = false;

    for token in pattern.tokens() {
        let PatternToken::Reference { kind, name } = token else {
            prefixes.iter_mut().for_each(|p| p.push(token.clone()));
            continue;
        };

        let Some(members) = kind.members(kb, name) else {
            prefixes.iter_mut().for_each(|p| p.push(PatternToken::AnyWord));
            continue;
        };

        let mut next = Vec::with_capacity(prefixes.len().saturating_mul(members.len()).min(limit));
        'outer: for prefix in &prefixes {
            for member in members {
                if next.len() >= limit {
                    truncated = true;
                    break 'outer;
                }
                let mut tokens = prefix.clone();
                tokens.push(PatternToken::member(member));
                next.push(tokens);
            }
        }
        prefixes = next;
    }

    if truncated {
        warn!(pattern = pattern.source(), limit, "set/topic expansion truncated");
    }

    prefixes.into_iter().map(|tokens| CompiledPattern::from_tokens(pattern.source().to_string(), tokens)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::MemoryKnowledgeBase;

    fn kb() -> MemoryKnowledgeBase {
        MemoryKnowledgeBase::new()
            .with_set("COLORS", ["RED", "GREEN", "BLUE"])
            .with_set("SIZES", ["BIG", "SMALL"])
            .with_set("NOTHING", Vec::<String>::new())
            .with_topic("PETS", ["CAT", "DOG"])
    }

    #[test]
    fn one_pattern_per_member_in_order() {
        let out = expand("I like <set>COLORS</set>", &kb());
        assert_eq!(out, ["I like RED", "I like GREEN", "I like BLUE"]);
    }

    #[test]
    fn unknown_collection_becomes_a_wildcard() {
        let out = expand("I like <set>FLAVORS</set> a lot", &kb());
        assert_eq!(out, ["I like * a lot"]);

        let compiled = expand_compiled(&CompiledPattern::compile("<set>FLAVORS</set>"), &kb(), usize::MAX);
        assert_eq!(compiled[0].tokens(), &[PatternToken::AnyWord]);
    }

    #[test]
    fn pattern_without_references_is_returned_as_is() {
        let out = expand("HELLO   *  there", &kb());
        assert_eq!(out, ["HELLO   *  there"]);
    }

    #[test]
    fn multiple_references_form_a_product_first_reference_outermost() {
        let out = expand("<set>SIZES</set> <topic>PETS</topic>", &kb());
        assert_eq!(out, ["BIG CAT", "BIG DOG", "SMALL CAT", "SMALL DOG"]);
    }

    #[test]
    fn empty_collection_expands_to_nothing() {
        assert!(expand("<set>NOTHING</set> here", &kb()).is_empty());
    }

    #[test]
    fn limit_truncates_the_product() {
        let compiled = CompiledPattern::compile("<set>COLORS</set> <set>SIZES</set>");
        let out = expand_compiled(&compiled, &kb(), 3);
        let rendered: Vec<String> = out.iter().map(CompiledPattern::render).collect();
        assert_eq!(rendered, ["RED BIG", "RED SMALL", "GREEN BIG"]);
    }
}
