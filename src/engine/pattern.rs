//! Pattern compilation.
//!
//! A raw pattern is a whitespace-separated token string:
//!
//! ```text
//! "I LIKE <set>colors</set> VERY *"
//!   │  │        │            │   └─ Wildcard(Star)
//!   │  │        │            └───── Literal("very")
//!   │  │        └────────────────── Reference { Set, "colors" }
//!   └──┴─────────────────────────── Literal("i"), Literal("like")
//! ```
//!
//! Wildcards:
//!
//! | Token | Consumes |
//! |-------|----------|
//! | `*`, `_` | one or more words |
//! | `^`, `#` | zero or more words |
//!
//! A reference tag may carry whitespace around the name (`<set> colors </set>`)
//! and may be glued to neighbouring text; it always becomes its own token.
//! A tag whose closing name does not match its opening name stays literal.
//!
//! Compiled patterns carry no session data, so one compiled pattern is shared
//! by every session through the cache.

use crate::knowledge::CollectionKind;
use std::fmt;

/// Wildcard flavours. `Star`/`Underscore` and `Caret`/`Hash` only differ in
/// the priority AIML assigns them; matching treats each pair the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WildcardKind {
    Star,
    Underscore,
    Caret,
    Hash,
}

impl WildcardKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "*" => Some(WildcardKind::Star),
            "_" => Some(WildcardKind::Underscore),
            "^" => Some(WildcardKind::Caret),
            "#" => Some(WildcardKind::Hash),
            _ => None,
        }
    }

    /// Minimum number of words the wildcard must consume.
    pub fn min_words(self) -> usize {
        match self {
            WildcardKind::Star | WildcardKind::Underscore => 1,
            WildcardKind::Caret | WildcardKind::Hash => 0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            WildcardKind::Star => "*",
            WildcardKind::Underscore => "_",
            WildcardKind::Caret => "^",
            WildcardKind::Hash => "#",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    /// A word that must be present. `folded` is the lowercase comparison key.
    Literal { text: String, folded: String },
    Wildcard(WildcardKind),
    /// A named set or topic, resolved against the knowledge base at match time.
    Reference { kind: CollectionKind, name: String },
    /// One member substituted for a reference by expansion. Matches its words
    /// literally and captures `text`.
    Member { text: String, words: Vec<String> },
    /// Stand-in for a reference to an unknown collection. Matches exactly one
    /// word and renders as `*`.
    AnyWord,
}

impl PatternToken {
    pub(crate) fn literal(text: &str) -> Self {
        PatternToken::Literal { text: text.to_string(), folded: text.to_lowercase() }
    }

    pub(crate) fn member(text: &str) -> Self {
        PatternToken::Member { text: text.to_string(), words: tokenize(text).map(str::to_lowercase).collect() }
    }

    /// Whether a successful match of this token produces a capture.
    pub fn captures(&self) -> bool {
        !matches!(self, PatternToken::Literal { .. })
    }

    /// Smallest number of utterance words this token can consume.
    pub(crate) fn min_words(&self) -> usize {
        match self {
            PatternToken::Literal { .. } | PatternToken::Reference { .. } | PatternToken::AnyWord => 1,
            PatternToken::Wildcard(kind) => kind.min_words(),
            PatternToken::Member { words, .. } => words.len(),
        }
    }
}

impl fmt::Display for PatternToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternToken::Literal { text, .. } => f.write_str(text),
            PatternToken::Wildcard(kind) => f.write_str(kind.symbol()),
            PatternToken::Reference { kind, name } => write!(f, "<{0}>{1}</{0}>", kind.tag(), name),
            PatternToken::Member { text, .. } => f.write_str(text),
            PatternToken::AnyWord => f.write_str(WildcardKind::Star.symbol()),
        }
    }
}

/// Tokenized pattern plus a wildcard-position index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    source: String,
    tokens: Vec<PatternToken>,
    wildcard_positions: Vec<usize>,
    has_references: bool,
}

impl CompiledPattern {
    /// Compile `source`. Every string is a valid pattern.
    pub fn compile(source: &str) -> Self {
        let reference = static_regex!(r"(?i)<(set|topic)>\s*([^<>\s]+)\s*</(set|topic)>");

        let mut tokens = Vec::new();
        let mut last = 0;
        for caps in reference.captures_iter(source) {
            let (Some(whole), Some(open), Some(name), Some(close)) =
                (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };
            if !open.as_str().eq_ignore_ascii_case(close.as_str()) {
                continue;
            }
            tokens.extend(tokenize(&source[last..whole.start()]).map(plain_token));
            let kind =
                if open.as_str().eq_ignore_ascii_case("set") { CollectionKind::Set } else { CollectionKind::Topic };
            tokens.push(PatternToken::Reference { kind, name: name.as_str().to_string() });
            last = whole.end();
        }
        tokens.extend(tokenize(&source[last..]).map(plain_token));

        Self::from_tokens(source.to_string(), tokens)
    }

    pub(crate) fn from_tokens(source: String, tokens: Vec<PatternToken>) -> Self {
        let wildcard_positions = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t, PatternToken::Wildcard(_) | PatternToken::AnyWord))
            .map(|(i, _)| i)
            .collect();
        let has_references = tokens.iter().any(|t| matches!(t, PatternToken::Reference { .. }));
        CompiledPattern { source, tokens, wildcard_positions, has_references }
    }

    /// The raw pattern this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// Indices into [`tokens`](Self::tokens) that hold wildcards.
    pub fn wildcard_positions(&self) -> &[usize] {
        &self.wildcard_positions
    }

    pub fn has_references(&self) -> bool {
        self.has_references
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of literal tokens (the positions scored by the fuzzy tier).
    pub fn literal_count(&self) -> usize {
        self.tokens.iter().filter(|t| matches!(t, PatternToken::Literal { .. })).count()
    }

    /// Render the tokens back into pattern syntax, single-space separated.
    pub fn render(&self) -> String {
        self.tokens.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
    }
}

fn plain_token(word: &str) -> PatternToken {
    match WildcardKind::parse(word) {
        Some(kind) => PatternToken::Wildcard(kind),
        None => PatternToken::literal(word),
    }
}

/// Split an utterance or pattern into words.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}
