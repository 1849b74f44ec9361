//! Engine configuration.
//!
//! All knobs live in [`EngineConfig`], split by subsystem. Every field has a
//! default so partial TOML documents are accepted:
//!
//! ```toml
//! [matcher]
//! cache_capacity = 2048
//! fuzzy_threshold = 0.85
//!
//! [history]
//! max_depth = 20
//!
//! [eval]
//! max_recursion_depth = 12
//! default_value = "unknown"
//! ```
//!
//! | Setting | Default |
//! |---------|---------|
//! | `matcher.cache_capacity` | 1024 |
//! | `matcher.fuzzy_threshold` | 0.8 |
//! | `matcher.fuzzy_token_floor` | 0.0 (off) |
//! | `matcher.synonym_weight` | 0.9 |
//! | `matcher.max_expansions` | 4096 |
//! | `matcher.tiers` | all |
//! | `history.max_depth` | 20 |
//! | `history.max_memory_bytes` | 65536 |
//! | `history.compression_threshold` | 10 |
//! | `eval.max_recursion_depth` | 16 |
//! | `eval.default_value` | `"unknown"` |
//! | `eval.external_default` | `""` |
//! | `eval.external_timeout_ms` | 2000 |

use crate::engine::MatchTiers;
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    pub history: HistoryConfig,
    pub eval: EvalConfig,
}

impl EngineConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.history.validate()?;
        self.eval.validate()
    }
}

/// Context matcher and pattern cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Maximum number of compiled patterns kept in the shared cache.
    pub cache_capacity: usize,
    /// Minimum mean similarity for a fuzzy match.
    pub fuzzy_threshold: f64,
    /// Minimum similarity of every single literal in a fuzzy match. The
    /// default of 0 leaves the decision to `fuzzy_threshold` alone.
    pub fuzzy_token_floor: f64,
    /// Score contributed by a synonym hit in the semantic tier.
    pub synonym_weight: f64,
    /// Upper bound on the patterns produced by set/topic expansion.
    pub max_expansions: usize,
    /// Tiers the matcher is allowed to try.
    pub tiers: MatchTiers,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            fuzzy_threshold: 0.8,
            fuzzy_token_floor: 0.0,
            synonym_weight: 0.9,
            max_expansions: 4096,
            tiers: MatchTiers::all(),
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(EngineError::invalid("matcher.cache_capacity", "must be greater than zero"));
        }
        if self.max_expansions == 0 {
            return Err(EngineError::invalid("matcher.max_expansions", "must be greater than zero"));
        }
        for (field, value) in [
            ("matcher.fuzzy_threshold", self.fuzzy_threshold),
            ("matcher.fuzzy_token_floor", self.fuzzy_token_floor),
            ("matcher.synonym_weight", self.synonym_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid(field, format!("must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

/// Per-session history bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of entries kept per history.
    pub max_depth: usize,
    /// Ceiling used by validation when summing stored bytes.
    pub max_memory_bytes: usize,
    /// Slack above `max_depth` after which appends compress in bulk.
    pub compression_threshold: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 20, max_memory_bytes: 64 * 1024, compression_threshold: 10 }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(EngineError::invalid("history.max_depth", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Template evaluation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Deepest allowed srai nesting.
    pub max_recursion_depth: usize,
    /// Value substituted by `get` and `bot` on a lookup miss.
    pub default_value: String,
    /// Value substituted when the external call fails.
    pub external_default: String,
    /// Timeout handed to the external-call collaborator.
    pub external_timeout_ms: u64,
    /// Make `set` display the stored value instead of the empty string.
    pub set_displays_value: bool,
    /// Collapse whitespace runs and trim the final output.
    pub normalize_whitespace: bool,
    /// Seed for random-choice; entropy when absent.
    pub random_seed: Option<u64>,
    /// Output of a turn when no rule matches the input.
    pub no_match_response: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 16,
            default_value: "unknown".to_string(),
            external_default: String::new(),
            external_timeout_ms: 2000,
            set_displays_value: false,
            normalize_whitespace: true,
            random_seed: None,
            no_match_response: String::new(),
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_recursion_depth == 0 {
            return Err(EngineError::invalid("eval.max_recursion_depth", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.history.max_depth, 20);
        assert_eq!(config.eval.default_value, "unknown");
        assert!(config.matcher.tiers.contains(MatchTiers::SEMANTIC));
        assert_eq!(config.matcher.fuzzy_token_floor, 0.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [history]
            max_depth = 5

            [eval]
            random_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.history.max_depth, 5);
        assert_eq!(config.history.compression_threshold, 10);
        assert_eq!(config.eval.random_seed, Some(7));
        assert_eq!(config.matcher.cache_capacity, 1024);
    }

    #[test]
    fn tiers_parse_from_flag_names() {
        let config = EngineConfig::from_toml_str(
            r#"
            [matcher]
            tiers = "EXACT | SETS"
            "#,
        )
        .unwrap();
        assert_eq!(config.matcher.tiers, MatchTiers::EXACT | MatchTiers::SETS);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = EngineConfig::from_toml_str("[history]\nmax_depth = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { field: "history.max_depth", .. }));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let config = MatcherConfig { fuzzy_threshold: 1.5, ..MatcherConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[history\nmax_depth = 3").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }
}
