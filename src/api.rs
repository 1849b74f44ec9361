use crate::config::EngineConfig;
use crate::engine::{CacheStats, ContextMatcher, MatchTier, PatternCache, SynonymTable};
use crate::error::{Diagnostic, Result};
use crate::knowledge::KnowledgeBase;
use crate::rules::{Category, RuleSet};
use crate::session::{HistoryKind, Session, SessionStore};
use crate::template::{EvalMetrics, Evaluator, ExtensionRegistry, ExternalService, RuleLookup};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of one conversational turn.
#[derive(Debug, Clone)]
pub struct Reply {
    /// The bot's answer, whitespace-normalized.
    pub text: String,
    /// Whether a rule matched the input.
    pub matched: bool,
    /// Tier that selected the rule, if any.
    pub tier: Option<MatchTier>,
    /// Contained failures recorded while evaluating the template.
    pub diagnostics: Vec<Diagnostic>,
    /// Evaluation counters; default when no rule matched.
    pub metrics: EvalMetrics,
    /// Total elapsed time for the turn, rule selection included.
    pub elapsed: Duration,
}

/// The per-turn pipeline: record the request, select a rule, evaluate it and
/// record the reply.
///
/// # Example
/// ```
/// use colloquy::{Category, MemoryKnowledgeBase, Responder, TemplateNode};
/// use std::sync::Arc;
///
/// let responder = Responder::builder(Arc::new(MemoryKnowledgeBase::new()))
///     .category(Category::new("MY NAME IS *", vec![TemplateNode::text("Hello, "), TemplateNode::star(1)]))
///     .build()
///     .unwrap();
///
/// let mut session = responder.new_session("demo");
/// let reply = responder.respond(&mut session, "my name is Ada");
/// assert_eq!(reply.text, "Hello, Ada");
/// ```
#[derive(Debug)]
pub struct Responder {
    config: EngineConfig,
    matcher: Arc<ContextMatcher>,
    rules: Arc<RuleSet>,
    evaluator: Evaluator,
}

impl Responder {
    pub fn builder(knowledge: Arc<dyn KnowledgeBase>) -> ResponderBuilder {
        ResponderBuilder {
            knowledge,
            config: EngineConfig::default(),
            synonyms: None,
            cache: None,
            categories: Vec::new(),
            extensions: ExtensionRegistry::new(),
            external: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &ContextMatcher {
        &self.matcher
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.matcher.cache().stats()
    }

    /// A fresh session using the configured history bounds.
    pub fn new_session(&self, id: impl Into<String>) -> Session {
        Session::from_validated(id.into(), self.config.history)
    }

    /// A session store using the configured history bounds.
    pub fn new_store(&self) -> Result<SessionStore> {
        SessionStore::new(self.config.history)
    }

    /// Answer `input` within `session`.
    pub fn respond(&self, session: &mut Session, input: &str) -> Reply {
        let start = Instant::now();
        session.append(HistoryKind::Request, input.trim());

        let reply = match self.rules.match_and_select(input, session) {
            Some(selected) => {
                let evaluation = self.evaluator.evaluate(&selected.template, session, &selected.captures);
                Reply {
                    text: evaluation.text,
                    matched: true,
                    tier: Some(selected.tier),
                    diagnostics: evaluation.diagnostics,
                    metrics: evaluation.metrics,
                    elapsed: Duration::ZERO,
                }
            }
            None => {
                debug!(session = session.id(), input, "no rule matched");
                Reply {
                    text: self.config.eval.no_match_response.clone(),
                    matched: false,
                    tier: None,
                    diagnostics: Vec::new(),
                    metrics: EvalMetrics::default(),
                    elapsed: Duration::ZERO,
                }
            }
        };

        session.append(HistoryKind::Response, reply.text.clone());
        session.append(HistoryKind::That, reply.text.clone());
        Reply { elapsed: start.elapsed(), ..reply }
    }

    /// Answer `input` for the session `id` of `store`, creating it on first
    /// contact. Turns of the same session are serialized.
    pub fn respond_in(&self, store: &SessionStore, id: &str, input: &str) -> Reply {
        let session = store.get_or_create(id);
        let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
        self.respond(&mut session, input)
    }
}

/// Builder for [`Responder`].
pub struct ResponderBuilder {
    knowledge: Arc<dyn KnowledgeBase>,
    config: EngineConfig,
    synonyms: Option<SynonymTable>,
    cache: Option<Arc<PatternCache>>,
    categories: Vec<Category>,
    extensions: ExtensionRegistry,
    external: Option<Arc<dyn ExternalService>>,
}

impl ResponderBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Synonyms for the semantic tier; the built-in English table otherwise.
    pub fn synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = Some(synonyms);
        self
    }

    /// Share a pattern cache with other responders instead of creating one.
    pub fn shared_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories.extend(categories);
        self
    }

    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn external(mut self, external: Arc<dyn ExternalService>) -> Self {
        self.external = Some(external);
        self
    }

    /// Validate the configuration and assemble the pipeline.
    pub fn build(self) -> Result<Responder> {
        let ResponderBuilder { knowledge, config, synonyms, cache, categories, extensions, external } = self;
        config.validate()?;

        let synonyms = Arc::new(synonyms.unwrap_or_else(SynonymTable::default_english));
        let matcher = Arc::new(match cache {
            Some(cache) => ContextMatcher::with_cache(config.matcher.clone(), cache, synonyms)?,
            None => ContextMatcher::new(config.matcher.clone(), synonyms)?,
        });

        let mut rules = RuleSet::new(Arc::clone(&matcher), Arc::clone(&knowledge));
        for category in categories {
            rules.add(category);
        }
        let rules = Arc::new(rules);

        let mut evaluator = Evaluator::new(config.eval.clone(), Arc::clone(&matcher), knowledge)?
            .with_rules(Arc::clone(&rules) as Arc<dyn RuleLookup>)
            .with_extensions(extensions);
        if let Some(external) = external {
            evaluator = evaluator.with_external(external);
        }

        debug!(categories = rules.len(), "built responder");
        Ok(Responder { config, matcher, rules, evaluator })
    }
}
