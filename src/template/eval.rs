//! The template interpreter.
//!
//! Evaluation is a depth-first walk. Every node produces a string; nodes that
//! fail produce a substitution instead and leave a diagnostic behind:
//!
//! | Node | On failure yields | Diagnostic |
//! |------|-------------------|------------|
//! | `get`, `bot` | `eval.default_value` | LookupMiss |
//! | `star`, `that`, `input`, ... | `""` | LookupMiss |
//! | `srai` past the depth limit | `""` | RecursionLimitExceeded |
//! | `srai` without a matching rule | `""` | LookupMiss |
//! | external call | `eval.external_default` | CollaboratorFailure |
//! | extension handler error | `""` | CollaboratorFailure |
//! | unregistered extension | children's text | CollaboratorFailure |
//! | malformed node | `""` | MalformedAttribute |
//!
//! Srai depth travels explicitly in the evaluation frame; the depth check
//! happens before the nested lookup, so overflow can never reach the stack.

use super::collaborators::{Captures, ExtensionRegistry, ExternalService, RuleLookup};
use super::metrics::EvalMetrics;
use super::{Condition, Template, TemplateNode, VarScope};
use crate::config::EvalConfig;
use crate::engine::ContextMatcher;
use crate::error::{CollaboratorError, Diagnostic, DiagnosticKind, EvalError, Result};
use crate::knowledge::KnowledgeBase;
use crate::session::{HistoryKind, Session};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-call overrides of [`EvalConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// `set` yields the stored value instead of `""`.
    pub set_displays_value: bool,
}

/// Result of evaluating one template.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    pub metrics: EvalMetrics,
}

impl Evaluation {
    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

pub struct Evaluator {
    config: EvalConfig,
    matcher: Arc<ContextMatcher>,
    knowledge: Arc<dyn KnowledgeBase>,
    rules: Option<Arc<dyn RuleLookup>>,
    extensions: ExtensionRegistry,
    external: Option<Arc<dyn ExternalService>>,
    rng: Mutex<StdRng>,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("has_rules", &self.rules.is_some())
            .field("extensions", &self.extensions)
            .field("has_external", &self.external.is_some())
            .finish()
    }
}

/// A node failure together with the text that replaces the node.
struct Failure {
    error: EvalError,
    substitute: String,
}

impl Failure {
    fn new(error: EvalError, substitute: impl Into<String>) -> Self {
        Failure { error, substitute: substitute.into() }
    }
}

impl From<EvalError> for Failure {
    fn from(error: EvalError) -> Self {
        Failure::new(error, String::new())
    }
}

type NodeResult = std::result::Result<String, Failure>;

/// State shared by every frame of one evaluation.
struct Turn<'s> {
    session: &'s mut Session,
    diagnostics: Vec<Diagnostic>,
    metrics: EvalMetrics,
    options: EvalOptions,
}

/// One template activation: the top-level template or an srai target.
struct Frame<'c> {
    captures: &'c Captures,
    locals: HashMap<String, String>,
    depth: usize,
}

impl Evaluator {
    pub fn new(config: EvalConfig, matcher: Arc<ContextMatcher>, knowledge: Arc<dyn KnowledgeBase>) -> Result<Self> {
        config.validate()?;
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Evaluator {
            config,
            matcher,
            knowledge,
            rules: None,
            extensions: ExtensionRegistry::new(),
            external: None,
            rng: Mutex::new(rng),
        })
    }

    /// Rule lookup used by srai. Without one every srai reports a miss.
    pub fn with_rules(mut self, rules: Arc<dyn RuleLookup>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalService>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn default_options(&self) -> EvalOptions {
        EvalOptions { set_displays_value: self.config.set_displays_value }
    }

    pub fn evaluate(&self, template: &Template, session: &mut Session, captures: &Captures) -> Evaluation {
        self.evaluate_with(template, session, captures, self.default_options())
    }

    pub fn evaluate_with(
        &self,
        template: &Template,
        session: &mut Session,
        captures: &Captures,
        options: EvalOptions,
    ) -> Evaluation {
        let start = Instant::now();
        let mut turn = Turn { session, diagnostics: Vec::new(), metrics: EvalMetrics::default(), options };
        let mut frame = Frame { captures, locals: HashMap::new(), depth: 0 };

        let raw = self.eval_nodes(template.nodes(), &mut turn, &mut frame);
        let text = if self.config.normalize_whitespace { collapse_whitespace(&raw) } else { raw };

        turn.metrics.total = start.elapsed();
        debug!(
            session = turn.session.id(),
            nodes = turn.metrics.nodes_visited,
            diagnostics = turn.diagnostics.len(),
            "evaluated template"
        );
        Evaluation { text, diagnostics: turn.diagnostics, metrics: turn.metrics }
    }

    fn eval_nodes(&self, nodes: &[TemplateNode], turn: &mut Turn<'_>, frame: &mut Frame<'_>) -> String {
        let mut out = String::new();
        for node in nodes {
            match self.eval_node(node, turn, frame) {
                Ok(text) => out.push_str(&text),
                Err(failure) => {
                    record(turn, &failure.error, frame.depth);
                    out.push_str(&failure.substitute);
                }
            }
        }
        out
    }

    fn eval_node(&self, node: &TemplateNode, turn: &mut Turn<'_>, frame: &mut Frame<'_>) -> NodeResult {
        turn.metrics.nodes_visited += 1;

        match node {
            TemplateNode::Text(text) => Ok(text.clone()),
            TemplateNode::Set { name, scope, children } => {
                let value = collapse_whitespace(&self.eval_nodes(children, turn, frame));
                match scope {
                    VarScope::Session => {
                        if name.eq_ignore_ascii_case("topic") {
                            turn.session.set_topic(value.clone());
                        }
                        turn.session.set_variable(name.clone(), value.clone());
                    }
                    VarScope::Local => {
                        frame.locals.insert(name.clone(), value.clone());
                    }
                }
                Ok(if turn.options.set_displays_value { value } else { String::new() })
            }
            TemplateNode::Get { name } => match lookup_variable(name, turn, frame) {
                Some(value) => Ok(value.to_string()),
                None => Err(Failure::new(
                    EvalError::LookupMiss(format!("variable '{name}' is not set")),
                    self.config.default_value.clone(),
                )),
            },
            TemplateNode::Think(children) => {
                // Failures below are already contained and recorded.
                self.eval_nodes(children, turn, frame);
                Ok(String::new())
            }
            TemplateNode::Condition(condition) => Ok(self.eval_condition(condition, turn, frame)),
            TemplateNode::Random(items) => {
                if items.is_empty() {
                    return Ok(String::new());
                }
                let pick = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen_range(0..items.len());
                Ok(self.eval_nodes(&items[pick], turn, frame))
            }
            TemplateNode::Srai(children) => {
                let input = collapse_whitespace(&self.eval_nodes(children, turn, frame));
                self.srai(input, turn, frame.depth)
            }
            TemplateNode::External { service, children } => {
                let request = collapse_whitespace(&self.eval_nodes(children, turn, frame));
                turn.metrics.external_calls += 1;
                self.call_external(&service.name, |external, timeout| external.invoke(service, &request, timeout))
            }
            TemplateNode::Star { index } => capture(&frame.captures.stars, *index, "star"),
            TemplateNode::ThatStar { index } => capture(&frame.captures.that_stars, *index, "thatstar"),
            TemplateNode::TopicStar { index } => capture(&frame.captures.topic_stars, *index, "topicstar"),
            TemplateNode::That { index } => history_entry(turn.session, HistoryKind::That, *index),
            TemplateNode::Input { index } => history_entry(turn.session, HistoryKind::Request, *index),
            TemplateNode::Response { index } => history_entry(turn.session, HistoryKind::Response, *index),
            TemplateNode::Topic => Ok(turn.session.topic().to_string()),
            TemplateNode::Bot { name } => match self.knowledge.bot_property(name) {
                Some(value) => Ok(value.to_string()),
                None => Err(Failure::new(
                    EvalError::LookupMiss(format!("bot property '{name}' is not defined")),
                    self.config.default_value.clone(),
                )),
            },
            TemplateNode::Extension { tag, attributes, children } => {
                let texts: Vec<String> =
                    children.iter().map(|child| self.eval_nodes(std::slice::from_ref(child), turn, frame)).collect();
                match self.extensions.get(tag) {
                    Some(handler) => handler.apply(attributes, &texts).map_err(|source| {
                        Failure::from(EvalError::Collaborator { name: tag.clone(), source })
                    }),
                    None => Err(Failure::new(
                        EvalError::Collaborator {
                            name: tag.clone(),
                            source: CollaboratorError::Unavailable(tag.clone()),
                        },
                        texts.concat(),
                    )),
                }
            }
            TemplateNode::Malformed { tag, reason } => {
                Err(EvalError::MalformedAttribute { tag: tag.clone(), reason: reason.clone() }.into())
            }
        }
    }

    /// Run the first branch whose value pattern matches, else the first
    /// default branch. Only the selected branch is evaluated.
    fn eval_condition(&self, condition: &Condition, turn: &mut Turn<'_>, frame: &mut Frame<'_>) -> String {
        let mut fallback = None;
        for branch in &condition.branches {
            let Some(pattern) = &branch.value else {
                fallback = fallback.or(Some(branch));
                continue;
            };
            let Some(name) = branch.name.as_ref().or(condition.name.as_ref()) else {
                continue;
            };
            let matched = match lookup_variable(name, turn, frame) {
                Some(value) => self.matcher.match_exact(value, pattern).is_some(),
                // An unbound variable only equals the configured default.
                None => pattern.trim().eq_ignore_ascii_case(&self.config.default_value),
            };
            if matched {
                return self.eval_nodes(&branch.children, turn, frame);
            }
        }
        match fallback {
            Some(branch) => self.eval_nodes(&branch.children, turn, frame),
            None => String::new(),
        }
    }

    fn srai(&self, input: String, turn: &mut Turn<'_>, depth: usize) -> NodeResult {
        turn.metrics.srai_calls += 1;
        let limit = self.config.max_recursion_depth;
        let next = depth + 1;
        if next > limit {
            warn!(limit, input = %input, "srai recursion limit reached");
            return Err(EvalError::RecursionLimitExceeded { limit, input }.into());
        }

        let Some(rules) = &self.rules else {
            return Err(EvalError::NoMatchingRule(input).into());
        };
        let Some(selected) = rules.match_and_select(&input, turn.session) else {
            return Err(EvalError::NoMatchingRule(input).into());
        };

        debug!(depth = next, input = %input, tier = ?selected.tier, "srai");
        turn.metrics.enter_depth(next);
        let mut frame = Frame { captures: &selected.captures, locals: HashMap::new(), depth: next };
        Ok(self.eval_nodes(selected.template.nodes(), turn, &mut frame))
    }

    fn call_external<F>(&self, name: &str, call: F) -> NodeResult
    where
        F: FnOnce(&dyn ExternalService, Duration) -> std::result::Result<String, CollaboratorError>,
    {
        let fail = |source| {
            let error = EvalError::Collaborator { name: name.to_string(), source };
            Failure::new(error, self.config.external_default.clone())
        };
        let Some(external) = &self.external else {
            return Err(fail(CollaboratorError::Unavailable(name.to_string())));
        };

        let timeout = self.config.external_timeout();
        let started = Instant::now();
        let response = call(external.as_ref(), timeout).map_err(fail)?;
        let elapsed = started.elapsed();
        if elapsed > timeout {
            return Err(fail(CollaboratorError::Timeout(elapsed)));
        }
        Ok(response)
    }
}

fn record(turn: &mut Turn<'_>, error: &EvalError, depth: usize) {
    match error.kind() {
        DiagnosticKind::LookupMiss => debug!(depth, %error, "node failed"),
        _ => warn!(depth, %error, "node failed"),
    }
    turn.diagnostics.push(Diagnostic::from_error(error, depth));
}

fn lookup_variable<'t>(name: &str, turn: &'t Turn<'_>, frame: &'t Frame<'_>) -> Option<&'t str> {
    frame.locals.get(name).map(String::as_str).or_else(|| turn.session.variable(name))
}

fn capture(values: &[String], index: usize, tag: &str) -> NodeResult {
    index
        .checked_sub(1)
        .and_then(|i| values.get(i))
        .cloned()
        .ok_or_else(|| EvalError::LookupMiss(format!("{tag} {index} was not captured")).into())
}

fn history_entry(session: &Session, kind: HistoryKind, index: usize) -> NodeResult {
    session
        .get_by_index(kind, index)
        .map(str::to_string)
        .ok_or_else(|| EvalError::LookupMiss(format!("{kind} history has no entry {index}")).into())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
