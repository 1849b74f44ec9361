//! Seams between the evaluator and the outside world.
//!
//! Everything here is an explicitly constructed value handed to the
//! [`Evaluator`](super::Evaluator); nothing is registered globally.

use super::{Attributes, Template};
use crate::engine::MatchTier;
use crate::error::CollaboratorError;
use crate::session::Session;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A pure text transform bound to an extension tag (`uppercase`, `date`, ...).
///
/// `children` holds the evaluated text of each child node, in order.
pub trait ExtensionHandler: Send + Sync {
    fn apply(&self, attributes: &Attributes, children: &[String]) -> Result<String, CollaboratorError>;
}

impl<F> ExtensionHandler for F
where
    F: Fn(&Attributes, &[String]) -> Result<String, CollaboratorError> + Send + Sync,
{
    fn apply(&self, attributes: &Attributes, children: &[String]) -> Result<String, CollaboratorError> {
        self(attributes, children)
    }
}

/// Extension handlers keyed by lowercase tag.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<H: ExtensionHandler + 'static>(mut self, tag: &str, handler: H) -> Self {
        self.register(tag, handler);
        self
    }

    pub fn register<H: ExtensionHandler + 'static>(&mut self, tag: &str, handler: H) {
        self.handlers.insert(tag.to_ascii_lowercase(), Arc::new(handler));
    }

    pub fn get(&self, tag: &str) -> Option<&dyn ExtensionHandler> {
        self.handlers.get(&tag.to_ascii_lowercase()).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("ExtensionRegistry").field("tags", &tags).finish()
    }
}

/// Which external service an external-call node addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceDescriptor {
    pub name: String,
    /// All attributes of the originating node.
    pub attributes: Attributes,
}

impl ServiceDescriptor {
    /// Service name used when the node names none.
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn named(name: impl Into<String>) -> Self {
        ServiceDescriptor { name: name.into(), attributes: Attributes::new() }
    }
}

/// Bridge to a remote bot or web service.
///
/// Implementations should give up after `timeout`; the evaluator also
/// discards a response that arrives after the deadline.
pub trait ExternalService: Send + Sync {
    fn invoke(
        &self,
        service: &ServiceDescriptor,
        request: &str,
        timeout: Duration,
    ) -> Result<String, CollaboratorError>;
}

/// Text bound by the wildcards and references of a matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Captures {
    pub stars: Vec<String>,
    pub that_stars: Vec<String>,
    pub topic_stars: Vec<String>,
}

impl Captures {
    /// Captures of the input pattern only.
    pub fn from_stars<I, S>(stars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Captures { stars: stars.into_iter().map(Into::into).collect(), ..Captures::default() }
    }
}

/// A rule selected for an input.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub template: Arc<Template>,
    pub captures: Captures,
    /// Tier that matched the input pattern.
    pub tier: MatchTier,
    pub score: f64,
}

/// The rule-selection pipeline: normalize, match, pick the best candidate.
///
/// Used for top-level turns and re-entered by srai.
pub trait RuleLookup: Send + Sync {
    fn match_and_select(&self, input: &str, session: &Session) -> Option<RuleMatch>;
}
