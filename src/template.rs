//! Response templates.
//!
//! A template is an immutable tree of [`TemplateNode`]s produced by an external
//! parser. Evaluation walks it depth-first, left to right, and is the only
//! place where the tree meets session state:
//!
//! ```text
//! Template ── Evaluator::evaluate(&mut Session, &Captures)
//!   │             │
//!   │             ├─ Text / Star / That / Input / Bot ...  read-only leaves
//!   │             ├─ Set / Think / Condition / Random      session variables, output control
//!   │             ├─ Srai ──▶ RuleLookup ──▶ nested template at depth + 1
//!   │             ├─ External ──▶ ExternalService (with timeout)
//!   │             └─ Extension ──▶ ExtensionRegistry by tag
//!   v
//! Evaluation { text, diagnostics, metrics }
//! ```
//!
//! Core tags are a closed enum; everything else is an [`TemplateNode::Extension`]
//! dispatched to a registered handler, so hosts add transforms without touching
//! the evaluator.
//!
//! Failures never abort evaluation. Each failing node is replaced by a default
//! substitution and reported as a [`crate::Diagnostic`].

#[path = "template/collaborators.rs"]
mod collaborators;
#[path = "template/eval.rs"]
mod eval;
#[path = "template/metrics.rs"]
mod metrics;

pub use collaborators::{
    Captures, ExtensionHandler, ExtensionRegistry, ExternalService, RuleLookup, RuleMatch, ServiceDescriptor,
};
pub use eval::{EvalOptions, Evaluation, Evaluator};
pub use metrics::EvalMetrics;

use std::collections::BTreeMap;

/// Attributes of a generic tagged node, as handed over by a parser.
pub type Attributes = BTreeMap<String, String>;

/// Where a `set` stores its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarScope {
    /// Session variables, visible to every later turn.
    #[default]
    Session,
    /// Visible only to the rest of the current template.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    Set { name: String, scope: VarScope, children: Vec<TemplateNode> },
    /// Reads a local variable, then the session variable of the same name.
    Get { name: String },
    /// Evaluates its children for their side effects only.
    Think(Vec<TemplateNode>),
    Condition(Condition),
    /// One list item is picked uniformly at random.
    Random(Vec<Vec<TemplateNode>>),
    /// Evaluates its children and feeds the result back through rule lookup.
    Srai(Vec<TemplateNode>),
    External { service: ServiceDescriptor, children: Vec<TemplateNode> },
    /// 1-based capture of the input pattern.
    Star { index: usize },
    /// 1-based capture of the that-pattern.
    ThatStar { index: usize },
    /// 1-based capture of the topic-pattern.
    TopicStar { index: usize },
    /// 1-based entry of the that-history.
    That { index: usize },
    /// 1-based entry of the request history.
    Input { index: usize },
    /// 1-based entry of the response history.
    Response { index: usize },
    Topic,
    Bot { name: String },
    Extension { tag: String, attributes: Attributes, children: Vec<TemplateNode> },
    /// A tagged node whose attributes could not be accepted.
    Malformed { tag: String, reason: String },
}

/// A multi-branch conditional.
///
/// Branches are tested in order; a branch without a value is the default and
/// only runs when no valued branch matched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    /// Variable tested by branches that do not name their own.
    pub name: Option<String>,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branch {
    pub name: Option<String>,
    /// Pattern compared against the variable with the exact matcher tier.
    pub value: Option<String>,
    pub children: Vec<TemplateNode>,
}

impl Branch {
    pub fn when(value: impl Into<String>, children: Vec<TemplateNode>) -> Self {
        Branch { name: None, value: Some(value.into()), children }
    }

    pub fn otherwise(children: Vec<TemplateNode>) -> Self {
        Branch { name: None, value: None, children }
    }
}

impl TemplateNode {
    pub fn text(text: impl Into<String>) -> Self {
        TemplateNode::Text(text.into())
    }

    pub fn set(name: impl Into<String>, children: Vec<TemplateNode>) -> Self {
        TemplateNode::Set { name: name.into(), scope: VarScope::Session, children }
    }

    pub fn set_local(name: impl Into<String>, children: Vec<TemplateNode>) -> Self {
        TemplateNode::Set { name: name.into(), scope: VarScope::Local, children }
    }

    pub fn get(name: impl Into<String>) -> Self {
        TemplateNode::Get { name: name.into() }
    }

    pub fn star(index: usize) -> Self {
        TemplateNode::Star { index }
    }

    pub fn condition(name: impl Into<String>, branches: Vec<Branch>) -> Self {
        TemplateNode::Condition(Condition { name: Some(name.into()), branches })
    }

    pub fn extension(tag: impl Into<String>, children: Vec<TemplateNode>) -> Self {
        TemplateNode::Extension { tag: tag.into(), attributes: Attributes::new(), children }
    }

    /// Convert a generic tagged node from an external parser.
    ///
    /// Core tags are recognized case-insensitively and their attributes
    /// checked; an unusable attribute yields [`TemplateNode::Malformed`] rather
    /// than an error, so one bad node never rejects a whole template. Unknown
    /// tags become extensions. `<li>` items of `random` and `condition` are
    /// expected as `li` extensions among `children`.
    pub fn from_parts(tag: &str, attributes: &Attributes, children: Vec<TemplateNode>) -> Self {
        let lower = tag.to_ascii_lowercase();
        let attr = |key: &str| attributes.get(key).map(String::as_str);

        match lower.as_str() {
            "set" => match (attr("name"), attr("var")) {
                (Some(name), _) => TemplateNode::Set { name: name.to_string(), scope: VarScope::Session, children },
                (None, Some(var)) => TemplateNode::Set { name: var.to_string(), scope: VarScope::Local, children },
                (None, None) => malformed(tag, "requires a name or var attribute"),
            },
            "get" => match attr("name").or_else(|| attr("var")) {
                Some(name) => TemplateNode::Get { name: name.to_string() },
                None => malformed(tag, "requires a name or var attribute"),
            },
            "think" => TemplateNode::Think(children),
            "srai" => TemplateNode::Srai(children),
            "sr" => TemplateNode::Srai(vec![TemplateNode::Star { index: 1 }]),
            "random" => TemplateNode::Random(list_items(children).map(|(_, children)| children).collect()),
            "condition" => condition_from_parts(tag, attributes, children),
            "star" => indexed(tag, attributes, |index| TemplateNode::Star { index }),
            "thatstar" => indexed(tag, attributes, |index| TemplateNode::ThatStar { index }),
            "topicstar" => indexed(tag, attributes, |index| TemplateNode::TopicStar { index }),
            "that" => indexed(tag, attributes, |index| TemplateNode::That { index }),
            "input" | "request" => indexed(tag, attributes, |index| TemplateNode::Input { index }),
            "response" => indexed(tag, attributes, |index| TemplateNode::Response { index }),
            "topic" => TemplateNode::Topic,
            "bot" => match attr("name") {
                Some(name) => TemplateNode::Bot { name: name.to_string() },
                None => malformed(tag, "requires a name attribute"),
            },
            "sraix" | "external" => {
                let name = attr("service").or_else(|| attr("bot")).unwrap_or(ServiceDescriptor::DEFAULT_NAME);
                let service = ServiceDescriptor { name: name.to_string(), attributes: attributes.clone() };
                TemplateNode::External { service, children }
            }
            _ => TemplateNode::Extension { tag: tag.to_string(), attributes: attributes.clone(), children },
        }
    }
}

fn malformed(tag: &str, reason: impl Into<String>) -> TemplateNode {
    TemplateNode::Malformed { tag: tag.to_string(), reason: reason.into() }
}

/// Parse the `index` attribute of a star-family or history tag. Only the
/// first component of `"2,1"` style indexes is used.
fn indexed(tag: &str, attributes: &Attributes, build: impl FnOnce(usize) -> TemplateNode) -> TemplateNode {
    let Some(raw) = attributes.get("index") else {
        return build(1);
    };
    let first = raw.split(',').next().unwrap_or("").trim();
    match first.parse::<usize>() {
        Ok(index) if index >= 1 => build(index),
        _ => malformed(tag, format!("index must be a positive integer, got '{raw}'")),
    }
}

fn list_items(children: Vec<TemplateNode>) -> impl Iterator<Item = (Attributes, Vec<TemplateNode>)> {
    children.into_iter().filter_map(|child| match child {
        TemplateNode::Extension { tag, attributes, children } if tag.eq_ignore_ascii_case("li") => {
            Some((attributes, children))
        }
        _ => None,
    })
}

fn condition_from_parts(tag: &str, attributes: &Attributes, children: Vec<TemplateNode>) -> TemplateNode {
    let name = attributes.get("name").or_else(|| attributes.get("var")).cloned();

    // Single-branch form: <condition name="x" value="y">...</condition>
    if let Some(value) = attributes.get("value") {
        if name.is_none() {
            return malformed(tag, "a value attribute requires a name or var attribute");
        }
        let branch = Branch { name: None, value: Some(value.clone()), children };
        return TemplateNode::Condition(Condition { name, branches: vec![branch] });
    }

    let mut branches = Vec::new();
    for (item, children) in list_items(children) {
        let branch_name = item.get("name").or_else(|| item.get("var")).cloned();
        let value = item.get("value").cloned();
        if value.is_some() && branch_name.is_none() && name.is_none() {
            return malformed(tag, "a valued branch names no variable");
        }
        branches.push(Branch { name: branch_name, value, children });
    }
    TemplateNode::Condition(Condition { name, branches })
}

/// A parsed response template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    nodes: Vec<TemplateNode>,
}

impl Template {
    pub fn new(nodes: Vec<TemplateNode>) -> Self {
        Template { nodes }
    }

    /// A template consisting of a single text node.
    pub fn text(text: impl Into<String>) -> Self {
        Template::new(vec![TemplateNode::text(text)])
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }
}

impl From<Vec<TemplateNode>> for Template {
    fn from(nodes: Vec<TemplateNode>) -> Self {
        Template::new(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn li(pairs: &[(&str, &str)], text: &str) -> TemplateNode {
        TemplateNode::Extension { tag: "li".into(), attributes: attrs(pairs), children: vec![TemplateNode::text(text)] }
    }

    #[test]
    fn set_and_get_pick_scope_from_attribute() {
        let set = TemplateNode::from_parts("set", &attrs(&[("name", "mood")]), vec![TemplateNode::text("good")]);
        assert_eq!(set, TemplateNode::set("mood", vec![TemplateNode::text("good")]));

        let local = TemplateNode::from_parts("SET", &attrs(&[("var", "tmp")]), vec![]);
        assert_eq!(local, TemplateNode::set_local("tmp", vec![]));

        assert_eq!(TemplateNode::from_parts("get", &attrs(&[("var", "tmp")]), vec![]), TemplateNode::get("tmp"));
        assert!(matches!(TemplateNode::from_parts("get", &Attributes::new(), vec![]), TemplateNode::Malformed { .. }));
    }

    #[test]
    fn star_indexes_default_to_one_and_reject_zero() {
        assert_eq!(TemplateNode::from_parts("star", &Attributes::new(), vec![]), TemplateNode::Star { index: 1 });
        assert_eq!(
            TemplateNode::from_parts("that", &attrs(&[("index", "2,1")]), vec![]),
            TemplateNode::That { index: 2 }
        );
        assert_eq!(
            TemplateNode::from_parts("input", &attrs(&[("index", " 3 ")]), vec![]),
            TemplateNode::Input { index: 3 }
        );
        for bad in ["0", "-1", "two", ""] {
            let node = TemplateNode::from_parts("star", &attrs(&[("index", bad)]), vec![]);
            assert!(matches!(node, TemplateNode::Malformed { ref tag, .. } if tag == "star"), "{bad:?}");
        }
    }

    #[test]
    fn sr_is_srai_of_first_star() {
        assert_eq!(
            TemplateNode::from_parts("sr", &Attributes::new(), vec![]),
            TemplateNode::Srai(vec![TemplateNode::Star { index: 1 }])
        );
    }

    #[test]
    fn random_collects_list_items_only() {
        let node = TemplateNode::from_parts(
            "random",
            &Attributes::new(),
            vec![li(&[], "a"), TemplateNode::text("  "), li(&[], "b")],
        );
        assert_eq!(
            node,
            TemplateNode::Random(vec![vec![TemplateNode::text("a")], vec![TemplateNode::text("b")]])
        );
    }

    #[test]
    fn condition_forms() {
        let single =
            TemplateNode::from_parts("condition", &attrs(&[("name", "mood"), ("value", "happy")]), vec![]);
        let TemplateNode::Condition(single) = single else { panic!("expected condition") };
        assert_eq!(single.name.as_deref(), Some("mood"));
        assert_eq!(single.branches.len(), 1);

        let multi = TemplateNode::from_parts(
            "condition",
            &attrs(&[("name", "mood")]),
            vec![li(&[("value", "happy")], "yay"), li(&[("name", "other"), ("value", "*")], "hm"), li(&[], "meh")],
        );
        let TemplateNode::Condition(multi) = multi else { panic!("expected condition") };
        assert_eq!(multi.branches.len(), 3);
        assert_eq!(multi.branches[1].name.as_deref(), Some("other"));
        assert_eq!(multi.branches[2].value, None);

        let orphan = TemplateNode::from_parts("condition", &Attributes::new(), vec![li(&[("value", "x")], "x")]);
        assert!(matches!(orphan, TemplateNode::Malformed { .. }));
    }

    #[test]
    fn external_and_unknown_tags() {
        let node = TemplateNode::from_parts("sraix", &attrs(&[("service", "weather")]), vec![]);
        let TemplateNode::External { service, .. } = node else { panic!("expected external") };
        assert_eq!(service.name, "weather");
        assert_eq!(service.attributes.get("service").map(String::as_str), Some("weather"));

        let node = TemplateNode::from_parts("uppercase", &Attributes::new(), vec![TemplateNode::text("x")]);
        assert_eq!(node, TemplateNode::extension("uppercase", vec![TemplateNode::text("x")]));
    }
}
