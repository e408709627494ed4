//! Node model
//!
//! A parsed template is a tree of [`Node`]s. The set of node kinds is closed;
//! consumers match on it exhaustively. Trees are immutable once built and are
//! shared between evaluations.

use crate::expr::Expression;
use serde::Serialize;
use twoway_core::{ParameterDirection, SqlType};

/// Byte range in the template text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the two ranges share at least one byte
    pub const fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Metadata shared by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMeta {
    /// Location of the matched text
    pub span: Span,

    /// Matched marker text, including the dummy literal (literal nodes: the SQL text)
    pub marker: String,

    /// 1-based line of `span.start`
    pub line: usize,

    /// 1-based column of `span.start`
    pub column: usize,

    /// Nesting depth; top-level nodes are 0
    pub depth: usize,
}

/// Raw SQL between markers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralNode {
    pub meta: NodeMeta,
}

impl LiteralNode {
    pub fn text(&self) -> &str {
        &self.meta.marker
    }
}

/// `/*expr*/dummy` or, with `array`, `/*expr*/(a, b)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindVariableNode {
    pub meta: NodeMeta,
    pub expression: Expression,

    /// Dummy literal that keeps the raw template runnable
    pub dummy: String,

    /// IN-list marker expanding to one placeholder per element
    pub array: bool,
}

/// Else-if or else arm of a conditional
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub meta: NodeMeta,

    /// `None` for the final else arm
    pub condition: Option<Expression>,
    pub children: Vec<Node>,
}

/// `/*%if expr*/ ... /*%end*/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalNode {
    pub meta: NodeMeta,
    pub condition: Expression,
    pub children: Vec<Node>,

    /// `/*%elseif*/` arms in source order
    pub else_ifs: Vec<Branch>,

    /// `/*%else*/` arm
    pub otherwise: Option<Branch>,
}

/// `/*%for item[, idx] : source*/ ... /*%end*/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopNode {
    pub meta: NodeMeta,
    pub item: String,

    /// Explicit index variable; defaults to `<item>_index`
    pub index: Option<String>,
    pub source: Expression,
    pub children: Vec<Node>,
}

impl LoopNode {
    /// Name the zero-based iteration index is bound to
    pub fn index_name(&self) -> String {
        self.index
            .clone()
            .unwrap_or_else(|| format!("{}_index", self.item))
    }

    /// Name of the "more elements follow" flag
    pub fn has_next_name(&self) -> String {
        format!("{}_has_next", self.item)
    }
}

/// `/*#expr*/dummy` literal substitution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaceNode {
    pub meta: NodeMeta,
    pub expression: Expression,
    pub dummy: Option<String>,
}

/// `/*@out name:TYPE*/` or `/*@inout expr:TYPE*/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputNode {
    pub meta: NodeMeta,
    pub direction: ParameterDirection,
    pub expression: Expression,
    pub sql_type: Option<SqlType>,
    pub dummy: Option<String>,
}

/// `/*?expr*/?` annotation on an existing positional placeholder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterMarkerNode {
    pub meta: NodeMeta,
    pub expression: Expression,
}

/// `/*@stream expr*/` out-of-band input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamNode {
    pub meta: NodeMeta,
    pub expression: Expression,
}

/// Closed set of node kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Literal(LiteralNode),
    Bind(BindVariableNode),
    Conditional(ConditionalNode),
    Loop(LoopNode),
    Replace(ReplaceNode),
    Output(OutputNode),
    ParameterMarker(ParameterMarkerNode),
    Stream(StreamNode),
}

impl Node {
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Literal(n) => &n.meta,
            Node::Bind(n) => &n.meta,
            Node::Conditional(n) => &n.meta,
            Node::Loop(n) => &n.meta,
            Node::Replace(n) => &n.meta,
            Node::Output(n) => &n.meta,
            Node::ParameterMarker(n) => &n.meta,
            Node::Stream(n) => &n.meta,
        }
    }

    /// Ordered body nodes (if/for bodies; empty for leaves)
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Conditional(n) => &n.children,
            Node::Loop(n) => &n.children,
            _ => &[],
        }
    }

    /// Short kind name used in node paths and logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Literal(_) => "literal",
            Node::Bind(n) if n.array => "array-bind",
            Node::Bind(_) => "bind",
            Node::Conditional(_) => "if",
            Node::Loop(_) => "for",
            Node::Replace(_) => "replace",
            Node::Output(_) => "output",
            Node::ParameterMarker(_) => "parameter-marker",
            Node::Stream(_) => "stream",
        }
    }

    /// Label for error node paths, e.g. `if(age > 5)@3`
    pub fn label(&self) -> String {
        let detail = match self {
            Node::Literal(_) => None,
            Node::Bind(n) => Some(n.expression.source.as_str()),
            Node::Conditional(n) => Some(n.condition.source.as_str()),
            Node::Loop(n) => Some(n.source.source.as_str()),
            Node::Replace(n) => Some(n.expression.source.as_str()),
            Node::Output(n) => Some(n.expression.source.as_str()),
            Node::ParameterMarker(n) => Some(n.expression.source.as_str()),
            Node::Stream(n) => Some(n.expression.source.as_str()),
        };
        match detail {
            Some(detail) => format!("{}({})@{}", self.kind_name(), detail, self.meta().line),
            None => format!("{}@{}", self.kind_name(), self.meta().line),
        }
    }
}

/// A variable the template reads from its evaluation context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParameterDefinition {
    /// Root variable name
    pub name: String,

    /// Line of first reference
    pub line: usize,
}

/// Template identity: SHA-256 of the text, plus an optional display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TemplateId {
    /// Lowercase hex digest
    pub digest: String,
    pub name: Option<String>,
}

impl TemplateId {
    pub fn for_text(text: &str, name: Option<String>) -> Self {
        use sha2::{Digest, Sha256};

        Self {
            digest: hex::encode(Sha256::digest(text.as_bytes())),
            name,
        }
    }

    /// Name if present, else the first 12 hex digits
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("template#{}", &self.digest[..12]),
        }
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A parsed template: root node sequence plus harvested parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: TemplateId,
    pub nodes: Vec<Node>,
    pub parameters: Vec<ParameterDefinition>,

    #[serde(skip)]
    pub source: String,
}

impl Template {
    /// Harvested parameter names in first-reference order
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Depth-first, pre-order walk over every node (branches included)
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        fn walk_nodes<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a Node)) {
            for node in nodes {
                visit(node);
                walk_nodes(node.children(), visit);
                if let Node::Conditional(conditional) = node {
                    for branch in conditional.else_ifs.iter().chain(conditional.otherwise.iter()) {
                        walk_nodes(&branch.children, visit);
                    }
                }
            }
        }
        walk_nodes(&self.nodes, visit);
    }

    /// True when the template holds no directives at all
    pub fn is_static(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Literal(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_overlap() {
        assert!(Span::new(0, 5).overlaps(&Span::new(4, 6)));
        assert!(!Span::new(0, 5).overlaps(&Span::new(5, 6)));
        assert_eq!(Span::new(3, 8).len(), 5);
    }

    #[test]
    fn template_id_is_stable() {
        let a = TemplateId::for_text("select 1", None);
        let b = TemplateId::for_text("select 1", Some("one.sql".to_string()));
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.len(), 64);
        assert!(a.display_name().starts_with("template#"));
        assert_eq!(b.to_string(), "one.sql");
    }
}
