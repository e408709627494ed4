//! Two-way SQL template parsing
//!
//! This crate handles:
//! - Recognizing markers hidden in SQL comments (one factory per family)
//! - Nesting block markers into an immutable node tree
//! - Harvesting the variables a template reads, without evaluating it
//!
//! A two-way template is plain, runnable SQL: every marker carries a dummy
//! literal that stands in for the bound value when the text is run as-is.

pub mod expr;
pub mod node;
pub mod error;
pub mod factory;
pub mod builder;
pub mod params;
pub mod parser;

pub use expr::{BinaryOp, Expr, ExprError, Expression, Function, Path, PathSegment};
pub use node::{
    BindVariableNode, Branch, ConditionalNode, LiteralNode, LoopNode, Node, NodeMeta, OutputNode,
    ParameterDefinition, ParameterMarkerNode, ReplaceNode, Span, StreamNode, Template, TemplateId,
};
pub use error::{LineIndex, ParseError, ParseErrorKind};
pub use factory::{default_factories, Marker, MarkerKind, NodeFactory};
pub use params::{extract_parameters, ParameterExtractor};
pub use parser::TemplateParser;
