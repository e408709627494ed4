//! Evaluation errors
//!
//! Fatal to one evaluation call only; the parsed tree stays reusable.

use twoway_core::{Diagnostic, DiagnosticCode, Location, Severity};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationErrorKind {
    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),

    #[error("loop source '{expression}' is not iterable (found {found})")]
    NotIterable { expression: String, found: String },

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("{function}() cannot take {found}")]
    InvalidArgument { function: String, found: String },
}

/// Evaluation failure with the node path leading to it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} in {template} at {}", .node_path.join(" > "))]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,

    /// Labels of the enclosing nodes, outermost first
    pub node_path: Vec<String>,

    /// Template identity (name or digest prefix)
    pub template: String,

    /// 1-based line of the failing node
    pub line: usize,
}

impl EvaluationError {
    /// Missing variable name, for unresolved-variable failures
    pub fn variable(&self) -> Option<&str> {
        match &self.kind {
            EvaluationErrorKind::UnresolvedVariable(name) => Some(name),
            _ => None,
        }
    }

    /// Convert to a twoway diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self.kind {
            EvaluationErrorKind::UnresolvedVariable(_) => DiagnosticCode::TemplateUnresolvedVariable,
            _ => DiagnosticCode::TemplateEvaluationError,
        };

        Diagnostic::new(code, Severity::Error, self.kind.to_string())
            .with_location(Location::with_line(self.template.clone(), self.line))
            .with_node_path(self.node_path.clone())
    }
}

/// JSON type name used in error messages
pub(crate) fn type_name(value: &serde_json::Value) -> String {
    let name = match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    name.to_string()
}
