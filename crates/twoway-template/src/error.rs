//! Structural parse errors
//!
//! Detected once, at parse time. A parse that fails returns no tree.

use crate::node::Span;
use twoway_core::{Diagnostic, DiagnosticCode, Location, Severity};

/// What is structurally wrong with a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("block is never closed with /*%end*/")]
    UnterminatedBlock,

    #[error("/*%end*/ without an open block")]
    UnmatchedEnd,

    #[error("else/elseif outside of an if block")]
    MisplacedBranch,

    #[error("elseif after else")]
    BranchAfterElse,

    #[error("duplicate else")]
    DuplicateElse,

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("malformed marker: {0}")]
    MalformedMarker(String),
}

/// Structural parse error with offending marker text and source position
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {template}:{line}:{column}: `{marker}`")]
pub struct ParseError {
    pub kind: ParseErrorKind,

    /// Offending marker text
    pub marker: String,
    pub span: Span,

    /// 1-based line
    pub line: usize,

    /// 1-based column
    pub column: usize,

    /// Template identity (name or digest prefix)
    pub template: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, marker: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            marker: marker.into(),
            span,
            line: 0,
            column: 0,
            template: String::from("<template>"),
        }
    }

    /// Fill in line and column from the template text
    pub fn locate(mut self, index: &LineIndex) -> Self {
        let (line, column) = index.position(self.span.start);
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Convert to a twoway diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self.kind {
            ParseErrorKind::UnterminatedBlock => DiagnosticCode::TemplateUnterminatedBlock,
            ParseErrorKind::InvalidExpression(_) => DiagnosticCode::TemplateExpressionError,
            _ => DiagnosticCode::TemplateParseError,
        };

        Diagnostic::new(code, Severity::Error, self.kind.to_string())
            .with_location(Location::with_position(self.template.clone(), self.line, self.column))
            .with_marker(self.marker.clone())
    }
}

/// Maps byte offsets to 1-based line/column pairs
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    /// 1-based (line, column) of a byte offset; column counts bytes
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}
