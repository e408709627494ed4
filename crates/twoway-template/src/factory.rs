//! Node factories
//!
//! One recognizer per marker family. Each scans the raw template text for its
//! own decorated syntax and reports offset-tagged [`Marker`]s; the parser
//! merges the results of all factories by offset.
//!
//! Markers are matched on their exact comment syntax, not on a full SQL
//! tokenization, so marker-like text inside a SQL string literal is picked up
//! as well.

use crate::error::{ParseError, ParseErrorKind};
use crate::expr::Expression;
use crate::node::Span;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use twoway_core::{ParameterDirection, SqlType};

/// Scalar dummy literal: quoted string, number, true/false/null
const DUMMY: &str = r"'(?:[^']|'')*'|-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b|(?i:true|false|null)\b";

/// What a marker means, before tree building
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerKind {
    Bind {
        expression: Expression,
        dummy: String,
        array: bool,
    },
    If {
        condition: Expression,
    },
    ElseIf {
        condition: Expression,
    },
    Else,
    For {
        item: String,
        index: Option<String>,
        source: Expression,
    },
    End,
    Replace {
        expression: Expression,
        dummy: Option<String>,
    },
    Output {
        direction: ParameterDirection,
        expression: Expression,
        sql_type: Option<SqlType>,
        dummy: Option<String>,
    },
    ParameterMarker {
        expression: Expression,
    },
    Stream {
        expression: Expression,
    },
}

/// A recognized marker occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub span: Span,

    /// Matched text including any dummy literal
    pub text: String,
    pub kind: MarkerKind,

    /// Name of the factory that produced it
    pub factory: &'static str,
}

/// A recognizer for one marker family
pub trait NodeFactory: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Candidate pattern; every match is handed to [`NodeFactory::recognize`]
    fn pattern(&self) -> &'static Regex;

    /// Turn a candidate match into a marker.
    ///
    /// `Ok(None)` means "not a marker after all"; errors are reserved for text
    /// that is unambiguously a marker but malformed.
    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError>;

    /// Find every marker of this family in `text`
    fn scan(&self, text: &str) -> Result<Vec<Marker>, ParseError> {
        let mut markers = Vec::new();

        for caps in self.pattern().captures_iter(text) {
            if let Some((span, kind)) = self.recognize(text, &caps)? {
                tracing::trace!(factory = self.name(), start = span.start, end = span.end, "marker recognized");
                markers.push(Marker {
                    span,
                    text: text[span.start..span.end].to_string(),
                    kind,
                    factory: self.name(),
                });
            }
        }

        Ok(markers)
    }
}

/// The full factory list, in tie-break priority order
pub fn default_factories() -> Vec<Box<dyn NodeFactory>> {
    vec![
        Box::new(BlockFactory),
        Box::new(OutputFactory),
        Box::new(StreamFactory),
        Box::new(ReplaceFactory),
        Box::new(ParameterMarkerFactory),
        Box::new(ArrayBindFactory),
        Box::new(BindVariableFactory),
    ]
}

fn compile(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("marker pattern is a valid regex"))
}

fn whole_match(caps: &Captures<'_>) -> Span {
    caps.get(0)
        .map(|m| Span::new(m.start(), m.end()))
        .unwrap_or_default()
}

fn parse_expression(source: &str, marker: &str, span: Span) -> Result<Expression, ParseError> {
    Expression::parse(source)
        .map_err(|e| ParseError::new(ParseErrorKind::InvalidExpression(e.to_string()), marker, span))
}

/// Expression of a bind candidate; `None` for an ordinary SQL comment
fn bind_expression(source: &str) -> Option<Expression> {
    match Expression::parse(source) {
        Ok(expression) => Some(expression),
        Err(e) => {
            tracing::trace!(comment = source, error = %e, "comment is not a bind marker");
            None
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// `/*expr*/dummy`
#[derive(Debug, Clone, Copy, Default)]
pub struct BindVariableFactory;

impl NodeFactory for BindVariableFactory {
    fn name(&self) -> &'static str {
        "bind"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, &format!(r"/\*([A-Za-z_!(][^*]*)\*/({})", DUMMY))
    }

    fn recognize(&self, _text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let Some(expression) = bind_expression(&caps[1]) else {
            return Ok(None);
        };

        Ok(Some((
            whole_match(caps),
            MarkerKind::Bind {
                expression,
                dummy: caps[2].to_string(),
                array: false,
            },
        )))
    }
}

/// `/*expr*/(dummy, dummy, ...)`
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayBindFactory;

impl ArrayBindFactory {
    /// End offset (exclusive) of the parenthesized list opening at `open`
    fn balanced_end(text: &str, open: usize) -> Option<usize> {
        let bytes = text.as_bytes();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut pos = open;

        while pos < bytes.len() {
            match bytes[pos] {
                b'\'' if in_string => {
                    if bytes.get(pos + 1) == Some(&b'\'') {
                        pos += 1;
                    } else {
                        in_string = false;
                    }
                }
                b'\'' => in_string = true,
                b'(' if !in_string => depth += 1,
                b')' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos + 1);
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        None
    }
}

impl NodeFactory for ArrayBindFactory {
    fn name(&self) -> &'static str {
        "array-bind"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, r"/\*([A-Za-z_!(][^*]*)\*/\(")
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let Some(expression) = bind_expression(&caps[1]) else {
            return Ok(None);
        };

        let head = whole_match(caps);
        let open = head.end - 1;

        let Some(end) = Self::balanced_end(text, open) else {
            return Err(ParseError::new(
                ParseErrorKind::MalformedMarker("IN-list dummy is missing its closing ')'".to_string()),
                &text[head.start..head.end],
                head,
            ));
        };

        Ok(Some((
            Span::new(head.start, end),
            MarkerKind::Bind {
                expression,
                dummy: text[open..end].to_string(),
                array: true,
            },
        )))
    }
}

/// `/*%if*/`, `/*%elseif*/`, `/*%else*/`, `/*%for*/`, `/*%end*/`
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFactory;

impl BlockFactory {
    fn parse_for(rest: &str, marker: &str, span: Span) -> Result<MarkerKind, ParseError> {
        let malformed = |message: &str| {
            ParseError::new(ParseErrorKind::MalformedMarker(message.to_string()), marker, span)
        };

        let (vars, source) = match rest.split_once(':') {
            Some(split) => split,
            None => {
                let lower = rest.to_ascii_lowercase();
                let at = lower
                    .find(" in ")
                    .ok_or_else(|| malformed("expected 'for item : source'"))?;
                (&rest[..at], &rest[at + 4..])
            }
        };

        let names: Vec<&str> = vars.split(',').map(str::trim).collect();
        if names.is_empty() || names.len() > 2 || !names.iter().all(|n| is_identifier(n)) {
            return Err(malformed("loop variables must be 'item' or 'item, index'"));
        }

        Ok(MarkerKind::For {
            item: names[0].to_string(),
            index: names.get(1).map(|n| n.to_string()),
            source: parse_expression(source, marker, span)?,
        })
    }
}

impl NodeFactory for BlockFactory {
    fn name(&self) -> &'static str {
        "block"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, r"/\*%\s*([A-Za-z]+)\b([^*]*)\*/")
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let span = whole_match(caps);
        let marker = &text[span.start..span.end];
        let keyword = caps[1].to_ascii_lowercase();
        let rest = caps[2].trim();

        let malformed = |message: String| {
            ParseError::new(ParseErrorKind::MalformedMarker(message), marker, span)
        };

        let kind = match keyword.as_str() {
            "if" => MarkerKind::If {
                condition: parse_expression(rest, marker, span)?,
            },
            "elseif" | "elif" => MarkerKind::ElseIf {
                condition: parse_expression(rest, marker, span)?,
            },
            "else" if rest.is_empty() => MarkerKind::Else,
            "else" => {
                // `/*%else if cond*/`
                let condition = rest
                    .split_once(char::is_whitespace)
                    .filter(|(word, _)| word.eq_ignore_ascii_case("if"))
                    .map(|(_, condition)| condition)
                    .ok_or_else(|| malformed(format!("unexpected text after else: '{}'", rest)))?;
                MarkerKind::ElseIf {
                    condition: parse_expression(condition, marker, span)?,
                }
            }
            "for" => Self::parse_for(rest, marker, span)?,
            "end" if rest.is_empty() => MarkerKind::End,
            "end" => return Err(malformed(format!("unexpected text after end: '{}'", rest))),
            other => return Err(malformed(format!("unknown directive '%{}'", other))),
        };

        Ok(Some((span, kind)))
    }
}

/// `/*#expr*/dummy` literal substitution; the dummy may be `*`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceFactory;

impl NodeFactory for ReplaceFactory {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, &format!(r"/\*#([^*]+)\*/({}|[A-Za-z_][\w.]*|\*)?", DUMMY))
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let span = whole_match(caps);
        let marker = &text[span.start..span.end];

        Ok(Some((
            span,
            MarkerKind::Replace {
                expression: parse_expression(&caps[1], marker, span)?,
                dummy: caps.get(2).map(|m| m.as_str().to_string()),
            },
        )))
    }
}

/// `/*@out name:TYPE*/dummy` and `/*@inout expr:TYPE*/dummy`
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFactory;

impl NodeFactory for OutputFactory {
    fn name(&self) -> &'static str {
        "output"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, &format!(r"/\*@\s*(?i:(inout|out))\s+([^*]+)\*/({})?", DUMMY))
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let span = whole_match(caps);
        let marker = &text[span.start..span.end];

        let direction = if caps[1].eq_ignore_ascii_case("inout") {
            ParameterDirection::InOut
        } else {
            ParameterDirection::Out
        };

        let (name, sql_type) = match caps[2].split_once(':') {
            Some((name, declared)) if !declared.trim().is_empty() => (name, Some(SqlType::parse(declared))),
            Some((name, _)) => (name, None),
            None => (&caps[2], None),
        };

        Ok(Some((
            span,
            MarkerKind::Output {
                direction,
                expression: parse_expression(name, marker, span)?,
                sql_type,
                dummy: caps.get(3).map(|m| m.as_str().to_string()),
            },
        )))
    }
}

/// `/*?expr*/?` annotation on an existing placeholder
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterMarkerFactory;

impl NodeFactory for ParameterMarkerFactory {
    fn name(&self) -> &'static str {
        "parameter-marker"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, r"/\*\?([^*]+)\*/\?")
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let span = whole_match(caps);
        let marker = &text[span.start..span.end];

        Ok(Some((
            span,
            MarkerKind::ParameterMarker {
                expression: parse_expression(&caps[1], marker, span)?,
            },
        )))
    }
}

/// `/*@stream expr*/`
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamFactory;

impl NodeFactory for StreamFactory {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn pattern(&self) -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        compile(&PATTERN, r"/\*@\s*(?i:stream)\s+([^*]+)\*/")
    }

    fn recognize(&self, text: &str, caps: &Captures<'_>) -> Result<Option<(Span, MarkerKind)>, ParseError> {
        let span = whole_match(caps);
        let marker = &text[span.start..span.end];

        Ok(Some((
            span,
            MarkerKind::Stream {
                expression: parse_expression(&caps[1], marker, span)?,
            },
        )))
    }
}
