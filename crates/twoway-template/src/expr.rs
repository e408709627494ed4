//! Marker expression language
//!
//! Expressions appear inside conditional, loop and bind markers:
//! `age > 5 && isNotEmpty(customer.name)`, `status in allowed`,
//! `items[0].id`. They are parsed once, at template parse time.

use serde::Serialize;

/// Error raised while lexing or parsing an expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ExprError {
    /// What went wrong
    pub message: String,

    /// Byte offset inside the expression text
    pub position: usize,
}

impl ExprError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// One step of a dotted/indexed path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathSegment {
    /// `.name` or `['name']`
    Field(String),

    /// `[3]`
    Index(usize),
}

/// Variable reference such as `customer.address.city` or `items[0]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Path {
    /// First identifier; the name looked up in the evaluation context
    pub root: String,

    /// Remaining segments, outermost first
    pub segments: Vec<PathSegment>,
}

impl Path {
    /// A bare variable with no segments
    pub fn variable(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            segments: Vec::new(),
        }
    }

    /// Parse a standalone path such as `a.b[2]`
    pub fn parse(text: &str) -> Result<Path, ExprError> {
        match Expression::parse(text)?.ast {
            Expr::Path(path) => Ok(path),
            _ => Err(ExprError::new(format!("'{}' is not a variable path", text.trim()), 0)),
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Binary operators, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl BinaryOp {
    /// Source spelling
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
        }
    }
}

/// Built-in helper functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Function {
    /// null, empty string, empty array or empty object
    IsEmpty,
    IsNotEmpty,
    /// like `isEmpty` but whitespace-only strings count as empty
    IsBlank,
    IsNotBlank,
    /// `contains(collection, value)`; substring test for strings
    Contains,
    /// length of a string, array or object
    Size,
}

impl Function {
    /// Resolve a function by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Function> {
        match name.to_ascii_lowercase().as_str() {
            "isempty" => Some(Self::IsEmpty),
            "isnotempty" => Some(Self::IsNotEmpty),
            "isblank" => Some(Self::IsBlank),
            "isnotblank" => Some(Self::IsNotBlank),
            "contains" => Some(Self::Contains),
            "size" | "length" => Some(Self::Size),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::IsBlank => "isBlank",
            Self::IsNotBlank => "isNotBlank",
            Self::Contains => "contains",
            Self::Size => "size",
        }
    }

    /// Number of arguments the function takes
    pub fn arity(&self) -> usize {
        match self {
            Self::Contains => 2,
            _ => 1,
        }
    }

    /// Predicates that treat an unresolved variable as null instead of failing
    pub fn tolerates_unresolved(&self) -> bool {
        matches!(self, Self::IsEmpty | Self::IsNotEmpty | Self::IsBlank | Self::IsNotBlank)
    }
}

/// Expression AST
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Expr {
    Literal { value: serde_json::Value },
    Path(Path),
    Not { operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    /// Trimmed source text as written in the marker
    pub source: String,

    /// Parsed form
    pub ast: Expr,
}

impl Expression {
    /// Parse expression text
    pub fn parse(text: &str) -> Result<Expression, ExprError> {
        let source = text.trim();
        if source.is_empty() {
            return Err(ExprError::new("empty expression", 0));
        }

        let tokens = lex(source)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let ast = parser.parse_or()?;

        if let Some((token, position)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::new(format!("unexpected {}", token.describe()), *position));
        }

        Ok(Expression {
            source: source.to_string(),
            ast,
        })
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(serde_json::Number),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Minus,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string '{}'", s),
            other => format!("{:?}", other),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'(' => {
                tokens.push((Token::LParen, start));
                pos += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                pos += 1;
            }
            b'[' => {
                tokens.push((Token::LBracket, start));
                pos += 1;
            }
            b']' => {
                tokens.push((Token::RBracket, start));
                pos += 1;
            }
            b',' => {
                tokens.push((Token::Comma, start));
                pos += 1;
            }
            b'.' => {
                tokens.push((Token::Dot, start));
                pos += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, start));
                pos += 1;
            }
            b'&' if bytes.get(pos + 1) == Some(&b'&') => {
                tokens.push((Token::AndAnd, start));
                pos += 2;
            }
            b'|' if bytes.get(pos + 1) == Some(&b'|') => {
                tokens.push((Token::OrOr, start));
                pos += 2;
            }
            b'=' => {
                // `=` and `==` are both equality
                pos += if bytes.get(pos + 1) == Some(&b'=') { 2 } else { 1 };
                tokens.push((Token::EqEq, start));
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ne, start));
                    pos += 2;
                } else {
                    tokens.push((Token::Bang, start));
                    pos += 1;
                }
            }
            b'<' => match bytes.get(pos + 1) {
                Some(b'=') => {
                    tokens.push((Token::Le, start));
                    pos += 2;
                }
                Some(b'>') => {
                    tokens.push((Token::Ne, start));
                    pos += 2;
                }
                _ => {
                    tokens.push((Token::Lt, start));
                    pos += 1;
                }
            },
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ge, start));
                    pos += 2;
                } else {
                    tokens.push((Token::Gt, start));
                    pos += 1;
                }
            }
            b'\'' | b'"' => {
                let quote = c;
                let mut value = String::new();
                pos += 1;
                loop {
                    match bytes.get(pos) {
                        None => return Err(ExprError::new("unterminated string literal", start)),
                        Some(&b) if b == quote => {
                            // doubled quote is an escaped quote, SQL style
                            if bytes.get(pos + 1) == Some(&quote) {
                                value.push(quote as char);
                                pos += 2;
                            } else {
                                pos += 1;
                                break;
                            }
                        }
                        Some(_) => {
                            let ch = input[pos..].chars().next().unwrap_or_default();
                            value.push(ch);
                            pos += ch.len_utf8();
                        }
                    }
                }
                tokens.push((Token::Str(value), start));
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let mut is_float = false;
                if pos + 1 < bytes.len() && bytes[pos] == b'.' && bytes[pos + 1].is_ascii_digit() {
                    is_float = true;
                    pos += 1;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut lookahead = pos + 1;
                    if lookahead < bytes.len() && (bytes[lookahead] == b'+' || bytes[lookahead] == b'-') {
                        lookahead += 1;
                    }
                    if lookahead < bytes.len() && bytes[lookahead].is_ascii_digit() {
                        is_float = true;
                        pos = lookahead;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text = &input[start..pos];
                tokens.push((Token::Number(parse_number(text, is_float, start)?), start));
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while pos < bytes.len() && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric()) {
                    pos += 1;
                }
                tokens.push((Token::Ident(input[start..pos].to_string()), start));
            }
            _ => {
                let ch = input[pos..].chars().next().unwrap_or_default();
                return Err(ExprError::new(format!("unexpected character '{}'", ch), start));
            }
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str, is_float: bool, position: usize) -> Result<serde_json::Number, ExprError> {
    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(n.into());
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .ok_or_else(|| ExprError::new(format!("invalid number '{}'", text), position))
}

struct ExprParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        let position = self.position();
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(ExprError::new(
                format!("expected {}, got {}", expected.describe(), t.describe()),
                position,
            )),
            None => Err(ExprError::new(format!("expected {}, got end of expression", expected.describe()), position)),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) || self.peek_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::AndAnd)) || self.peek_keyword("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Bang)) || self.peek_keyword("not") {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Not { operand: Box::new(operand) });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_operand()?;

        let op = match self.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case("in") => BinaryOp::In,
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_operand()?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_operand(&mut self) -> Result<Expr, ExprError> {
        let position = self.position();
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Expr::Literal { value: serde_json::Value::Number(n) }),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Number(n)) => Ok(Expr::Literal { value: negate(&n, position)? }),
                _ => Err(ExprError::new("'-' must be followed by a number", position)),
            },
            Some(Token::Str(s)) => Ok(Expr::Literal { value: serde_json::Value::String(s) }),
            Some(Token::Ident(name)) => self.parse_identifier(name, position),
            Some(t) => Err(ExprError::new(format!("unexpected {}", t.describe()), position)),
            None => Err(ExprError::new("unexpected end of expression", position)),
        }
    }

    fn parse_identifier(&mut self, name: String, position: usize) -> Result<Expr, ExprError> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Ok(Expr::Literal { value: serde_json::Value::Bool(true) }),
            "false" => return Ok(Expr::Literal { value: serde_json::Value::Bool(false) }),
            "null" => return Ok(Expr::Literal { value: serde_json::Value::Null }),
            _ => {}
        }

        if matches!(self.peek(), Some(Token::LParen)) {
            let function = Function::from_name(&name)
                .ok_or_else(|| ExprError::new(format!("unknown function '{}'", name), position))?;
            self.advance();

            let mut args = Vec::new();
            if !matches!(self.peek(), Some(Token::RParen)) {
                loop {
                    args.push(self.parse_or()?);
                    if matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RParen)?;

            if args.len() != function.arity() {
                return Err(ExprError::new(
                    format!("{}() takes {} argument(s), got {}", function.name(), function.arity(), args.len()),
                    position,
                ));
            }
            return Ok(Expr::Call { function, args });
        }

        let mut path = Path::variable(name);
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Ident(field)) => path.segments.push(PathSegment::Field(field)),
                        _ => return Err(ExprError::new("expected field name after '.'", position)),
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Number(n)) => {
                            let index = n
                                .as_u64()
                                .and_then(|i| usize::try_from(i).ok())
                                .ok_or_else(|| ExprError::new("index must be a non-negative integer", position))?;
                            path.segments.push(PathSegment::Index(index));
                        }
                        Some(Token::Str(key)) => path.segments.push(PathSegment::Field(key)),
                        _ => return Err(ExprError::new("expected index or quoted key", position)),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(Expr::Path(path))
    }
}

fn negate(n: &serde_json::Number, position: usize) -> Result<serde_json::Value, ExprError> {
    if let Some(i) = n.as_i64() {
        return Ok(serde_json::Value::from(-i));
    }
    n.as_f64()
        .and_then(|f| serde_json::Number::from_f64(-f))
        .map(serde_json::Value::Number)
        .ok_or_else(|| ExprError::new("invalid negative number", position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(expr: &Expr) -> &Path {
        match expr {
            Expr::Path(p) => p,
            other => panic!("expected path, got {:?}", other),
        }
    }

    #[test]
    fn parses_comparison() {
        let expr = Expression::parse("age > 5").unwrap();
        match &expr.ast {
            Expr::Binary { op, left, right } => {
                assert_eq!(*op, BinaryOp::Gt);
                assert_eq!(path(left).root, "age");
                assert_eq!(**right, Expr::Literal { value: json!(5) });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = Expression::parse("a || b && c").unwrap();
        match expr.ast {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keyword_operators() {
        let expr = Expression::parse("not a and b or c in list").unwrap();
        assert!(matches!(expr.ast, Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn paths_with_indexes() {
        let expr = Expression::parse("orders[2].lines['qty']").unwrap();
        let p = path(&expr.ast);
        assert_eq!(p.root, "orders");
        assert_eq!(
            p.segments,
            vec![
                PathSegment::Index(2),
                PathSegment::Field("lines".to_string()),
                PathSegment::Field("qty".to_string()),
            ]
        );
        assert_eq!(p.to_string(), "orders[2].lines.qty");
    }

    #[test]
    fn function_calls() {
        let expr = Expression::parse("isEmpty(customer.name)").unwrap();
        match expr.ast {
            Expr::Call { function, args } => {
                assert_eq!(function, Function::IsEmpty);
                assert_eq!(path(&args[0]).root, "customer");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn literals() {
        assert_eq!(Expression::parse("'it''s'").unwrap().ast, Expr::Literal { value: json!("it's") });
        assert_eq!(Expression::parse("-3").unwrap().ast, Expr::Literal { value: json!(-3) });
        assert_eq!(Expression::parse("2.5").unwrap().ast, Expr::Literal { value: json!(2.5) });
        assert_eq!(Expression::parse("NULL").unwrap().ast, Expr::Literal { value: json!(null) });
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("a >").is_err());
        assert!(Expression::parse("(a").is_err());
        assert!(Expression::parse("'open").is_err());
        assert!(Expression::parse("frobnicate(a)").is_err());
        assert!(Expression::parse("contains(a)").is_err());
        assert!(Expression::parse("a b").is_err());
        assert!(Expression::parse("a # b").is_err());
    }

    #[test]
    fn standalone_path() {
        assert_eq!(Path::parse("a.b").unwrap().to_string(), "a.b");
        assert!(Path::parse("a > 1").is_err());
    }
}
