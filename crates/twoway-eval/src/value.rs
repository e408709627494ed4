//! Expression semantics
//!
//! Values are JSON values. Lookups borrow from the context where possible;
//! only computed results are owned.

use crate::context::{lookup, EvaluationContext};
use crate::error::{type_name, EvaluationErrorKind};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use twoway_template::{BinaryOp, Expr, Function, Path};

static NULL: Value = Value::Null;

type Outcome<'c> = Result<Cow<'c, Value>, EvaluationErrorKind>;

/// Evaluate an expression against a context
pub fn evaluate<'c>(expr: &Expr, context: &'c dyn EvaluationContext) -> Outcome<'c> {
    match expr {
        Expr::Literal { value } => Ok(Cow::Owned(value.clone())),
        Expr::Path(path) => resolve(path, context),
        Expr::Not { operand } => {
            let value = evaluate(operand, context)?;
            Ok(Cow::Owned(Value::Bool(!truthy(&value))))
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, context),
        Expr::Call { function, args } => call(*function, args, context),
    }
}

/// Resolve a path. A missing root is an error; a missing field below an
/// existing root reads as null.
pub fn resolve<'c>(path: &Path, context: &'c dyn EvaluationContext) -> Outcome<'c> {
    let root = context
        .get(&path.root)
        .ok_or_else(|| EvaluationErrorKind::UnresolvedVariable(path.root.clone()))?;
    Ok(Cow::Borrowed(lookup(root, &path.segments).unwrap_or(&NULL)))
}

/// Truthiness used by conditions and logical operators
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality that treats `1` and `1.0` as equal
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            // integers compare exactly; f64 only when a float is involved
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
                x == y
            } else if a.is_f64() || b.is_f64() {
                a.as_f64() == b.as_f64()
            } else {
                false
            }
        }
        _ => left == right,
    }
}

/// Raw text for literal substitution
pub fn render_raw(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(render_raw).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn binary<'c>(op: BinaryOp, left: &Expr, right: &Expr, context: &'c dyn EvaluationContext) -> Outcome<'c> {
    // short-circuit before touching the right operand
    match op {
        BinaryOp::Or => {
            let result = truthy(evaluate(left, context)?.as_ref())
                || truthy(evaluate(right, context)?.as_ref());
            return Ok(Cow::Owned(Value::Bool(result)));
        }
        BinaryOp::And => {
            let result = truthy(evaluate(left, context)?.as_ref())
                && truthy(evaluate(right, context)?.as_ref());
            return Ok(Cow::Owned(Value::Bool(result)));
        }
        _ => {}
    }

    let lhs = evaluate(left, context)?;
    let rhs = evaluate(right, context)?;

    let result = match op {
        BinaryOp::Eq => loose_eq(&lhs, &rhs),
        BinaryOp::Ne => !loose_eq(&lhs, &rhs),
        BinaryOp::In => contains(&rhs, &lhs).ok_or_else(|| mismatch(op, &lhs, &rhs))?,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| mismatch(op, &lhs, &rhs))?;
            match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("logical operators return early"),
    };

    Ok(Cow::Owned(Value::Bool(result)))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvaluationErrorKind {
    EvaluationErrorKind::TypeMismatch {
        op: op.symbol().to_string(),
        left: type_name(left),
        right: type_name(right),
    }
}

/// Ordering of two numbers or two strings; anything else is incomparable
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Membership: element of an array, substring of a string, key of an object.
/// `None` when the container cannot hold the needle.
fn contains(container: &Value, needle: &Value) -> Option<bool> {
    match container {
        Value::Null => Some(false),
        Value::Array(items) => Some(items.iter().any(|item| loose_eq(item, needle))),
        Value::String(haystack) => needle.as_str().map(|n| haystack.contains(n)),
        Value::Object(map) => needle.as_str().map(|key| map.contains_key(key)),
        _ => None,
    }
}

fn call<'c>(function: Function, args: &[Expr], context: &'c dyn EvaluationContext) -> Outcome<'c> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        let value = match (arg, function.tolerates_unresolved()) {
            // emptiness checks treat an undefined variable as null
            (Expr::Path(path), true) if context.get(&path.root).is_none() => Cow::Borrowed(&NULL),
            _ => evaluate(arg, context)?,
        };
        values.push(value);
    }

    let invalid = |value: &Value| EvaluationErrorKind::InvalidArgument {
        function: function.name().to_string(),
        found: type_name(value),
    };

    let result = match function {
        Function::IsEmpty => Value::Bool(is_empty(&values[0], false)),
        Function::IsNotEmpty => Value::Bool(!is_empty(&values[0], false)),
        Function::IsBlank => Value::Bool(is_empty(&values[0], true)),
        Function::IsNotBlank => Value::Bool(!is_empty(&values[0], true)),
        Function::Contains => {
            Value::Bool(contains(&values[0], &values[1]).ok_or_else(|| invalid(values[0].as_ref()))?)
        }
        Function::Size => {
            let size = match values[0].as_ref() {
                Value::Null => 0,
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(invalid(other)),
            };
            Value::from(size)
        }
    };

    Ok(Cow::Owned(result))
}

fn is_empty(value: &Value, blank: bool) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if blank => s.trim().is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
