//! Evaluation context
//!
//! The read interface the evaluator consults for variable values. Concrete
//! storage belongs to the caller; this module ships implementations for the
//! usual JSON-shaped containers and a builder-made [`TemplateContext`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use twoway_template::{Path, PathSegment};

/// Read-only variable source
pub trait EvaluationContext {
    /// Look up a top-level variable
    fn get(&self, name: &str) -> Option<&Value>;

    /// Look up a dotted/indexed path
    fn get_path(&self, path: &Path) -> Option<&Value> {
        lookup(self.get(&path.root)?, &path.segments)
    }

    /// Look up a path that must hold a sequence
    fn get_iterable(&self, path: &Path) -> Option<&[Value]> {
        self.get_path(path)?.as_array().map(Vec::as_slice)
    }
}

/// Follow `segments` down from `value`
pub fn lookup<'v>(value: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        PathSegment::Field(name) => current.as_object()?.get(name),
        PathSegment::Index(index) => current.as_array()?.get(*index),
    })
}

impl EvaluationContext for Map<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        Map::get(self, name)
    }
}

impl EvaluationContext for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        HashMap::get(self, name)
    }
}

/// A JSON object is a context; any other value has no variables
impl EvaluationContext for Value {
    fn get(&self, name: &str) -> Option<&Value> {
        self.as_object()?.get(name)
    }
}

/// Child scope holding loop-bound locals; lookups fall through to the parent.
///
/// Created per loop iteration and dropped afterwards, so nothing leaks
/// across iterations or into the enclosing scope.
pub struct Scope<'p> {
    parent: &'p dyn EvaluationContext,
    locals: HashMap<String, Value>,
}

impl<'p> Scope<'p> {
    pub fn new(parent: &'p dyn EvaluationContext) -> Self {
        Self {
            parent,
            locals: HashMap::new(),
        }
    }

    /// Bind a local, shadowing any parent variable of the same name
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.locals.insert(name.into(), value);
        self
    }
}

impl EvaluationContext for Scope<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.parent.get(name))
    }
}

/// Variables handed to a template evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateContext {
    vars: HashMap<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn add_var(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Build from a JSON object; other JSON values are rejected
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                vars: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Parse a JSON document holding one object of variables
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EvaluationContext for TemplateContext {
    fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Builder for TemplateContext
pub struct TemplateContextBuilder {
    context: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn new() -> Self {
        Self {
            context: TemplateContext::new(),
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.add_var(key, value.into());
        self
    }

    /// Merge every key of a JSON object; non-objects are ignored
    pub fn vars(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            for (key, value) in map {
                self.context.add_var(key, value);
            }
        }
        self
    }

    pub fn build(self) -> TemplateContext {
        self.context
    }
}

impl Default for TemplateContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
