//! Template evaluator
//!
//! Depth-first walk over the node tree. The output is an explicit
//! [`SqlBuffer`] threaded through the recursion; nothing is written to the
//! tree or to any shared state.

use crate::context::{EvaluationContext, Scope};
use crate::error::{type_name, EvaluationError, EvaluationErrorKind};
use crate::value::{self, render_raw, truthy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use twoway_core::{EvaluationConfig, ParameterDirection, PlaceholderStyle, SqlType};
use twoway_template::{ConditionalNode, Expression, LoopNode, Node, Template};

/// A positional parameter matching one placeholder in the emitted SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindParameter {
    /// Expression text the value came from (`ids[2]` for list elements)
    pub name: String,

    /// 0-based position among the placeholders
    pub ordinal: usize,
    pub direction: ParameterDirection,

    /// Declared or inferred type; `None` when inference gave up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<SqlType>,
    pub value: Value,
}

/// A value handed to the execution layer without a placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandParameter {
    pub name: String,
    pub value: Value,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedSql {
    pub sql: String,
    pub parameters: Vec<BindParameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub out_of_band: Vec<OutOfBandParameter>,
}

impl EvaluatedSql {
    /// Parameter values in placeholder order
    pub fn values(&self) -> Vec<&Value> {
        self.parameters.iter().map(|p| &p.value).collect()
    }
}

/// Output buffer: SQL text plus the parameters emitted so far
#[derive(Debug, Clone)]
pub struct SqlBuffer {
    sql: String,
    parameters: Vec<BindParameter>,
    out_of_band: Vec<OutOfBandParameter>,
    placeholder: PlaceholderStyle,

    /// Set when a block marker was crossed since the last append
    after_directive: bool,
}

impl SqlBuffer {
    pub fn new(placeholder: PlaceholderStyle) -> Self {
        Self {
            sql: String::new(),
            parameters: Vec::new(),
            out_of_band: Vec::new(),
            placeholder,
            after_directive: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Record that a block marker boundary was just crossed
    pub fn mark_directive(&mut self) {
        self.after_directive = true;
    }

    /// Append template text.
    ///
    /// With `collapse`, a directive that sat on its own line leaves no blank
    /// line: right after a block marker, when the buffer's current line holds
    /// only indentation and `text` opens with a whitespace-only line, that
    /// line and the pending indentation are both dropped.
    pub fn push_literal(&mut self, text: &str, collapse: bool) {
        let mut text = text;

        if collapse && self.after_directive && self.on_blank_line() {
            if let Some(newline) = text.find('\n') {
                if text[..newline].trim().is_empty() {
                    let kept = self.sql.trim_end_matches([' ', '\t']).len();
                    self.sql.truncate(kept);
                    text = &text[newline + 1..];
                }
            }
        }

        self.after_directive = false;
        self.sql.push_str(text);
    }

    /// Append substituted text verbatim
    pub fn push_raw(&mut self, text: &str) {
        self.after_directive = false;
        self.sql.push_str(text);
    }

    /// Emit one placeholder and its parameter
    pub fn push_parameter(
        &mut self,
        name: impl Into<String>,
        direction: ParameterDirection,
        sql_type: Option<SqlType>,
        value: Value,
    ) {
        let ordinal = self.parameters.len();
        self.after_directive = false;
        self.sql.push_str(&self.placeholder.render(ordinal));
        self.parameters.push(BindParameter {
            name: name.into(),
            ordinal,
            direction,
            sql_type,
            value,
        });
    }

    /// Emit a parenthesized placeholder list, one per element.
    ///
    /// A scalar is a one-element list; an empty array renders `(NULL)` so
    /// that `x IN (NULL)` stays valid SQL and matches nothing.
    pub fn push_list(&mut self, name: &str, value: Value) {
        let items = match value {
            Value::Array(items) => items,
            scalar => vec![scalar],
        };

        if items.is_empty() {
            self.push_raw("(NULL)");
            return;
        }

        self.push_raw("(");
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            let sql_type = SqlType::infer(&item);
            self.push_parameter(format!("{}[{}]", name, i), ParameterDirection::In, sql_type, item);
        }
        self.sql.push(')');
    }

    pub fn push_out_of_band(&mut self, name: impl Into<String>, value: Value) {
        self.out_of_band.push(OutOfBandParameter {
            name: name.into(),
            value,
        });
    }

    pub fn finish(self) -> EvaluatedSql {
        EvaluatedSql {
            sql: self.sql,
            parameters: self.parameters,
            out_of_band: self.out_of_band,
        }
    }

    fn on_blank_line(&self) -> bool {
        let current = match self.sql.rfind('\n') {
            Some(newline) => &self.sql[newline + 1..],
            None => &self.sql,
        };
        current.chars().all(|c| c == ' ' || c == '\t')
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub placeholder: PlaceholderStyle,
    pub collapse_blank_lines: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::Question,
            collapse_blank_lines: true,
        }
    }
}

impl From<&EvaluationConfig> for EvaluationOptions {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            placeholder: config.placeholder,
            collapse_blank_lines: config.collapse_blank_lines,
        }
    }
}

/// Evaluates parsed templates into SQL plus bind parameters
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: EvaluationOptions,
}

impl Evaluator {
    pub fn new(options: EvaluationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Evaluate `template` against `context`
    pub fn evaluate(
        &self,
        template: &Template,
        context: &dyn EvaluationContext,
    ) -> Result<EvaluatedSql, EvaluationError> {
        let mut walker = Walker {
            template,
            collapse: self.options.collapse_blank_lines,
            path: Vec::new(),
        };
        let mut buffer = SqlBuffer::new(self.options.placeholder);

        walker.nodes(&template.nodes, context, &mut buffer)?;
        let evaluated = buffer.finish();

        tracing::debug!(
            template = %template.id,
            parameters = evaluated.parameters.len(),
            out_of_band = evaluated.out_of_band.len(),
            "template evaluated"
        );

        Ok(evaluated)
    }
}

/// Per-call traversal state
struct Walker<'t> {
    template: &'t Template,
    collapse: bool,

    /// Labels of the blocks currently entered
    path: Vec<String>,
}

impl Walker<'_> {
    fn fail(&self, node: &Node, kind: EvaluationErrorKind) -> EvaluationError {
        let mut node_path = self.path.clone();
        node_path.push(node.label());

        EvaluationError {
            kind,
            node_path,
            template: self.template.id.display_name(),
            line: node.meta().line,
        }
    }

    fn value(
        &self,
        node: &Node,
        expression: &Expression,
        context: &dyn EvaluationContext,
    ) -> Result<Value, EvaluationError> {
        value::evaluate(&expression.ast, context)
            .map(|v| v.into_owned())
            .map_err(|kind| self.fail(node, kind))
    }

    fn nodes(
        &mut self,
        nodes: &[Node],
        context: &dyn EvaluationContext,
        buffer: &mut SqlBuffer,
    ) -> Result<(), EvaluationError> {
        for node in nodes {
            self.node(node, context, buffer)?;
        }
        Ok(())
    }

    fn node(
        &mut self,
        node: &Node,
        context: &dyn EvaluationContext,
        buffer: &mut SqlBuffer,
    ) -> Result<(), EvaluationError> {
        match node {
            Node::Literal(literal) => buffer.push_literal(literal.text(), self.collapse),
            Node::Bind(bind) => {
                let value = self.value(node, &bind.expression, context)?;
                if bind.array {
                    buffer.push_list(&bind.expression.source, value);
                } else {
                    let sql_type = SqlType::infer(&value);
                    buffer.push_parameter(bind.expression.source.clone(), ParameterDirection::In, sql_type, value);
                }
            }
            Node::Conditional(conditional) => self.conditional(node, conditional, context, buffer)?,
            Node::Loop(lp) => self.repeat(node, lp, context, buffer)?,
            Node::Replace(replace) => {
                let value = self.value(node, &replace.expression, context)?;
                buffer.push_raw(&render_raw(&value));
            }
            Node::Output(output) => {
                let value = match output.direction {
                    ParameterDirection::Out => Value::Null,
                    _ => self.value(node, &output.expression, context)?,
                };
                let sql_type = output.sql_type.clone().or_else(|| SqlType::infer(&value));
                buffer.push_parameter(output.expression.source.clone(), output.direction, sql_type, value);
            }
            Node::ParameterMarker(marker) => {
                let value = self.value(node, &marker.expression, context)?;
                let sql_type = SqlType::infer(&value);
                buffer.push_parameter(marker.expression.source.clone(), ParameterDirection::In, sql_type, value);
            }
            Node::Stream(stream) => {
                let value = self.value(node, &stream.expression, context)?;
                buffer.push_out_of_band(stream.expression.source.clone(), value);
            }
        }
        Ok(())
    }

    fn conditional(
        &mut self,
        node: &Node,
        conditional: &ConditionalNode,
        context: &dyn EvaluationContext,
        buffer: &mut SqlBuffer,
    ) -> Result<(), EvaluationError> {
        let mut chosen = None;

        if truthy(&self.value(node, &conditional.condition, context)?) {
            chosen = Some(&conditional.children);
        } else {
            for branch in &conditional.else_ifs {
                let condition = branch.condition.as_ref();
                let taken = match condition {
                    Some(condition) => truthy(&self.value(node, condition, context)?),
                    None => true,
                };
                if taken {
                    chosen = Some(&branch.children);
                    break;
                }
            }
            if chosen.is_none() {
                chosen = conditional.otherwise.as_ref().map(|branch| &branch.children);
            }
        }

        if let Some(body) = chosen {
            self.path.push(node.label());
            buffer.mark_directive();
            self.nodes(body, context, buffer)?;
            self.path.pop();
        }
        buffer.mark_directive();
        Ok(())
    }

    fn repeat(
        &mut self,
        node: &Node,
        lp: &LoopNode,
        context: &dyn EvaluationContext,
        buffer: &mut SqlBuffer,
    ) -> Result<(), EvaluationError> {
        let source = value::evaluate(&lp.source.ast, context).map_err(|kind| self.fail(node, kind))?;
        let items = match source.as_ref() {
            Value::Array(items) => items,
            other => {
                return Err(self.fail(
                    node,
                    EvaluationErrorKind::NotIterable {
                        expression: lp.source.source.clone(),
                        found: type_name(other),
                    },
                ))
            }
        };

        let label = node.label();
        let index_name = lp.index_name();
        let has_next_name = lp.has_next_name();

        for (i, item) in items.iter().enumerate() {
            let mut scope = Scope::new(context);
            scope
                .bind(lp.item.clone(), item.clone())
                .bind(index_name.clone(), Value::from(i))
                .bind(has_next_name.clone(), Value::Bool(i + 1 < items.len()));

            self.path.push(format!("{}[{}]", label, i));
            buffer.mark_directive();
            self.nodes(&lp.children, &scope, buffer)?;
            self.path.pop();
        }

        tracing::trace!(source = %lp.source, iterations = items.len(), "loop expanded");
        buffer.mark_directive();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use twoway_template::TemplateParser;

    fn render(text: &str, context: Value) -> EvaluatedSql {
        let template = TemplateParser::new().parse(text).unwrap();
        Evaluator::default().evaluate(&template, &context).unwrap()
    }

    #[test]
    fn buffer_numbers_placeholders() {
        let mut buffer = SqlBuffer::new(PlaceholderStyle::Dollar);
        buffer.push_raw("a = ");
        buffer.push_parameter("a", ParameterDirection::In, None, json!(1));
        buffer.push_raw(" and b in ");
        buffer.push_list("b", json!(["x", "y"]));

        let evaluated = buffer.finish();
        assert_eq!(evaluated.sql, "a = $1 and b in ($2, $3)");
        assert_eq!(evaluated.parameters[2].name, "b[1]");
        assert_eq!(evaluated.parameters[2].ordinal, 2);
    }

    #[test]
    fn collapse_only_after_directive() {
        let mut buffer = SqlBuffer::new(PlaceholderStyle::Question);
        buffer.push_literal("select 1\n", true);
        buffer.push_literal("\nfrom t", true);
        assert_eq!(buffer.sql(), "select 1\n\nfrom t");

        let mut buffer = SqlBuffer::new(PlaceholderStyle::Question);
        buffer.push_literal("select 1\n  ", true);
        buffer.mark_directive();
        buffer.push_literal("\n  from t", true);
        assert_eq!(buffer.sql(), "select 1\n  from t");
    }

    #[test]
    fn indented_directives_leave_no_trace() {
        let text = "select *\nfrom t\nwhere 1 = 1\n  /*%if a*/\n  and a = /*a*/1\n  /*%end*/\norder by id\n";
        assert_eq!(
            render(text, json!({"a": 5})).sql,
            "select *\nfrom t\nwhere 1 = 1\n  and a = ?\norder by id\n"
        );
        assert_eq!(
            render(text, json!({"a": null})).sql,
            "select *\nfrom t\nwhere 1 = 1\norder by id\n"
        );
    }

    #[test]
    fn array_bind_expansion() {
        let text = "where id in /*ids*/(1, 2)";
        let evaluated = render(text, json!({"ids": [10, 20, 30]}));
        assert_eq!(evaluated.sql, "where id in (?, ?, ?)");
        assert_eq!(evaluated.values(), vec![&json!(10), &json!(20), &json!(30)]);

        assert_eq!(render(text, json!({"ids": []})).sql, "where id in (NULL)");
        assert_eq!(render(text, json!({"ids": 7})).parameters.len(), 1);
    }

    #[test]
    fn numeric_dummy_needs_word_boundary() {
        let evaluated = render("select /*a*/12abc from t where b = /*b*/3", json!({"b": 1}));
        assert_eq!(evaluated.sql, "select /*a*/12abc from t where b = ?");
        assert_eq!(evaluated.parameters.len(), 1);
    }

    #[test]
    fn replace_substitutes_raw_text() {
        let evaluated = render("select /*#columns*/id from t order by /*#sort*/id", json!({
            "columns": ["id", "name"],
            "sort": "name desc",
        }));
        assert_eq!(evaluated.sql, "select id, name from t order by name desc");
        assert!(evaluated.parameters.is_empty());

        let star = render("select /*#cols*/* from t", json!({"cols": ["id", "name"]}));
        assert_eq!(star.sql, "select id, name from t");
    }

    #[test]
    fn output_parameters_keep_ordinals_aligned() {
        let evaluated = render(
            "{call p(/*a*/1, /*@out total:DECIMAL(10,2)*/0, /*@inout n*/5)}",
            json!({"a": "x", "n": 3}),
        );

        assert_eq!(evaluated.sql, "{call p(?, ?, ?)}");
        let out = &evaluated.parameters[1];
        assert_eq!(out.direction, ParameterDirection::Out);
        assert_eq!(out.value, Value::Null);
        assert_eq!(out.sql_type, Some(SqlType::Decimal { precision: Some(10), scale: Some(2) }));

        let inout = &evaluated.parameters[2];
        assert_eq!(inout.direction, ParameterDirection::InOut);
        assert_eq!(inout.value, json!(3));
        assert_eq!(inout.sql_type, Some(SqlType::Int));
    }

    #[test]
    fn stream_and_parameter_marker() {
        let evaluated = render(
            "insert into t select * from stage where batch = /*?batch*/? /*@stream rows*/",
            json!({"batch": 4, "rows": "blob"}),
        );

        assert_eq!(evaluated.sql, "insert into t select * from stage where batch = ? ");
        assert_eq!(evaluated.parameters[0].name, "batch");
        assert_eq!(evaluated.out_of_band, vec![OutOfBandParameter { name: "rows".to_string(), value: json!("blob") }]);
    }

    #[test]
    fn loop_locals_do_not_leak() {
        let text = "/*%for c : cs*//*c*/0/*%if c_has_next*/,/*%end*//*%end*/ /*c*/0";
        let template = TemplateParser::new().parse(text).unwrap();
        let error = Evaluator::default()
            .evaluate(&template, &json!({"cs": [1, 2]}))
            .unwrap_err();

        assert_eq!(error.variable(), Some("c"));
    }

    #[test]
    fn non_iterable_loop_source() {
        let template = TemplateParser::new().parse("/*%for x : xs*/x/*%end*/").unwrap();
        let error = Evaluator::default()
            .evaluate(&template, &json!({"xs": 5}))
            .unwrap_err();

        assert!(matches!(error.kind, EvaluationErrorKind::NotIterable { .. }));
        assert_eq!(error.node_path, vec!["for(xs)@1"]);
    }

    #[test]
    fn error_path_names_enclosing_blocks() {
        let template = TemplateParser::new()
            .parse_named(
                Some("orders.sql"),
                "/*%for o : orders*/\n/*%if o.paid*/ /*o.missing.x*/1 /*rate*/1 /*%end*/\n/*%end*/",
            )
            .unwrap();
        let error = Evaluator::default()
            .evaluate(&template, &json!({"orders": [{"paid": true}]}))
            .unwrap_err();

        assert_eq!(error.variable(), Some("rate"));
        assert_eq!(error.template, "orders.sql");
        assert_eq!(error.line, 2);
        assert_eq!(
            error.node_path,
            vec!["for(orders)@1[0]", "if(o.paid)@2", "bind(rate)@2"]
        );
    }
}
