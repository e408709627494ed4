//! Parameter extraction
//!
//! Harvests the externally referenced variable names of a template without
//! evaluating it. Literals are discarded, helper calls are unwrapped to their
//! arguments and dotted paths collapse to their root segment. Names bound by
//! an enclosing loop are local and never reported.

use crate::expr::{Expr, ExprError, Expression};
use crate::node::{Node, ParameterDefinition};
use std::collections::HashSet;
use twoway_core::ParameterDirection;

/// Walks a node tree collecting parameter definitions in first-reference order
#[derive(Debug, Default)]
pub struct ParameterExtractor {
    seen: HashSet<String>,
    parameters: Vec<ParameterDefinition>,

    /// Loop-bound names, innermost scope last
    scopes: Vec<Vec<String>>,
}

impl ParameterExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the deduplicated parameter set of a node tree
    pub fn extract(nodes: &[Node]) -> Vec<ParameterDefinition> {
        let mut extractor = Self::new();
        extractor.visit_nodes(nodes);
        extractor.parameters
    }

    fn visit_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.visit_node(node);
        }
    }

    fn visit_node(&mut self, node: &Node) {
        let line = node.meta().line;

        match node {
            Node::Literal(_) => {}
            Node::Bind(bind) => self.visit_expression(&bind.expression, line),
            Node::Replace(replace) => self.visit_expression(&replace.expression, line),
            Node::ParameterMarker(marker) => self.visit_expression(&marker.expression, line),
            Node::Stream(stream) => self.visit_expression(&stream.expression, line),
            Node::Output(output) => {
                // a pure OUT parameter names a result slot, it reads nothing
                if output.direction != ParameterDirection::Out {
                    self.visit_expression(&output.expression, line);
                }
            }
            Node::Conditional(conditional) => {
                self.visit_expression(&conditional.condition, line);
                self.visit_nodes(&conditional.children);

                for branch in conditional.else_ifs.iter().chain(conditional.otherwise.iter()) {
                    if let Some(condition) = &branch.condition {
                        self.visit_expression(condition, branch.meta.line);
                    }
                    self.visit_nodes(&branch.children);
                }
            }
            Node::Loop(lp) => {
                // the source is evaluated in the enclosing scope
                self.visit_expression(&lp.source, line);

                self.scopes.push(vec![lp.item.clone(), lp.index_name(), lp.has_next_name()]);
                self.visit_nodes(&lp.children);
                self.scopes.pop();
            }
        }
    }

    fn visit_expression(&mut self, expression: &Expression, line: usize) {
        let mut roots = Vec::new();
        collect_roots(&expression.ast, &mut roots);

        for root in roots {
            if self.is_loop_bound(&root) || !self.seen.insert(root.clone()) {
                continue;
            }
            tracing::trace!(name = %root, line, "parameter harvested");
            self.parameters.push(ParameterDefinition { name: root, line });
        }
    }

    fn is_loop_bound(&self, name: &str) -> bool {
        self.scopes.iter().flatten().any(|bound| bound == name)
    }
}

/// Variable roots referenced by an expression, left to right, with repeats
fn collect_roots(expr: &Expr, roots: &mut Vec<String>) {
    match expr {
        Expr::Literal { .. } => {}
        Expr::Path(path) => roots.push(path.root.clone()),
        Expr::Not { operand } => collect_roots(operand, roots),
        Expr::Binary { left, right, .. } => {
            collect_roots(left, roots);
            collect_roots(right, roots);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_roots(arg, roots);
            }
        }
    }
}

/// Harvest the variable names referenced by a single expression string
pub fn extract_parameters(expression: &str) -> Result<Vec<String>, ExprError> {
    let parsed = Expression::parse(expression)?;
    let mut roots = Vec::new();
    collect_roots(&parsed.ast, &mut roots);

    let mut seen = HashSet::new();
    roots.retain(|root| seen.insert(root.clone()));
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_and_literal_are_dropped() {
        let names = extract_parameters("isEmpty(customer.name) || status == 'ACTIVE'").unwrap();
        assert_eq!(names, vec!["customer", "status"]);
    }

    #[test]
    fn redundant_parentheses_and_repeats() {
        let names = extract_parameters("((a > 1)) && (b.c == a || !d)").unwrap();
        assert_eq!(names, vec!["a", "b", "d"]);
    }

    #[test]
    fn numeric_boolean_null_tokens_are_not_variables() {
        let names = extract_parameters("x != null && y == true && z >= 3.5").unwrap();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn membership_collects_both_sides() {
        let names = extract_parameters("status in allowed.statuses").unwrap();
        assert_eq!(names, vec!["status", "allowed"]);
    }
}
