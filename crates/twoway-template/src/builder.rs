//! Tree builder
//!
//! Takes the offset-sorted marker sequence, synthesizes literal nodes for
//! every gap and nests block markers into a tree in a single linear pass.

use crate::error::{LineIndex, ParseError, ParseErrorKind};
use crate::expr::Expression;
use crate::factory::{Marker, MarkerKind};
use crate::node::{
    BindVariableNode, Branch, ConditionalNode, LiteralNode, LoopNode, Node, NodeMeta, OutputNode,
    ParameterMarkerNode, ReplaceNode, Span, StreamNode,
};

enum Item {
    Literal(Span),
    Marker(Marker),
}

/// Marker that ended a node sequence
enum Terminator {
    End { span: Span, text: String },
    Else { span: Span, text: String },
    ElseIf { span: Span, text: String, condition: Expression },
}

impl Terminator {
    fn into_error(self, kind: ParseErrorKind) -> ParseError {
        let (span, text) = match self {
            Terminator::End { span, text }
            | Terminator::Else { span, text }
            | Terminator::ElseIf { span, text, .. } => (span, text),
        };
        ParseError::new(kind, text, span)
    }
}

/// Builds the node tree for one template text
pub struct TreeBuilder<'a> {
    text: &'a str,
    index: &'a LineIndex,
    items: std::vec::IntoIter<Item>,
}

impl<'a> TreeBuilder<'a> {
    /// `markers` must be sorted by offset and non-overlapping
    pub fn new(text: &'a str, index: &'a LineIndex, markers: Vec<Marker>) -> Self {
        let mut items = Vec::with_capacity(markers.len() * 2 + 1);
        let mut cursor = 0;

        for marker in markers {
            if marker.span.start > cursor {
                items.push(Item::Literal(Span::new(cursor, marker.span.start)));
            }
            cursor = marker.span.end;
            items.push(Item::Marker(marker));
        }
        if cursor < text.len() {
            items.push(Item::Literal(Span::new(cursor, text.len())));
        }

        Self {
            text,
            index,
            items: items.into_iter(),
        }
    }

    /// Build the root node sequence
    pub fn build(mut self) -> Result<Vec<Node>, ParseError> {
        let (nodes, stop) = self.parse_nodes(0)?;

        match stop {
            None => Ok(nodes),
            Some(end @ Terminator::End { .. }) => Err(end.into_error(ParseErrorKind::UnmatchedEnd)),
            Some(branch) => Err(branch.into_error(ParseErrorKind::MisplacedBranch)),
        }
    }

    fn meta(&self, span: Span, marker: &str, depth: usize) -> NodeMeta {
        let (line, column) = self.index.position(span.start);
        NodeMeta {
            span,
            marker: marker.to_string(),
            line,
            column,
            depth,
        }
    }

    /// Parse nodes until a terminator or the end of input
    fn parse_nodes(&mut self, depth: usize) -> Result<(Vec<Node>, Option<Terminator>), ParseError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let marker = match item {
                Item::Literal(span) => {
                    let meta = self.meta(span, &self.text[span.start..span.end], depth);
                    nodes.push(Node::Literal(LiteralNode { meta }));
                    continue;
                }
                Item::Marker(marker) => marker,
            };

            let Marker { span, text, kind, .. } = marker;
            match kind {
                MarkerKind::End => return Ok((nodes, Some(Terminator::End { span, text }))),
                MarkerKind::Else => return Ok((nodes, Some(Terminator::Else { span, text }))),
                MarkerKind::ElseIf { condition } => {
                    return Ok((nodes, Some(Terminator::ElseIf { span, text, condition })))
                }
                MarkerKind::If { condition } => {
                    let meta = self.meta(span, &text, depth);
                    nodes.push(self.parse_conditional(meta, condition)?);
                }
                MarkerKind::For { item, index, source } => {
                    let meta = self.meta(span, &text, depth);
                    nodes.push(self.parse_loop(meta, item, index, source)?);
                }
                leaf => {
                    let meta = self.meta(span, &text, depth);
                    nodes.push(Self::leaf(meta, leaf));
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_conditional(&mut self, meta: NodeMeta, condition: Expression) -> Result<Node, ParseError> {
        let depth = meta.depth;
        let (children, mut stop) = self.parse_nodes(depth + 1)?;
        let mut else_ifs = Vec::new();
        let mut otherwise: Option<Branch> = None;

        loop {
            match stop {
                None => return Err(unterminated(&meta)),
                Some(Terminator::End { .. }) => break,
                Some(branch @ Terminator::ElseIf { .. }) if otherwise.is_some() => {
                    return Err(branch.into_error(ParseErrorKind::BranchAfterElse));
                }
                Some(branch @ Terminator::Else { .. }) if otherwise.is_some() => {
                    return Err(branch.into_error(ParseErrorKind::DuplicateElse));
                }
                Some(Terminator::ElseIf { span, text, condition }) => {
                    let branch_meta = self.meta(span, &text, depth);
                    let (body, next) = self.parse_nodes(depth + 1)?;
                    else_ifs.push(Branch {
                        meta: branch_meta,
                        condition: Some(condition),
                        children: body,
                    });
                    stop = next;
                }
                Some(Terminator::Else { span, text }) => {
                    let branch_meta = self.meta(span, &text, depth);
                    let (body, next) = self.parse_nodes(depth + 1)?;
                    otherwise = Some(Branch {
                        meta: branch_meta,
                        condition: None,
                        children: body,
                    });
                    stop = next;
                }
            }
        }

        Ok(Node::Conditional(ConditionalNode {
            meta,
            condition,
            children,
            else_ifs,
            otherwise,
        }))
    }

    fn parse_loop(
        &mut self,
        meta: NodeMeta,
        item: String,
        index: Option<String>,
        source: Expression,
    ) -> Result<Node, ParseError> {
        let (children, stop) = self.parse_nodes(meta.depth + 1)?;

        match stop {
            None => Err(unterminated(&meta)),
            Some(Terminator::End { .. }) => Ok(Node::Loop(LoopNode {
                meta,
                item,
                index,
                source,
                children,
            })),
            Some(branch) => Err(branch.into_error(ParseErrorKind::MisplacedBranch)),
        }
    }

    fn leaf(meta: NodeMeta, kind: MarkerKind) -> Node {
        match kind {
            MarkerKind::Bind { expression, dummy, array } => Node::Bind(BindVariableNode {
                meta,
                expression,
                dummy,
                array,
            }),
            MarkerKind::Replace { expression, dummy } => Node::Replace(ReplaceNode {
                meta,
                expression,
                dummy,
            }),
            MarkerKind::Output { direction, expression, sql_type, dummy } => Node::Output(OutputNode {
                meta,
                direction,
                expression,
                sql_type,
                dummy,
            }),
            MarkerKind::ParameterMarker { expression } => {
                Node::ParameterMarker(ParameterMarkerNode { meta, expression })
            }
            MarkerKind::Stream { expression } => Node::Stream(StreamNode { meta, expression }),
            MarkerKind::If { .. }
            | MarkerKind::ElseIf { .. }
            | MarkerKind::Else
            | MarkerKind::For { .. }
            | MarkerKind::End => unreachable!("block markers are routed by parse_nodes"),
        }
    }
}

fn unterminated(meta: &NodeMeta) -> ParseError {
    ParseError::new(ParseErrorKind::UnterminatedBlock, meta.marker.clone(), meta.span)
}
