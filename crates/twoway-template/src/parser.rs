//! Template parser service
//!
//! Stateless and thread-safe: holds only the immutable factory list, so one
//! instance can be shared by every caller.

use crate::builder::TreeBuilder;
use crate::error::{LineIndex, ParseError};
use crate::factory::{default_factories, Marker, NodeFactory};
use crate::node::{Template, TemplateId};
use crate::params::ParameterExtractor;

/// Parses template text into [`Template`] trees
#[derive(Debug)]
pub struct TemplateParser {
    factories: Vec<Box<dyn NodeFactory>>,
}

impl TemplateParser {
    /// Create a parser with every built-in marker family
    pub fn new() -> Self {
        Self {
            factories: default_factories(),
        }
    }

    /// Create a parser with a custom factory list.
    ///
    /// List order is the tie-break priority for markers that start at the
    /// same offset with the same length.
    pub fn with_factories(factories: Vec<Box<dyn NodeFactory>>) -> Self {
        Self { factories }
    }

    /// Parse an anonymous template
    pub fn parse(&self, text: &str) -> Result<Template, ParseError> {
        self.parse_named(None, text)
    }

    /// Parse a template, attaching a display name used in errors
    pub fn parse_named(&self, name: Option<&str>, text: &str) -> Result<Template, ParseError> {
        let id = TemplateId::for_text(text, name.map(str::to_string));
        let index = LineIndex::new(text);
        let locate = |e: ParseError| e.locate(&index).with_template(id.display_name());

        let markers = self.tokenize(text).map_err(&locate)?;
        let marker_count = markers.len();
        let nodes = TreeBuilder::new(text, &index, markers).build().map_err(&locate)?;
        let parameters = ParameterExtractor::extract(&nodes);

        tracing::debug!(
            template = %id,
            markers = marker_count,
            nodes = nodes.len(),
            parameters = parameters.len(),
            "template parsed"
        );

        Ok(Template {
            id,
            nodes,
            parameters,
            source: text.to_string(),
        })
    }

    /// Run every factory and merge the findings into one offset-ordered,
    /// non-overlapping marker sequence.
    ///
    /// Ties on the start offset go to the longer match, then to the factory
    /// listed first. A marker overlapping an already accepted one is dropped.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Marker>, ParseError> {
        let mut candidates: Vec<(usize, Marker)> = Vec::new();
        for (priority, factory) in self.factories.iter().enumerate() {
            candidates.extend(factory.scan(text)?.into_iter().map(|m| (priority, m)));
        }

        candidates.sort_by(|(pa, a), (pb, b)| {
            a.span
                .start
                .cmp(&b.span.start)
                .then_with(|| b.span.len().cmp(&a.span.len()))
                .then_with(|| pa.cmp(pb))
        });

        let mut merged: Vec<Marker> = Vec::with_capacity(candidates.len());
        for (_, marker) in candidates {
            if let Some(last) = merged.last() {
                if last.span.overlaps(&marker.span) {
                    tracing::debug!(
                        kept = %last.text,
                        dropped = %marker.text,
                        "overlapping marker dropped"
                    );
                    continue;
                }
            }
            merged.push(marker);
        }

        Ok(merged)
    }
}

impl Default for TemplateParser {
    fn default() -> Self {
        Self::new()
    }
}
