//! A flat `key = value` backend for integration tests.
//!
//! Sections (`[name]`) and entries are nodes; blank lines and `#`/`;`
//! comments are not, so they exercise verbatim carrying of uncovered lines.
//! Entries sign by key, so a changed value is a conflict for the resolver.

#![allow(dead_code)]

use structmerge::backend::{MergeBackend, ParsedDocument};
use structmerge::decision::{Decision, DecisionKind, DecisionSource};
use structmerge::error::{MergeError, ParseError};
use structmerge::freeze::FreezeMarkerRegistry;
use structmerge::merger::MergeResult;
use structmerge::node::{NodeView, Position, TypedNode};
use structmerge::signature::Signature;
use structmerge::statement::Statement;

#[derive(Debug, Clone, PartialEq)]
pub struct KvNode {
    kind: &'static str,
    key: String,
    text: String,
    line: usize,
}

impl KvNode {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl NodeView for KvNode {
    fn node_type(&self) -> &str {
        self.kind
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn position(&self) -> Position {
        Position::single(self.line)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyValueBackend {
    markers: FreezeMarkerRegistry,
    typed_prefix: Option<(String, String)>,
    /// Appended by the batch hook.
    footer: Option<String>,
}

impl KeyValueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries whose key starts with `prefix` are merged as `merge_type`.
    pub fn typed_prefix(mut self, prefix: &str, merge_type: &str) -> Self {
        self.typed_prefix = Some((prefix.to_string(), merge_type.to_string()));
        self
    }

    pub fn with_footer(mut self, footer: &str) -> Self {
        self.footer = Some(footer.to_string());
        self
    }
}

impl MergeBackend for KeyValueBackend {
    type Node = TypedNode<KvNode>;

    fn name(&self) -> &str {
        "key_value"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument<Self::Node>, ParseError> {
        let lines: Vec<&str> = source.lines().collect();
        let spans = self.markers.scan(lines.iter().copied())?;
        let mut nodes = Vec::new();

        for (i, raw) in lines.iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let (kind, key) = if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                ("section", name.trim().to_string())
            } else if let Some((key, _)) = line.split_once('=') {
                ("entry", key.trim().to_string())
            } else {
                return Err(ParseError::Syntax {
                    line: Some(i + 1),
                    message: format!("expected `key = value`, got {line:?}"),
                });
            };
            let node = KvNode {
                kind,
                key,
                text: raw.to_string(),
                line: i + 1,
            };
            let node = match &self.typed_prefix {
                Some((prefix, merge_type)) if kind == "entry" && node.key.starts_with(prefix.as_str()) => {
                    TypedNode::new(node, merge_type.clone())
                }
                _ => TypedNode::plain(node),
            };
            nodes.push(node);
        }

        Ok(ParsedDocument::new(source, nodes, spans))
    }

    fn signature(&self, node: &Self::Node) -> Option<Signature> {
        Some(Signature::content(node.node_type(), node.inner().key()))
    }

    fn resolve_batch(&self, result: &mut MergeResult) -> Result<(), MergeError> {
        if let Some(footer) = &self.footer {
            result.push_content(footer);
            result.record(Decision::new(DecisionKind::Merged, DecisionSource::Merged));
        }
        Ok(())
    }

    fn resolve_boundary(
        &self,
        boundary: &Statement<Self::Node>,
        partial: &mut MergeResult,
    ) -> Result<(), MergeError> {
        partial.record(
            Decision::new(DecisionKind::Merged, DecisionSource::Merged)
                .with_destination(boundary.index())
                .at_line(boundary.position().start_line),
        );
        Ok(())
    }
}
