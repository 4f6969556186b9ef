//! The contract a parsing backend fulfils for the engine.
//!
//! A backend turns source text into a [`ParsedDocument`] of [`NodeView`]
//! nodes, supplies signatures, and says which nodes are synthetic
//! fallthrough nodes. Output is always assembled from
//! [`ParsedDocument::source_range`] slices, never re-rendered.

use crate::error::{MergeError, ParseError};
use crate::freeze::FreezeSpan;
use crate::merger::MergeResult;
use crate::node::{NodeView, Position};
use crate::signature::Signature;
use crate::statement::Statement;

/// A parsed document: its nodes in order, its freeze spans and its source.
#[derive(Debug, Clone)]
pub struct ParsedDocument<N> {
    source: String,
    line_starts: Vec<usize>,
    nodes: Vec<N>,
    freeze_spans: Vec<FreezeSpan>,
}

impl<N> ParsedDocument<N> {
    pub fn new(source: impl Into<String>, nodes: Vec<N>, freeze_spans: Vec<FreezeSpan>) -> Self {
        let source = source.into();
        let mut line_starts = Vec::new();
        if !source.is_empty() {
            line_starts.push(0);
            line_starts.extend(
                source
                    .match_indices('\n')
                    .map(|(i, _)| i + 1)
                    .filter(|&start| start < source.len()),
            );
        }
        Self {
            source,
            line_starts,
            nodes,
            freeze_spans,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn freeze_spans(&self) -> &[FreezeSpan] {
        &self.freeze_spans
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Verbatim bytes of lines `start_line..=end_line` (1-based), terminators included.
    ///
    /// Out-of-range requests are clamped; a range past the end is empty.
    pub fn source_range(&self, start_line: usize, end_line: usize) -> &str {
        let start_line = start_line.max(1);
        if start_line > self.line_count() || end_line < start_line {
            return "";
        }
        let begin = self.line_starts[start_line - 1];
        let end = self
            .line_starts
            .get(end_line)
            .copied()
            .unwrap_or(self.source.len());
        &self.source[begin..end]
    }

    /// Verbatim bytes covered by `position`.
    pub fn slice(&self, position: Position) -> &str {
        self.source_range(position.start_line, position.end_line)
    }

    /// The freeze span intersecting `position`, if any.
    pub fn freeze_span_at(&self, position: Position) -> Option<&FreezeSpan> {
        self.freeze_spans.iter().find(|span| span.intersects(&position))
    }
}

/// A parsing collaborator. The engine is generic over it.
pub trait MergeBackend {
    type Node: NodeView;

    /// Short name used in logs.
    fn name(&self) -> &str;

    fn parse(&self, source: &str) -> Result<ParsedDocument<Self::Node>, ParseError>;

    /// `None` excludes the node from exact matching.
    fn signature(&self, node: &Self::Node) -> Option<Signature>;

    /// Synthetic nodes that are carried through rather than content-matched.
    fn is_fallthrough(&self, _node: &Self::Node) -> bool {
        false
    }

    /// Content compared for the identical-content short-circuit.
    fn normalized_content(&self, node: &Self::Node) -> String {
        node.text().trim_end().to_string()
    }

    /// Post-process a fully assembled result. Selected by `ResolutionStrategy::Batch`.
    fn resolve_batch(&self, _result: &mut MergeResult) -> Result<(), MergeError> {
        Err(MergeError::HookNotImplemented { hook: "batch" })
    }

    /// Decide how a replaced range is spliced. Selected by `ResolutionStrategy::Boundary`.
    fn resolve_boundary(
        &self,
        _boundary: &Statement<Self::Node>,
        _partial: &mut MergeResult,
    ) -> Result<(), MergeError> {
        Err(MergeError::HookNotImplemented { hook: "boundary" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str) -> ParsedDocument<()> {
        ParsedDocument::new(source, Vec::new(), Vec::new())
    }

    #[test]
    fn test_source_range_is_verbatim() {
        let d = doc("one\r\ntwo\n\nfour");
        assert_eq!(d.line_count(), 4);
        assert_eq!(d.source_range(1, 1), "one\r\n");
        assert_eq!(d.source_range(2, 3), "two\n\n");
        assert_eq!(d.source_range(4, 4), "four");
        assert_eq!(d.source_range(1, 4), d.source());
        assert_eq!(d.source_range(3, 99), "\nfour");
        assert_eq!(d.source_range(5, 6), "");
    }

    #[test]
    fn test_trailing_newline_does_not_add_a_line() {
        let d = doc("a\nb\n");
        assert_eq!(d.line_count(), 2);
        assert_eq!(d.source_range(2, 2), "b\n");
        assert_eq!(doc("").line_count(), 0);
    }
}
