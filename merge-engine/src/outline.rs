//! Line-oriented reference backend.
//!
//! Every source line becomes one node: `heading` (one to six `#` followed by
//! whitespace), `blank`, or `line`. A frozen region becomes a single
//! synthetic `freeze_block` node covering its markers. Headings nest by
//! level and every other node hangs under the closest preceding heading, so
//! depth-aware injection works on plain outlines and Markdown-like files.

use std::fmt;
use std::sync::Arc;

use crate::backend::{MergeBackend, ParsedDocument};
use crate::error::{NodeError, ParseError};
use crate::freeze::FreezeMarkerRegistry;
use crate::node::{NodeView, Position};
use crate::signature::Signature;

pub const FREEZE_BLOCK: &str = "freeze_block";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    Heading(u8),
    Blank,
    Line,
    FreezeBlock,
}

impl OutlineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlineKind::Heading(_) => "heading",
            OutlineKind::Blank => "blank",
            OutlineKind::Line => "line",
            OutlineKind::FreezeBlock => FREEZE_BLOCK,
        }
    }
}

#[derive(Debug)]
struct Entry {
    kind: OutlineKind,
    text: String,
    position: Position,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct OutlineTree {
    entries: Vec<Entry>,
    roots: Vec<usize>,
}

/// A handle to one node of a parsed outline. Cheap to clone.
#[derive(Clone)]
pub struct OutlineNode {
    tree: Arc<OutlineTree>,
    id: usize,
}

impl fmt::Debug for OutlineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry();
        f.debug_struct("OutlineNode")
            .field("id", &self.id)
            .field("kind", &entry.kind)
            .field("position", &entry.position)
            .finish()
    }
}

impl OutlineNode {
    fn entry(&self) -> &Entry {
        &self.tree.entries[self.id]
    }

    fn at(&self, id: usize) -> Self {
        Self {
            tree: self.tree.clone(),
            id,
        }
    }

    pub fn kind(&self) -> OutlineKind {
        self.entry().kind
    }

    pub fn level(&self) -> Option<u8> {
        match self.kind() {
            OutlineKind::Heading(level) => Some(level),
            _ => None,
        }
    }

    fn siblings(&self) -> &[usize] {
        match self.entry().parent {
            Some(parent) => &self.tree.entries[parent].children,
            None => &self.tree.roots,
        }
    }

    fn sibling_at(&self, offset: isize) -> Option<Self> {
        let siblings = self.siblings();
        let here = siblings.iter().position(|&id| id == self.id)?;
        let there = here.checked_add_signed(offset)?;
        siblings.get(there).map(|&id| self.at(id))
    }
}

impl NodeView for OutlineNode {
    fn node_type(&self) -> &str {
        self.kind().as_str()
    }

    fn text(&self) -> &str {
        &self.entry().text
    }

    fn position(&self) -> Position {
        self.entry().position
    }

    fn has_tree_navigation(&self) -> bool {
        true
    }

    fn parent(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.entry().parent.map(|id| self.at(id)))
    }

    fn children(&self) -> Result<Vec<Self>, NodeError> {
        Ok(self.entry().children.iter().map(|&id| self.at(id)).collect())
    }

    fn next_sibling(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.sibling_at(1))
    }

    fn previous_sibling(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.sibling_at(-1))
    }
}

fn heading_level(line: &str) -> Option<u8> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    match line[hashes..].chars().next() {
        Some(c) if c.is_whitespace() => u8::try_from(hashes).ok(),
        _ => None,
    }
}

/// Outline parser with an injected freeze marker registry.
#[derive(Debug, Clone, Default)]
pub struct OutlineBackend {
    markers: FreezeMarkerRegistry,
}

impl OutlineBackend {
    pub fn new(markers: FreezeMarkerRegistry) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &FreezeMarkerRegistry {
        &self.markers
    }
}

impl MergeBackend for OutlineBackend {
    type Node = OutlineNode;

    fn name(&self) -> &str {
        "outline"
    }

    fn parse(&self, source: &str) -> Result<ParsedDocument<OutlineNode>, ParseError> {
        let lines: Vec<&str> = source
            .split_inclusive('\n')
            .map(|line| line.trim_end_matches(|c| c == '\n' || c == '\r'))
            .collect();
        let spans = self.markers.scan(lines.iter().copied())?;

        let mut tree = OutlineTree::default();
        let mut open_headings: Vec<(u8, usize)> = Vec::new();
        let mut pending_spans = spans.iter().peekable();
        let mut line_no = 1;

        while line_no <= lines.len() {
            let id = tree.entries.len();
            let (kind, text, position) = match pending_spans.next_if(|span| span.start_line == line_no) {
                Some(span) => (
                    OutlineKind::FreezeBlock,
                    lines[span.start_line - 1..span.end_line].join("\n"),
                    span.position(),
                ),
                None => {
                    let text = lines[line_no - 1];
                    let kind = if text.trim().is_empty() {
                        OutlineKind::Blank
                    } else if let Some(level) = heading_level(text) {
                        OutlineKind::Heading(level)
                    } else {
                        OutlineKind::Line
                    };
                    (kind, text.to_string(), Position::single(line_no))
                }
            };

            if let OutlineKind::Heading(level) = kind {
                while open_headings.last().is_some_and(|&(open, _)| open >= level) {
                    open_headings.pop();
                }
            }
            let parent = open_headings.last().map(|&(_, id)| id);
            if let OutlineKind::Heading(level) = kind {
                open_headings.push((level, id));
            }
            match parent {
                Some(parent) => tree.entries[parent].children.push(id),
                None => tree.roots.push(id),
            }

            line_no = position.end_line + 1;
            tree.entries.push(Entry {
                kind,
                text,
                position,
                parent,
                children: Vec::new(),
            });
        }

        let tree = Arc::new(tree);
        let nodes = (0..tree.entries.len())
            .map(|id| OutlineNode {
                tree: tree.clone(),
                id,
            })
            .collect();
        Ok(ParsedDocument::new(source, nodes, spans))
    }

    fn signature(&self, node: &OutlineNode) -> Option<Signature> {
        let signature = match node.kind() {
            OutlineKind::FreezeBlock => {
                let position = node.position();
                Signature::span(FREEZE_BLOCK, position.start_line, position.end_line)
            }
            OutlineKind::Blank => Signature::content("blank", ""),
            kind => Signature::content(kind.as_str(), node.text().trim_end()),
        };
        Some(signature)
    }

    fn is_fallthrough(&self, node: &OutlineNode) -> bool {
        node.kind() == OutlineKind::FreezeBlock
    }
}
