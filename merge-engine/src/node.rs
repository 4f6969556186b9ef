//! The capability interface every backend node satisfies.
//!
//! The engine never looks inside a backend's parse tree directly. Backends
//! implement [`NodeView`] for a cheap, cloneable node handle (an index into
//! an arena, an `Rc`, ...) and the engine only ever goes through the methods
//! declared here. Tree navigation is optional: nodes of flat or synthetic
//! documents keep the default implementations, which report
//! [`NodeError::Unsupported`] instead of inventing values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Inclusive, 1-based line span of a node in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub start_line: usize,
    pub end_line: usize,
}

impl Position {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    pub fn intersects(&self, other: &Position) -> bool {
        self.start_line <= other.end_line && other.start_line <= self.end_line
    }

    pub fn contains(&self, other: &Position) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "line {}", self.start_line)
        } else {
            write!(f, "lines {}-{}", self.start_line, self.end_line)
        }
    }
}

/// A read-only view of one backend node.
pub trait NodeView: Clone + fmt::Debug {
    /// Backend type tag (`heading`, `table_row`, ...).
    fn node_type(&self) -> &str;

    /// The node's source text.
    fn text(&self) -> &str;

    fn position(&self) -> Position;

    /// Classification used for preference lookup instead of [`node_type`](Self::node_type).
    fn merge_type_override(&self) -> Option<&str> {
        None
    }

    /// Whether parent/children/sibling navigation is available.
    fn has_tree_navigation(&self) -> bool {
        false
    }

    /// `Ok(None)` for a root node of a navigable tree.
    fn parent(&self) -> Result<Option<Self>, NodeError> {
        Err(unsupported(self, "parent"))
    }

    fn children(&self) -> Result<Vec<Self>, NodeError> {
        Err(unsupported(self, "children"))
    }

    fn first_child(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.children()?.into_iter().next())
    }

    fn last_child(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.children()?.pop())
    }

    fn next_sibling(&self) -> Result<Option<Self>, NodeError> {
        Err(unsupported(self, "next_sibling"))
    }

    fn previous_sibling(&self) -> Result<Option<Self>, NodeError> {
        Err(unsupported(self, "previous_sibling"))
    }
}

/// Build the error a node reports for an operation it does not provide.
pub fn unsupported<N: NodeView>(node: &N, operation: &'static str) -> NodeError {
    NodeError::Unsupported {
        operation,
        node_type: node.node_type().to_string(),
    }
}

/// The type a node is merged as: its override if it carries one, else its own type.
pub fn merge_type_of<N: NodeView>(node: &N) -> &str {
    node.merge_type_override().unwrap_or_else(|| node.node_type())
}

/// The explicitly enumerated set of node attributes reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    NodeType,
    Text,
    Position,
    Parent,
    Children,
    FirstChild,
    LastChild,
    NextSibling,
    PreviousSibling,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::NodeType,
        Capability::Text,
        Capability::Position,
        Capability::Parent,
        Capability::Children,
        Capability::FirstChild,
        Capability::LastChild,
        Capability::NextSibling,
        Capability::PreviousSibling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NodeType => "type",
            Capability::Text => "text",
            Capability::Position => "position",
            Capability::Parent => "parent",
            Capability::Children => "children",
            Capability::FirstChild => "first_child",
            Capability::LastChild => "last_child",
            Capability::NextSibling => "next_sibling",
            Capability::PreviousSibling => "previous_sibling",
        }
    }
}

impl FromStr for Capability {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "type" | "node_type" => Ok(Capability::NodeType),
            other => Capability::ALL
                .into_iter()
                .find(|c| c.as_str() == other)
                .ok_or_else(|| NodeError::UnknownCapability(other.to_string())),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a [`Capability`] query.
#[derive(Debug, Clone)]
pub enum Attribute<'a, N> {
    Str(&'a str),
    Position(Position),
    Node(Option<N>),
    Nodes(Vec<N>),
}

impl<'a, N> Attribute<'a, N> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Attribute::Str(s) => Some(*s),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<N> {
        match self {
            Attribute::Node(n) => n,
            _ => None,
        }
    }
}

/// Read one declared capability of a node.
pub fn query<N: NodeView>(node: &N, capability: Capability) -> Result<Attribute<'_, N>, NodeError> {
    Ok(match capability {
        Capability::NodeType => Attribute::Str(node.node_type()),
        Capability::Text => Attribute::Str(node.text()),
        Capability::Position => Attribute::Position(node.position()),
        Capability::Parent => Attribute::Node(node.parent()?),
        Capability::Children => Attribute::Nodes(node.children()?),
        Capability::FirstChild => Attribute::Node(node.first_child()?),
        Capability::LastChild => Attribute::Node(node.last_child()?),
        Capability::NextSibling => Attribute::Node(node.next_sibling()?),
        Capability::PreviousSibling => Attribute::Node(node.previous_sibling()?),
    })
}

/// A node reclassified for preference lookup without touching the parse tree.
///
/// Wrapping a `TypedNode` again nests statically (`TypedNode<TypedNode<N>>`);
/// the outermost override wins and [`inner`](Self::inner) always unwraps
/// exactly one level. Use [`retyped`](Self::retyped) to replace an override
/// rather than stacking another wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode<N> {
    inner: N,
    merge_type_override: Option<String>,
}

impl<N: NodeView> TypedNode<N> {
    pub fn new(inner: N, merge_type: impl Into<String>) -> Self {
        Self {
            inner,
            merge_type_override: Some(merge_type.into()),
        }
    }

    /// Wrap without an override, so typed and untyped nodes share one list.
    pub fn plain(inner: N) -> Self {
        Self {
            inner,
            merge_type_override: None,
        }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn into_inner(self) -> N {
        self.inner
    }

    pub fn is_typed(&self) -> bool {
        self.merge_type_override.is_some()
    }

    pub fn retyped(mut self, merge_type: impl Into<String>) -> Self {
        self.merge_type_override = Some(merge_type.into());
        self
    }

    fn wrap_all(nodes: Vec<N>) -> Vec<Self> {
        nodes.into_iter().map(Self::plain).collect()
    }
}

impl<N: NodeView> NodeView for TypedNode<N> {
    fn node_type(&self) -> &str {
        self.inner.node_type()
    }

    fn text(&self) -> &str {
        self.inner.text()
    }

    fn position(&self) -> Position {
        self.inner.position()
    }

    fn merge_type_override(&self) -> Option<&str> {
        self.merge_type_override
            .as_deref()
            .or_else(|| self.inner.merge_type_override())
    }

    fn has_tree_navigation(&self) -> bool {
        self.inner.has_tree_navigation()
    }

    fn parent(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.inner.parent()?.map(Self::plain))
    }

    fn children(&self) -> Result<Vec<Self>, NodeError> {
        Ok(Self::wrap_all(self.inner.children()?))
    }

    fn first_child(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.inner.first_child()?.map(Self::plain))
    }

    fn last_child(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.inner.last_child()?.map(Self::plain))
    }

    fn next_sibling(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.inner.next_sibling()?.map(Self::plain))
    }

    fn previous_sibling(&self) -> Result<Option<Self>, NodeError> {
        Ok(self.inner.previous_sibling()?.map(Self::plain))
    }
}
