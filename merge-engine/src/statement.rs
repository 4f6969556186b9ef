//! Engine-owned sequencing over backend nodes.
//!
//! A [`StatementList`] is built once per document, in source order. Indices
//! are contiguous `0..n` and the prev/next links form a strict doubly linked
//! list over those indices. Nothing is mutated after construction.

use std::ops::RangeInclusive;

use crate::error::NodeError;
use crate::node::{self, Attribute, Capability, NodeView, Position};

/// Safety bound on parent hops, so a malformed backend tree cannot loop forever.
const MAX_TREE_DEPTH: usize = 4096;

/// One node of a document together with its place in document order.
#[derive(Debug, Clone)]
pub struct Statement<N> {
    index: usize,
    node: N,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<N: NodeView> Statement<N> {
    /// Wrap `nodes` in order. Shorthand for [`StatementList::build`].
    pub fn build_list(nodes: impl IntoIterator<Item = N>) -> StatementList<N> {
        StatementList::build(nodes)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn prev_index(&self) -> Option<usize> {
        self.prev
    }

    pub fn next_index(&self) -> Option<usize> {
        self.next
    }

    pub fn node_type(&self) -> &str {
        self.node.node_type()
    }

    pub fn text(&self) -> &str {
        self.node.text()
    }

    pub fn position(&self) -> Position {
        self.node.position()
    }

    pub fn has_tree_navigation(&self) -> bool {
        self.node.has_tree_navigation()
    }

    pub fn parent(&self) -> Result<Option<N>, NodeError> {
        self.node.parent()
    }

    pub fn children(&self) -> Result<Vec<N>, NodeError> {
        self.node.children()
    }

    pub fn first_child(&self) -> Result<Option<N>, NodeError> {
        self.node.first_child()
    }

    pub fn last_child(&self) -> Result<Option<N>, NodeError> {
        self.node.last_child()
    }

    pub fn next_sibling(&self) -> Result<Option<N>, NodeError> {
        self.node.next_sibling()
    }

    pub fn previous_sibling(&self) -> Result<Option<N>, NodeError> {
        self.node.previous_sibling()
    }

    /// Read a declared node capability through the statement.
    pub fn query(&self, capability: Capability) -> Result<Attribute<'_, N>, NodeError> {
        node::query(&self.node, capability)
    }

    /// Like [`query`](Self::query), by name. Unknown names are an error.
    pub fn query_named(&self, name: &str) -> Result<Attribute<'_, N>, NodeError> {
        self.query(name.parse()?)
    }

    /// Number of parent hops to a root. Flat nodes are always at depth 0.
    pub fn tree_depth(&self) -> usize {
        if !self.has_tree_navigation() {
            return 0;
        }
        let mut depth = 0;
        let mut current = self.node.clone();
        while let Ok(Some(parent)) = current.parent() {
            depth += 1;
            if depth >= MAX_TREE_DEPTH {
                tracing::warn!(depth, "tree depth limit reached, stopping parent walk");
                break;
            }
            current = parent;
        }
        depth
    }

    pub fn same_or_shallower_than(&self, other: &Statement<N>) -> bool {
        self.same_or_shallower_than_depth(other.tree_depth())
    }

    pub fn same_or_shallower_than_depth(&self, depth: usize) -> bool {
        self.tree_depth() <= depth
    }
}

/// A document's statements in source order.
#[derive(Debug, Clone)]
pub struct StatementList<N> {
    statements: Vec<Statement<N>>,
}

impl<N: NodeView> StatementList<N> {
    pub fn build(nodes: impl IntoIterator<Item = N>) -> Self {
        let nodes: Vec<N> = nodes.into_iter().collect();
        let count = nodes.len();
        let statements = nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| Statement {
                index,
                node,
                prev: index.checked_sub(1),
                next: (index + 1 < count).then_some(index + 1),
            })
            .collect();
        Self { statements }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Statement<N>> {
        self.statements.get(index)
    }

    pub fn first(&self) -> Option<&Statement<N>> {
        self.statements.first()
    }

    pub fn last(&self) -> Option<&Statement<N>> {
        self.statements.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Statement<N>> {
        self.statements.iter()
    }

    pub fn as_slice(&self) -> &[Statement<N>] {
        &self.statements
    }

    pub fn prev(&self, statement: &Statement<N>) -> Option<&Statement<N>> {
        statement.prev.and_then(|i| self.get(i))
    }

    pub fn next(&self, statement: &Statement<N>) -> Option<&Statement<N>> {
        statement.next.and_then(|i| self.get(i))
    }

    /// Statements within an inclusive index range, clamped to the list.
    pub fn range(&self, range: RangeInclusive<usize>) -> &[Statement<N>] {
        let (start, end) = range.into_inner();
        if self.is_empty() || start > end || start >= self.len() {
            return &[];
        }
        &self.statements[start..=end.min(self.len() - 1)]
    }
}

impl<'a, N> IntoIterator for &'a StatementList<N> {
    type Item = &'a Statement<N>;
    type IntoIter = std::slice::Iter<'a, Statement<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    /// Minimal navigable tree: each entry is (type, text, parent index).
    #[derive(Debug)]
    struct Tree {
        entries: Vec<(&'static str, &'static str, Option<usize>)>,
    }

    #[derive(Debug, Clone)]
    struct TreeNode {
        tree: Rc<Tree>,
        id: usize,
    }

    impl NodeView for TreeNode {
        fn node_type(&self) -> &str {
            self.tree.entries[self.id].0
        }
        fn text(&self) -> &str {
            self.tree.entries[self.id].1
        }
        fn position(&self) -> Position {
            Position::single(self.id + 1)
        }
        fn has_tree_navigation(&self) -> bool {
            true
        }
        fn parent(&self) -> Result<Option<Self>, NodeError> {
            Ok(self.tree.entries[self.id].2.map(|id| TreeNode {
                tree: self.tree.clone(),
                id,
            }))
        }
        fn children(&self) -> Result<Vec<Self>, NodeError> {
            Ok((0..self.tree.entries.len())
                .filter(|&i| self.tree.entries[i].2 == Some(self.id))
                .map(|id| TreeNode {
                    tree: self.tree.clone(),
                    id,
                })
                .collect())
        }
    }

    fn sample() -> StatementList<TreeNode> {
        let tree = Rc::new(Tree {
            entries: vec![
                ("heading", "# A", None),
                ("heading", "## A.1", Some(0)),
                ("line", "text", Some(1)),
                ("heading", "# B", None),
            ],
        });
        Statement::build_list((0..4).map(|id| TreeNode {
            tree: tree.clone(),
            id,
        }))
    }

    #[test]
    fn test_build_list_links() {
        let list = sample();
        assert_eq!(list.len(), 4);
        for (i, stmt) in list.iter().enumerate() {
            assert_eq!(stmt.index(), i);
        }
        assert_eq!(list.first().unwrap().prev_index(), None);
        assert_eq!(list.last().unwrap().next_index(), None);
        let second = list.get(1).unwrap();
        assert_eq!(list.prev(second).unwrap().index(), 0);
        assert_eq!(list.next(second).unwrap().index(), 2);
    }

    #[test]
    fn test_tree_depth_and_comparison() {
        let list = sample();
        let depths: Vec<usize> = list.iter().map(|s| s.tree_depth()).collect();
        assert_eq!(depths, vec![0, 1, 2, 0]);
        let a = list.get(0).unwrap();
        let inner = list.get(2).unwrap();
        assert!(a.same_or_shallower_than(inner));
        assert!(!inner.same_or_shallower_than(a));
        assert!(list.get(3).unwrap().same_or_shallower_than_depth(0));
    }

    #[test]
    fn test_navigation_pass_through() {
        let list = sample();
        let first = list.get(0).unwrap();
        let child = first.first_child().unwrap().unwrap();
        assert_eq!(child.text(), "## A.1");
        assert!(first.parent().unwrap().is_none());
        assert!(first.next_sibling().is_err());
        assert!(first.query_named("children").is_ok());
        assert!(first.query_named("indent_level").is_err());
    }

    #[test]
    fn test_range_is_clamped() {
        let list = sample();
        assert_eq!(list.range(1..=2).len(), 2);
        assert_eq!(list.range(2..=10).len(), 2);
        assert!(list.range(7..=9).is_empty());
    }
}
