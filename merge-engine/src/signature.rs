//! Structural equality keys.
//!
//! Two statements occupy "the same slot" iff their signatures are equal.
//! Signatures come from the backend and are opaque to the engine; they are
//! computed once per statement and cached in a [`SignatureMap`].

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::node::NodeView;
use crate::statement::StatementList;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    /// Type tag plus normalized content, the common case.
    Content { node_type: String, content: String },
    /// A line-anchored synthetic region such as a freeze block.
    Span {
        kind: String,
        start_line: usize,
        end_line: usize,
    },
    /// Any other backend-specific key.
    Tuple(Vec<String>),
}

impl Signature {
    pub fn content(node_type: impl Into<String>, content: impl Into<String>) -> Self {
        Signature::Content {
            node_type: node_type.into(),
            content: content.into(),
        }
    }

    pub fn span(kind: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Signature::Span {
            kind: kind.into(),
            start_line,
            end_line,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Content { node_type, content } => write!(f, "({node_type}, {content:?})"),
            Signature::Span {
                kind,
                start_line,
                end_line,
            } => write!(f, "({kind}, {start_line}, {end_line})"),
            Signature::Tuple(parts) => write!(f, "({})", parts.join(", ")),
        }
    }
}

/// Per-document signature cache: `signature -> statement indices in order`.
///
/// Statements whose signature is undefined are left out of the index and are
/// never exact-matched.
#[derive(Debug, Clone, Default)]
pub struct SignatureMap {
    by_signature: HashMap<Signature, Vec<usize>>,
    by_index: Vec<Option<Signature>>,
}

impl SignatureMap {
    pub fn build<N, F>(statements: &StatementList<N>, mut signature: F) -> Self
    where
        N: NodeView,
        F: FnMut(&N) -> Option<Signature>,
    {
        let mut by_signature: HashMap<Signature, Vec<usize>> = HashMap::new();
        let mut by_index = Vec::with_capacity(statements.len());
        for stmt in statements {
            let sig = signature(stmt.node());
            if let Some(sig) = &sig {
                by_signature.entry(sig.clone()).or_default().push(stmt.index());
            }
            by_index.push(sig);
        }
        Self {
            by_signature,
            by_index,
        }
    }

    pub fn signature_of(&self, index: usize) -> Option<&Signature> {
        self.by_index.get(index).and_then(Option::as_ref)
    }

    /// Indices carrying `signature`, in document order.
    pub fn indices(&self, signature: &Signature) -> &[usize] {
        self.by_signature
            .get(signature)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First index with `signature` that `used` has not claimed yet.
    pub fn first_unused(&self, signature: &Signature, used: &[bool]) -> Option<usize> {
        self.indices(signature)
            .iter()
            .copied()
            .find(|&i| !used.get(i).copied().unwrap_or(true))
    }

    /// Number of distinct signatures.
    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}
