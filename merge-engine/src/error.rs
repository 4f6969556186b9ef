//! Error types for the merge engine.
//!
//! Configuration and structure problems are raised eagerly, before any merge
//! logic runs. Nothing in here is retried; every failure is a deterministic
//! function of the inputs.

use std::fmt;

use crate::node::Position;

/// Which of the two input documents an error or decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentSide {
    Template,
    Destination,
}

impl fmt::Display for DocumentSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSide::Template => write!(f, "template"),
            DocumentSide::Destination => write!(f, "destination"),
        }
    }
}

/// Invalid configuration, detected at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Preference was neither a single side nor a per-type mapping.
    #[error("unsupported preference shape: expected \"template\", \"destination\" or an object, got {0}")]
    InvalidPreferenceShape(String),

    /// A preference value outside `{template, destination}`.
    #[error("invalid preference value for `{key}`: {value} (expected \"template\" or \"destination\")")]
    InvalidPreferenceValue { key: String, value: String },

    /// A per-type key that is not a symbol (`[A-Za-z_][A-Za-z0-9_]*`, `:` namespaced).
    #[error("invalid node type key {0:?}: keys must be symbols")]
    InvalidTypeKey(String),

    /// A node-typing rule with an empty or non-symbol merge type.
    #[error("invalid node typing entry for `{node_type}`: {reason}")]
    InvalidNodeTyping {
        node_type: String,
        reason: &'static str,
    },

    #[error("unrecognized injection position {0:?}")]
    InvalidPosition(String),

    /// A boundary was supplied for a position other than `replace`.
    #[error("a boundary is only valid for `replace` injections, not `{0}`")]
    BoundaryWithoutReplace(String),

    #[error("unrecognized resolution strategy {0:?}")]
    InvalidStrategy(String),

    /// Similarity weights must be non-negative and sum to 1.0.
    #[error("similarity weights must be non-negative and sum to 1.0 (content={content}, length={length}, position={position})")]
    InvalidWeights {
        content: f64,
        length: f64,
        position: f64,
    },

    #[error("match threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("invalid text pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Freeze marker styles are registered once per name.
    #[error("freeze marker style `{0}` is already registered")]
    DuplicateMarker(String),

    #[error("invalid freeze marker style `{name}`: {reason}")]
    InvalidMarker { name: String, reason: &'static str },
}

/// Structural problems in a parsed document, reported with line ranges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    /// One or more freeze regions were still open at end of input.
    #[error("unclosed freeze span between lines {start_line}-{end_line} ({} open)", .unclosed.len())]
    UnclosedFreeze {
        start_line: usize,
        end_line: usize,
        unclosed: Vec<Position>,
    },

    /// An unfreeze marker with no open freeze region.
    #[error("unfreeze marker without a matching freeze at line {line}")]
    UnexpectedUnfreeze { line: usize },

    /// A freeze marker inside an already open freeze region.
    #[error("nested freeze marker at line {line} (region opened at line {open_line})")]
    NestedFreeze { open_line: usize, line: usize },
}

impl StructureError {
    /// The source lines the error points at.
    pub fn position(&self) -> Position {
        match self {
            StructureError::UnclosedFreeze {
                start_line,
                end_line,
                ..
            } => Position::new(*start_line, *end_line),
            StructureError::UnexpectedUnfreeze { line } => Position::single(*line),
            StructureError::NestedFreeze { open_line, line } => Position::new(*open_line, *line),
        }
    }
}

/// Node capability failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The backend node does not provide this operation.
    #[error("unsupported operation `{operation}` on `{node_type}` node")]
    Unsupported {
        operation: &'static str,
        node_type: String,
    },

    /// The requested attribute is not part of the node interface at all.
    #[error("unsupported operation `{0}`: not a node capability")]
    UnknownCapability(String),
}

/// Failure reported by a parsing backend.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("syntax error{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Syntax {
        line: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level error of a merge call.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("failed to parse template: {0}")]
    TemplateParse(#[source] ParseError),

    #[error("failed to parse destination: {0}")]
    DestinationParse(#[source] ParseError),

    #[error("invalid structure in {side}: {source}")]
    InvalidStructure {
        side: DocumentSide,
        #[source]
        source: StructureError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Node(#[from] NodeError),

    /// A resolution hook was selected but the backend does not implement it.
    #[error("`{hook}` resolution is not implemented by this backend")]
    HookNotImplemented { hook: &'static str },

    #[error("no injection anchor matched {0}")]
    AnchorNotFound(String),
}

impl MergeError {
    /// Wrap a backend failure, keeping structure errors in their own category.
    pub fn from_parse(side: DocumentSide, err: ParseError) -> Self {
        match (side, err) {
            (side, ParseError::Structure(source)) => MergeError::InvalidStructure { side, source },
            (DocumentSide::Template, err) => MergeError::TemplateParse(err),
            (DocumentSide::Destination, err) => MergeError::DestinationParse(err),
        }
    }
}
