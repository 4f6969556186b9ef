//! # structmerge
//!
//! A format-agnostic structural merge engine. It merges a *template*
//! document into a *destination* document by matching parsed nodes,
//! resolving conflicts by preference, and re-assembling the output from
//! verbatim source ranges so the destination's formatting survives.
//!
//! ## Pipeline
//!
//! 1. **Parsing** is delegated to a [`MergeBackend`], which produces
//!    [`NodeView`] nodes, signatures, and freeze spans.
//! 2. **Exact matching** pairs statements with equal [`Signature`]s,
//!    first-available in document order.
//! 3. **Fuzzy matching** ([`MatchRefiner`]) pairs what is left by weighted
//!    content, length and position similarity, greedily.
//! 4. **Resolution** ([`ConflictResolver`]) turns each pair into one
//!    [`Decision`]; destination freeze spans always win.
//! 5. **Assembly** concatenates the chosen ranges and records a
//!    [`DecisionLog`].
//!
//! Partial merges apply a template at an [`InjectionPoint`] instead of over
//! the whole destination.
//!
//! ## Example
//!
//! ```rust
//! use structmerge::{MergeOptions, OutlineBackend, Side, SmartMerger};
//!
//! let merger = SmartMerger::new(
//!     OutlineBackend::default(),
//!     MergeOptions::default()
//!         .with_preference(Side::Destination)
//!         .with_template_only_nodes(true),
//! );
//!
//! let result = merger
//!     .merge("# Project\n## License\nMIT\n", "# Project\nlocal notes\n")
//!     .unwrap();
//!
//! assert_eq!(result.content(), "# Project\nlocal notes\n## License\nMIT\n");
//! println!("{:?}", result.summary());
//! ```

pub mod backend;
pub mod decision;
pub mod error;
pub mod freeze;
pub mod injection;
pub mod merger;
pub mod node;
pub mod outline;
pub mod preference;
pub mod refiner;
pub mod resolver;
pub mod signature;
pub mod similarity;
pub mod statement;

// Re-export primary public API
pub use backend::{MergeBackend, ParsedDocument};
pub use decision::{Decision, DecisionKind, DecisionLog, DecisionSource};
pub use error::{ConfigError, MergeError, NodeError, ParseError, StructureError};
pub use freeze::{CommentStyle, FreezeMarkerRegistry, FreezeSpan};
pub use injection::{InjectionPoint, InjectionPointFinder, InjectionPosition, InjectionSpec, StatementMatcher};
pub use merger::{MergeOptions, MergeResult, SmartMerger};
pub use node::{Capability, NodeView, Position, TypedNode};
pub use outline::{OutlineBackend, OutlineNode};
pub use preference::{NodeTyping, Preference, Side};
pub use refiner::{MatchRefiner, MatchResult, SimilarityWeights};
pub use resolver::{ConflictResolver, ResolutionStrategy};
pub use signature::{Signature, SignatureMap};
pub use statement::{Statement, StatementList};
