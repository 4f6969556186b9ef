//! Conflict resolution for matched statement pairs.
//!
//! Three strategies exist:
//!
//! - **node-pair** (always on): one matched template/destination pair becomes
//!   exactly one decision. Identical normalized content short-circuits to
//!   [`DecisionKind::Identical`] and keeps the destination bytes; otherwise
//!   the preference decides.
//! - **batch**: a backend hook over the whole assembled result.
//! - **boundary**: a backend hook deciding how a replaced range is spliced.
//!
//! The batch and boundary hooks have no default behavior; selecting them for
//! a backend that does not implement them fails the merge.
//!
//! Freeze spans are checked by the orchestrator before any of this runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decision::{DecisionKind, DecisionSource};
use crate::error::ConfigError;
use crate::node::NodeView;
use crate::preference::{NodeTyping, Preference, Side};

/// Which hooks a merge runs on top of node-pair resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    #[default]
    NodePair,
    Batch,
    Boundary,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::NodePair => "node_pair",
            ResolutionStrategy::Batch => "batch",
            ResolutionStrategy::Boundary => "boundary",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node_pair" | "node-pair" => Ok(ResolutionStrategy::NodePair),
            "batch" => Ok(ResolutionStrategy::Batch),
            "boundary" => Ok(ResolutionStrategy::Boundary),
            other => Err(ConfigError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Outcome of resolving one matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub kind: DecisionKind,
    pub source: DecisionSource,
}

impl Resolution {
    /// Whether the template's bytes are emitted.
    pub fn takes_template(&self) -> bool {
        self.source == DecisionSource::Template
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    preference: Preference,
    typing: NodeTyping,
}

impl ConflictResolver {
    pub fn new(preference: Preference, typing: NodeTyping) -> Self {
        Self { preference, typing }
    }

    pub fn preference(&self) -> &Preference {
        &self.preference
    }

    /// Preference lookup key for a pair.
    ///
    /// An explicit override on the template wins, then one on the
    /// destination, then the node-typing rules, then the template's own type.
    pub fn merge_type<'a, N: NodeView>(&'a self, template: &'a N, destination: &'a N) -> &'a str {
        if let Some(key) = template.merge_type_override() {
            return key;
        }
        if let Some(key) = destination.merge_type_override() {
            return key;
        }
        self.typing
            .merge_type_for(template.node_type())
            .unwrap_or_else(|| template.node_type())
    }

    pub fn preferred_side<N: NodeView>(&self, template: &N, destination: &N) -> Side {
        self.preference.side_for(self.merge_type(template, destination))
    }

    /// Node-pair strategy.
    pub fn resolve_pair<N: NodeView>(
        &self,
        template: &N,
        template_content: &str,
        destination: &N,
        destination_content: &str,
    ) -> Resolution {
        if template_content == destination_content {
            return Resolution {
                kind: DecisionKind::Identical,
                source: DecisionSource::Destination,
            };
        }
        match self.preferred_side(template, destination) {
            Side::Template => Resolution {
                kind: DecisionKind::KeptTemplate,
                source: DecisionSource::Template,
            },
            Side::Destination => Resolution {
                kind: DecisionKind::KeptDestination,
                source: DecisionSource::Destination,
            },
        }
    }
}
