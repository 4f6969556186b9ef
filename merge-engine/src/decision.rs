//! The audit trail of a merge: one [`Decision`] per emitted or dropped slot.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Conflict resolved in favour of the template.
    KeptTemplate,
    /// Conflict resolved in favour of the destination, or carried through.
    KeptDestination,
    /// Content combined by a backend hook.
    Merged,
    /// Template-only content added to the output.
    Added,
    /// Destination content inside a freeze span, kept verbatim.
    FreezeBlock,
    /// A destination range replaced by a partial template merge.
    Replaced,
    /// Destination-only content kept.
    Appended,
    /// Both sides had the same normalized content.
    Identical,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::KeptTemplate => "kept_template",
            DecisionKind::KeptDestination => "kept_destination",
            DecisionKind::Merged => "merged",
            DecisionKind::Added => "added",
            DecisionKind::FreezeBlock => "freeze_block",
            DecisionKind::Replaced => "replaced",
            DecisionKind::Appended => "appended",
            DecisionKind::Identical => "identical",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the emitted bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Template,
    Destination,
    Merged,
}

/// One audit log entry. Node references are statement indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub source: DecisionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Similarity score for fuzzy pairings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(kind: DecisionKind, source: DecisionSource) -> Self {
        Self {
            kind,
            source,
            template_index: None,
            destination_index: None,
            line: None,
            score: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_template(mut self, index: usize) -> Self {
        self.template_index = Some(index);
        self
    }

    pub fn with_destination(mut self, index: usize) -> Self {
        self.destination_index = Some(index);
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Append-only, ordered decision log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionLog {
    entries: Vec<Decision>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decision: Decision) {
        tracing::debug!(
            kind = %decision.kind,
            template = ?decision.template_index,
            destination = ?decision.destination_index,
            line = ?decision.line,
            "decision"
        );
        self.entries.push(decision);
    }

    /// Move every entry of `other` to the end of this log, in order.
    pub fn append(&mut self, other: DecisionLog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Decision> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Decision] {
        &self.entries
    }

    pub fn count(&self, kind: DecisionKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    /// Count of decisions by kind.
    pub fn summary(&self) -> BTreeMap<DecisionKind, usize> {
        let mut summary = BTreeMap::new();
        for decision in &self.entries {
            *summary.entry(decision.kind).or_insert(0) += 1;
        }
        summary
    }
}

impl<'a> IntoIterator for &'a DecisionLog {
    type Item = &'a Decision;
    type IntoIter = std::slice::Iter<'a, Decision>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
