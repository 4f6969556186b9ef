//! Injection points: where a partial template lands in a destination.
//!
//! An [`InjectionSpec`] describes the anchor to look for (node type and/or a
//! text pattern and/or a custom predicate), where to inject relative to it,
//! and, for replacements, how to find the end of the replaced range. The
//! [`InjectionPointFinder`] resolves an [`InjectionSpec`] against a concrete
//! [`StatementList`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::NodeView;
use crate::statement::{Statement, StatementList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPosition {
    Before,
    After,
    Replace,
    FirstChild,
    LastChild,
}

impl InjectionPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionPosition::Before => "before",
            InjectionPosition::After => "after",
            InjectionPosition::Replace => "replace",
            InjectionPosition::FirstChild => "first_child",
            InjectionPosition::LastChild => "last_child",
        }
    }
}

impl fmt::Display for InjectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InjectionPosition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(InjectionPosition::Before),
            "after" => Ok(InjectionPosition::After),
            "replace" => Ok(InjectionPosition::Replace),
            "first_child" | "first-child" => Ok(InjectionPosition::FirstChild),
            "last_child" | "last-child" => Ok(InjectionPosition::LastChild),
            other => Err(ConfigError::InvalidPosition(other.to_string())),
        }
    }
}

type Predicate<N> = Box<dyn Fn(&Statement<N>) -> bool>;

/// Statement predicate. Every criterion that is set must hold; a matcher
/// with no criteria matches everything.
pub struct StatementMatcher<N> {
    node_type: Option<String>,
    text: Option<Regex>,
    custom: Option<Predicate<N>>,
}

impl<N> fmt::Debug for StatementMatcher<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementMatcher")
            .field("node_type", &self.node_type)
            .field("text", &self.text.as_ref().map(Regex::as_str))
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl<N: NodeView> Default for StatementMatcher<N> {
    fn default() -> Self {
        Self::any()
    }
}

impl<N: NodeView> StatementMatcher<N> {
    pub fn any() -> Self {
        Self {
            node_type: None,
            text: None,
            custom: None,
        }
    }

    pub fn of_type(node_type: impl Into<String>) -> Self {
        Self::any().with_type(node_type)
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    /// Require the statement text to match a regular expression.
    pub fn with_text(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.text = Some(regex);
        Ok(self)
    }

    pub fn with_predicate(mut self, predicate: impl Fn(&Statement<N>) -> bool + 'static) -> Self {
        self.custom = Some(Box::new(predicate));
        self
    }

    pub fn matches(&self, statement: &Statement<N>) -> bool {
        if let Some(node_type) = &self.node_type {
            if statement.node_type() != node_type {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !text.is_match(statement.text()) {
                return false;
            }
        }
        if let Some(custom) = &self.custom {
            if !custom(statement) {
                return false;
            }
        }
        true
    }
}

impl<N> fmt::Display for StatementMatcher<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(t) = &self.node_type {
            parts.push(format!("type={t}"));
        }
        if let Some(re) = &self.text {
            parts.push(format!("text=/{}/", re.as_str()));
        }
        if self.custom.is_some() {
            parts.push("custom predicate".to_string());
        }
        if parts.is_empty() {
            f.write_str("any statement")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// How to find the end of a replaced range.
#[derive(Debug)]
pub struct BoundarySpec<N> {
    pub matcher: StatementMatcher<N>,
    /// Skip candidates nested deeper than the anchor.
    pub same_or_shallower: bool,
}

/// A request for an injection point.
#[derive(Debug)]
pub struct InjectionSpec<N> {
    anchor: StatementMatcher<N>,
    position: InjectionPosition,
    boundary: Option<BoundarySpec<N>>,
}

impl<N: NodeView> InjectionSpec<N> {
    pub fn new(anchor: StatementMatcher<N>, position: InjectionPosition) -> Self {
        Self {
            anchor,
            position,
            boundary: None,
        }
    }

    /// Only valid for [`InjectionPosition::Replace`].
    pub fn with_boundary(
        mut self,
        matcher: StatementMatcher<N>,
        same_or_shallower: bool,
    ) -> Result<Self, ConfigError> {
        if self.position != InjectionPosition::Replace {
            return Err(ConfigError::BoundaryWithoutReplace(self.position.to_string()));
        }
        self.boundary = Some(BoundarySpec {
            matcher,
            same_or_shallower,
        });
        Ok(self)
    }

    pub fn anchor(&self) -> &StatementMatcher<N> {
        &self.anchor
    }

    pub fn position(&self) -> InjectionPosition {
        self.position
    }

    pub fn boundary(&self) -> Option<&BoundarySpec<N>> {
        self.boundary.as_ref()
    }
}

/// A resolved injection location within one statement list.
///
/// `boundary`, when present, is the last statement of the replaced range and
/// only exists for `Replace` injections. The statement that ended a boundary
/// search, which stays outside the range, is kept as `boundary_match`.
#[derive(Debug, Clone)]
pub struct InjectionPoint<'a, N> {
    anchor: &'a Statement<N>,
    position: InjectionPosition,
    boundary: Option<&'a Statement<N>>,
    boundary_match: Option<&'a Statement<N>>,
    metadata: BTreeMap<String, String>,
}

impl<'a, N: NodeView> InjectionPoint<'a, N> {
    pub fn new(
        anchor: &'a Statement<N>,
        position: InjectionPosition,
        boundary: Option<&'a Statement<N>>,
    ) -> Result<Self, ConfigError> {
        if boundary.is_some() && position != InjectionPosition::Replace {
            return Err(ConfigError::BoundaryWithoutReplace(position.to_string()));
        }
        Ok(Self {
            anchor,
            position,
            boundary,
            boundary_match: None,
            metadata: BTreeMap::new(),
        })
    }

    /// Parse the position from its name first.
    pub fn from_name(
        anchor: &'a Statement<N>,
        position: &str,
        boundary: Option<&'a Statement<N>>,
    ) -> Result<Self, ConfigError> {
        Self::new(anchor, position.parse()?, boundary)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn anchor(&self) -> &'a Statement<N> {
        self.anchor
    }

    pub fn position(&self) -> InjectionPosition {
        self.position
    }

    /// Last statement of the replaced range. This is the statement just
    /// before the boundary match, not the match itself.
    pub fn boundary(&self) -> Option<&'a Statement<N>> {
        self.boundary
    }

    /// The first statement the boundary matcher accepted, if any.
    pub fn boundary_match(&self) -> Option<&'a Statement<N>> {
        self.boundary_match
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Index range of the replaced statements: just the anchor without a
    /// boundary, otherwise anchor through boundary inclusive.
    pub fn replaced_range(&self) -> RangeInclusive<usize> {
        let start = self.anchor.index();
        let end = self.boundary.map_or(start, |b| b.index().max(start));
        start..=end
    }

    pub fn replaced_statements(&self, statements: &'a StatementList<N>) -> &'a [Statement<N>] {
        statements.range(self.replaced_range())
    }
}

/// Anchor and boundary search over a flat statement sequence.
#[derive(Debug, Clone, Copy)]
pub struct InjectionPointFinder<'a, N> {
    statements: &'a StatementList<N>,
}

impl<'a, N: NodeView> InjectionPointFinder<'a, N> {
    pub fn new(statements: &'a StatementList<N>) -> Self {
        Self { statements }
    }

    /// First statement in document order satisfying `matcher`.
    pub fn find(&self, matcher: &StatementMatcher<N>) -> Option<&'a Statement<N>> {
        self.statements.iter().find(|s| matcher.matches(s))
    }

    pub fn find_all(&self, matcher: &StatementMatcher<N>) -> Vec<&'a Statement<N>> {
        self.statements.iter().filter(|s| matcher.matches(s)).collect()
    }

    /// First statement after `anchor` satisfying `matcher`.
    ///
    /// With `same_or_shallower`, statements nested deeper than the anchor are
    /// skipped. Flat nodes have no depth, so the filter is a no-op for them.
    pub fn find_boundary(
        &self,
        anchor: &Statement<N>,
        matcher: &StatementMatcher<N>,
        same_or_shallower: bool,
    ) -> Option<&'a Statement<N>> {
        let filter_depth = same_or_shallower && anchor.has_tree_navigation();
        if same_or_shallower && !filter_depth {
            tracing::warn!(
                node_type = anchor.node_type(),
                "anchor has no tree navigation, ignoring depth filter"
            );
        }
        let anchor_depth = if filter_depth { anchor.tree_depth() } else { 0 };
        self.statements
            .as_slice()
            .get(anchor.index() + 1..)
            .unwrap_or(&[])
            .iter()
            .filter(|s| !filter_depth || s.same_or_shallower_than_depth(anchor_depth))
            .find(|s| matcher.matches(s))
    }

    /// Resolve `spec`. `Ok(None)` when no anchor matches.
    ///
    /// For a `Replace` with a boundary matcher, the replaced range runs from the
    /// anchor up to the statement before the first boundary match, or to the
    /// end of the document when nothing matches. The point's `boundary` is
    /// that last replaced statement; the match is `boundary_match`.
    pub fn locate(&self, spec: &InjectionSpec<N>) -> Result<Option<InjectionPoint<'a, N>>, ConfigError> {
        let Some(anchor) = self.find(spec.anchor()) else {
            return Ok(None);
        };

        let mut boundary = None;
        let mut stop = None;
        if let Some(boundary_spec) = spec.boundary() {
            let found = self.find_boundary(anchor, &boundary_spec.matcher, boundary_spec.same_or_shallower);
            stop = found;
            let last = match found {
                Some(next) => next.index().checked_sub(1).and_then(|i| self.statements.get(i)),
                None => self.statements.last(),
            };
            boundary = last.filter(|b| b.index() > anchor.index());
        }

        let mut point = InjectionPoint::new(anchor, spec.position(), boundary)?
            .with_metadata("anchor", spec.anchor().to_string());
        if let Some(stop) = stop {
            point = point.with_metadata("stopped_at", stop.index().to_string());
            point.boundary_match = Some(stop);
        }
        Ok(Some(point))
    }
}
