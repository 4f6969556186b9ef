//! The merge orchestrator.
//!
//! One call processes one (template, destination) pair end to end:
//!
//! 1. Both sources are parsed by the backend and wrapped in statement lists.
//! 2. Signature maps are built for both sides.
//! 3. Destination statements are walked in order. Frozen statements are
//!    carried through, fallthrough nodes are kept, everything else is paired
//!    with the first unused template statement of equal signature.
//! 4. Optionally, statements left unpaired go through the [`MatchRefiner`].
//! 5. Output is assembled in destination order; unconsumed template
//!    statements are appended at the end when enabled.
//!
//! Output is always a concatenation of verbatim source ranges. The only byte
//! the engine ever adds is a `\n` between two blocks when the first does not
//! already end with one.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::backend::{MergeBackend, ParsedDocument};
use crate::decision::{Decision, DecisionKind, DecisionLog, DecisionSource};
use crate::error::{DocumentSide, MergeError};
use crate::injection::{InjectionPointFinder, InjectionPosition, InjectionSpec};
use crate::node::{NodeView, Position};
use crate::preference::{NodeTyping, Preference};
use crate::refiner::{Candidates, MatchRefiner};
use crate::resolver::{ConflictResolver, ResolutionStrategy};
use crate::signature::SignatureMap;
use crate::statement::{Statement, StatementList};

/// Options for a [`SmartMerger`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub preference: Preference,
    /// Append template statements that matched nothing in the destination.
    pub add_template_only_nodes: bool,
    pub node_typing: NodeTyping,
    /// Fuzzy matching for statements left unpaired by signatures. Off when `None`.
    pub refiner: Option<MatchRefiner>,
    pub strategy: ResolutionStrategy,
}

impl MergeOptions {
    pub fn with_preference(mut self, preference: impl Into<Preference>) -> Self {
        self.preference = preference.into();
        self
    }

    pub fn with_template_only_nodes(mut self, enabled: bool) -> Self {
        self.add_template_only_nodes = enabled;
        self
    }

    pub fn with_node_typing(mut self, typing: NodeTyping) -> Self {
        self.node_typing = typing;
        self
    }

    pub fn with_refiner(mut self, refiner: MatchRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Output of one merge call.
#[derive(Debug, Clone)]
pub struct MergeResult {
    run_id: Uuid,
    content: String,
    decisions: DecisionLog,
    changed: bool,
}

impl Default for MergeResult {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeResult {
    pub fn new() -> Self {
        Self::for_run(Uuid::new_v4())
    }

    fn for_run(run_id: Uuid) -> Self {
        Self {
            run_id,
            content: String::new(),
            decisions: DecisionLog::new(),
            changed: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    /// Decision counts by kind.
    pub fn summary(&self) -> BTreeMap<DecisionKind, usize> {
        self.decisions.summary()
    }

    /// Whether the merged content differs from the destination input.
    pub fn has_changes(&self) -> bool {
        self.changed
    }

    pub fn record(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    /// Replace the assembled content wholesale. Meant for resolution hooks.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Append a verbatim block, separating it from unterminated output with `\n`.
    pub fn push_content(&mut self, block: &str) {
        if block.is_empty() {
            return;
        }
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(block);
    }

    fn absorb(&mut self, other: MergeResult) {
        self.push_content(&other.content);
        self.decisions.append(other.decisions);
    }
}

impl Serialize for MergeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MergeResult", 5)?;
        state.serialize_field("run_id", &self.run_id)?;
        state.serialize_field("changed", &self.changed)?;
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("decisions", &self.decisions)?;
        state.serialize_field("content", &self.content)?;
        state.end()
    }
}

/// A parsed side of a merge, ready for matching.
struct Prepared<N> {
    document: ParsedDocument<N>,
    statements: StatementList<N>,
    signatures: SignatureMap,
}

impl<N: NodeView> Prepared<N> {
    fn is_frozen(&self, statement: &Statement<N>) -> bool {
        self.document.freeze_span_at(statement.position()).is_some()
    }
}

/// Destination statements taking part in a merge, and the lines they own.
/// Lines between statements that no node covers are carried verbatim.
struct Region<'a, N> {
    statements: &'a [Statement<N>],
    first_line: usize,
    last_line: usize,
}

enum Slot<'a, N> {
    Frozen,
    Fallthrough,
    Paired {
        template: &'a Statement<N>,
        score: Option<f64>,
    },
    Unmatched,
}

/// Structural merger over one backend.
#[derive(Debug, Clone)]
pub struct SmartMerger<B> {
    backend: B,
    options: MergeOptions,
    resolver: ConflictResolver,
}

impl<B: MergeBackend> SmartMerger<B> {
    pub fn new(backend: B, options: MergeOptions) -> Self {
        let resolver = ConflictResolver::new(options.preference.clone(), options.node_typing.clone());
        Self {
            backend,
            options,
            resolver,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge `template` into `destination`.
    pub fn merge(&self, template: &str, destination: &str) -> Result<MergeResult, MergeError> {
        let mut result = MergeResult::new();
        tracing::debug!(run_id = %result.run_id, backend = self.backend.name(), "merge started");

        let template_side = self.prepare(DocumentSide::Template, template)?;
        let destination_side = self.prepare(DocumentSide::Destination, destination)?;
        let region = Region {
            statements: destination_side.statements.as_slice(),
            first_line: 1,
            last_line: destination_side.document.line_count(),
        };
        self.merge_region(
            &template_side,
            &destination_side,
            region,
            self.options.add_template_only_nodes,
            &mut result,
        );
        self.finish(destination, result)
    }

    /// Apply `template` at the injection point `spec` selects in `destination`.
    ///
    /// `Replace` merges the template into the replaced range, adding template
    /// statements the range lacks. The insert positions copy the template's
    /// statements in verbatim. Everything outside the injection point is left
    /// untouched.
    pub fn merge_partial(
        &self,
        template: &str,
        destination: &str,
        spec: &InjectionSpec<B::Node>,
    ) -> Result<MergeResult, MergeError> {
        let mut result = MergeResult::new();
        tracing::debug!(
            run_id = %result.run_id,
            backend = self.backend.name(),
            position = %spec.position(),
            "partial merge started"
        );

        let template_side = self.prepare(DocumentSide::Template, template)?;
        let destination_side = self.prepare(DocumentSide::Destination, destination)?;
        let finder = InjectionPointFinder::new(&destination_side.statements);
        let point = finder
            .locate(spec)?
            .ok_or_else(|| MergeError::AnchorNotFound(spec.anchor().to_string()))?;
        let anchor = point.anchor();
        let document = &destination_side.document;
        tracing::debug!(anchor = anchor.index(), line = anchor.position().start_line, "injection point located");

        match point.position() {
            InjectionPosition::Replace => {
                let first_line = anchor.position().start_line;
                let replaced_end = point
                    .replaced_statements(&destination_side.statements)
                    .last()
                    .map_or(anchor.index(), Statement::index);
                let (last_index, last_line) = replaced_tail(&destination_side, replaced_end);
                let replaced = destination_side
                    .statements
                    .as_slice()
                    .get(anchor.index()..=last_index)
                    .unwrap_or(&[]);

                result.push_content(document.source_range(1, first_line.saturating_sub(1)));
                result.record(
                    Decision::new(DecisionKind::Replaced, DecisionSource::Merged)
                        .with_destination(anchor.index())
                        .at_line(first_line),
                );

                let mut partial = MergeResult::for_run(result.run_id);
                let region = Region {
                    statements: replaced,
                    first_line,
                    last_line,
                };
                self.merge_region(&template_side, &destination_side, region, true, &mut partial);
                if self.options.strategy == ResolutionStrategy::Boundary {
                    let boundary = point.boundary().unwrap_or(anchor);
                    self.backend.resolve_boundary(boundary, &mut partial)?;
                }
                result.absorb(partial);
                result.push_content(document.source_range(last_line + 1, document.line_count()));
            }
            InjectionPosition::Before => {
                let at = outside_freeze(document, anchor.position().start_line.saturating_sub(1), false);
                self.insert_after_line(&template_side, document, at, &mut result);
            }
            InjectionPosition::FirstChild => {
                let at = outside_freeze(document, anchor.position().end_line, true);
                self.insert_after_line(&template_side, document, at, &mut result);
            }
            InjectionPosition::After | InjectionPosition::LastChild => {
                let at = outside_freeze(document, subtree_end(&destination_side, anchor), true);
                self.insert_after_line(&template_side, document, at, &mut result);
            }
        }

        self.finish(destination, result)
    }

    fn prepare(&self, side: DocumentSide, source: &str) -> Result<Prepared<B::Node>, MergeError> {
        let document = self
            .backend
            .parse(source)
            .map_err(|err| MergeError::from_parse(side, err))?;
        let statements = StatementList::build(document.nodes().iter().cloned());
        let signatures = SignatureMap::build(&statements, |node| self.backend.signature(node));
        tracing::debug!(
            %side,
            statements = statements.len(),
            signatures = signatures.len(),
            freeze_spans = document.freeze_spans().len(),
            "parsed"
        );
        Ok(Prepared {
            document,
            statements,
            signatures,
        })
    }

    fn finish(&self, destination: &str, mut result: MergeResult) -> Result<MergeResult, MergeError> {
        if self.options.strategy == ResolutionStrategy::Batch {
            self.backend.resolve_batch(&mut result)?;
        }
        result.changed = result.content != destination;
        tracing::info!(
            run_id = %result.run_id,
            decisions = result.decisions.len(),
            changed = result.changed,
            summary = ?result.summary(),
            "merge finished"
        );
        Ok(result)
    }

    fn merge_region(
        &self,
        template: &Prepared<B::Node>,
        destination: &Prepared<B::Node>,
        region: Region<'_, B::Node>,
        add_template_only: bool,
        result: &mut MergeResult,
    ) {
        // Template freeze instructions never match and are never added.
        let mut used: Vec<bool> = template
            .statements
            .iter()
            .map(|stmt| template.is_frozen(stmt))
            .collect();

        let mut slots: Vec<Slot<'_, B::Node>> = Vec::with_capacity(region.statements.len());
        for stmt in region.statements {
            let slot = if destination.is_frozen(stmt) {
                Slot::Frozen
            } else if self.backend.is_fallthrough(stmt.node()) {
                Slot::Fallthrough
            } else {
                let paired = destination
                    .signatures
                    .signature_of(stmt.index())
                    .and_then(|sig| template.signatures.first_unused(sig, &used))
                    .and_then(|index| template.statements.get(index));
                match paired {
                    Some(template_stmt) => {
                        used[template_stmt.index()] = true;
                        Slot::Paired {
                            template: template_stmt,
                            score: None,
                        }
                    }
                    None => Slot::Unmatched,
                }
            };
            slots.push(slot);
        }

        if let Some(refiner) = &self.options.refiner {
            self.refine_unmatched(refiner, template, destination, &region, &mut slots, &mut used);
        }

        let mut next_line = region.first_line;
        for (stmt, slot) in region.statements.iter().zip(&slots) {
            let position = stmt.position();
            if position.start_line > next_line {
                result.push_content(destination.document.source_range(next_line, position.start_line - 1));
            }
            next_line = next_line.max(position.end_line + 1);

            let own = destination.document.slice(position);
            let (decision, content) = match slot {
                Slot::Frozen => (Decision::new(DecisionKind::FreezeBlock, DecisionSource::Destination), own),
                Slot::Fallthrough => (
                    Decision::new(DecisionKind::KeptDestination, DecisionSource::Destination),
                    own,
                ),
                Slot::Unmatched => (Decision::new(DecisionKind::Appended, DecisionSource::Destination), own),
                Slot::Paired {
                    template: template_stmt,
                    score,
                } => {
                    let resolution = self.resolver.resolve_pair(
                        template_stmt.node(),
                        &self.backend.normalized_content(template_stmt.node()),
                        stmt.node(),
                        &self.backend.normalized_content(stmt.node()),
                    );
                    let content = if resolution.takes_template() {
                        template.document.slice(template_stmt.position())
                    } else {
                        own
                    };
                    let mut decision =
                        Decision::new(resolution.kind, resolution.source).with_template(template_stmt.index());
                    if let Some(score) = score {
                        decision = decision.with_score(*score);
                    }
                    (decision, content)
                }
            };
            result.push_content(content);
            result.record(decision.with_destination(stmt.index()).at_line(position.start_line));
        }
        if next_line <= region.last_line {
            result.push_content(destination.document.source_range(next_line, region.last_line));
        }

        for stmt in &template.statements {
            if used[stmt.index()] {
                continue;
            }
            if add_template_only {
                result.push_content(template.document.slice(stmt.position()));
                result.record(
                    Decision::new(DecisionKind::Added, DecisionSource::Template)
                        .with_template(stmt.index())
                        .at_line(stmt.position().start_line),
                );
            } else {
                tracing::debug!(template = stmt.index(), "dropping template-only statement");
            }
        }
    }

    fn refine_unmatched<'t>(
        &self,
        refiner: &MatchRefiner,
        template: &'t Prepared<B::Node>,
        destination: &Prepared<B::Node>,
        region: &Region<'_, B::Node>,
        slots: &mut [Slot<'t, B::Node>],
        used: &mut [bool],
    ) {
        let template_candidates: Vec<&Statement<B::Node>> = template
            .statements
            .iter()
            .filter(|stmt| !used[stmt.index()] && !self.backend.is_fallthrough(stmt.node()))
            .collect();
        let destination_candidates: Vec<&Statement<B::Node>> = region
            .statements
            .iter()
            .zip(slots.iter())
            .filter(|(_, slot)| matches!(slot, Slot::Unmatched))
            .map(|(stmt, _)| stmt)
            .collect();
        if template_candidates.is_empty() || destination_candidates.is_empty() {
            return;
        }

        let matches = refiner.refine(
            Candidates::new(&template_candidates, template.statements.len()),
            Candidates::new(&destination_candidates, destination.statements.len()),
        );
        let region_start = region.statements.first().map_or(0, Statement::index);
        for found in matches {
            let Some(template_stmt) = template.statements.get(found.template_index) else {
                continue;
            };
            if let Some(slot) = slots.get_mut(found.destination_index - region_start) {
                used[found.template_index] = true;
                *slot = Slot::Paired {
                    template: template_stmt,
                    score: Some(found.score),
                };
            }
        }
    }

    fn insert_after_line(
        &self,
        template: &Prepared<B::Node>,
        document: &ParsedDocument<B::Node>,
        line: usize,
        result: &mut MergeResult,
    ) {
        result.push_content(document.source_range(1, line));
        for stmt in &template.statements {
            if template.is_frozen(stmt) {
                continue;
            }
            result.push_content(template.document.slice(stmt.position()));
            result.record(
                Decision::new(DecisionKind::Added, DecisionSource::Template)
                    .with_template(stmt.index())
                    .at_line(stmt.position().start_line),
            );
        }
        result.push_content(document.source_range(line + 1, document.line_count()));
    }
}

/// Move an insertion point that falls between two lines of one freeze span
/// to that span's edge: past its end when `forward`, before its start otherwise.
fn outside_freeze<N: NodeView>(document: &ParsedDocument<N>, line: usize, forward: bool) -> usize {
    match document.freeze_span_at(Position::single(line + 1)) {
        Some(span) if span.start_line <= line => {
            tracing::debug!(
                line,
                span_start = span.start_line,
                span_end = span.end_line,
                "insertion moved out of freeze span"
            );
            if forward {
                span.end_line
            } else {
                span.start_line - 1
            }
        }
        _ => line,
    }
}

/// Index of the last replaced statement and the last line of the replaced
/// range, starting from `last_index` and widened until the range no longer
/// ends inside a freeze span.
fn replaced_tail<N: NodeView>(side: &Prepared<N>, mut last_index: usize) -> (usize, usize) {
    let line_after = |index: usize| {
        side.statements
            .get(index + 1)
            .map_or(side.document.line_count(), |next| next.position().start_line.saturating_sub(1))
    };
    let mut last_line = line_after(last_index);
    while let Some(span) = side
        .document
        .freeze_span_at(Position::single(last_line))
        .filter(|span| span.end_line > last_line)
    {
        let span_end = span.end_line;
        last_index = side
            .statements
            .iter()
            .skip(last_index + 1)
            .take_while(|stmt| stmt.position().start_line <= span_end)
            .last()
            .map_or(last_index, Statement::index);
        last_line = line_after(last_index).max(span_end);
    }
    (last_index, last_line)
}

/// Last line of `anchor` and everything nested under it.
fn subtree_end<N: NodeView>(side: &Prepared<N>, anchor: &Statement<N>) -> usize {
    let own_end = anchor.position().end_line;
    if !anchor.has_tree_navigation() {
        return own_end;
    }
    let depth = anchor.tree_depth();
    side.statements
        .as_slice()
        .get(anchor.index() + 1..)
        .unwrap_or(&[])
        .iter()
        .find(|stmt| stmt.same_or_shallower_than_depth(depth))
        .map_or(side.document.line_count(), |next| next.position().start_line.saturating_sub(1))
        .max(own_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::OutlineBackend;
    use crate::preference::Side;

    fn merger(options: MergeOptions) -> SmartMerger<OutlineBackend> {
        SmartMerger::new(OutlineBackend::default(), options)
    }

    #[test]
    fn test_push_content_separates_unterminated_blocks() {
        let mut result = MergeResult::new();
        result.push_content("a");
        result.push_content("");
        result.push_content("b\n");
        result.push_content("c");
        assert_eq!(result.content(), "a\nb\nc");
    }

    #[test]
    fn test_identity_is_unchanged() {
        let doc = "# Title\n\nsome text\n## Part\nmore\n";
        let result = merger(MergeOptions::default()).merge(doc, doc).unwrap();
        assert_eq!(result.content(), doc);
        assert!(!result.has_changes());
        assert_eq!(result.decisions().count(DecisionKind::Identical), 5);
        assert_eq!(result.decisions().len(), 5);
    }

    #[test]
    fn test_destination_only_line_is_appended() {
        let template = "# Title\nshared\n";
        let destination = "# Title\nlocal\nshared\n";
        let result = merger(MergeOptions::default()).merge(template, destination).unwrap();
        assert_eq!(result.content(), destination);
        assert_eq!(result.decisions().count(DecisionKind::Appended), 1);
        let appended = result
            .decisions()
            .iter()
            .find(|d| d.kind == DecisionKind::Appended)
            .unwrap();
        assert_eq!(appended.destination_index, Some(1));
    }

    #[test]
    fn test_template_only_added_at_end() {
        let template = "# Title\nnew line\n";
        let destination = "# Title";
        let dropped = merger(MergeOptions::default()).merge(template, destination).unwrap();
        assert_eq!(dropped.content(), "# Title");

        let added = merger(MergeOptions::default().with_template_only_nodes(true))
            .merge(template, destination)
            .unwrap();
        assert_eq!(added.content(), "# Title\nnew line\n");
        assert!(added.has_changes());
        assert_eq!(added.summary()[&DecisionKind::Added], 1);
    }

    #[test]
    fn test_fuzzy_pairing_with_template_preference() {
        let template = "# Title\nInstall the package with cargo\n";
        let destination = "# Title\nInstall the package with npm\n";
        let options = MergeOptions::default()
            .with_preference(Side::Template)
            .with_refiner(MatchRefiner::default());
        let result = merger(options).merge(template, destination).unwrap();
        assert_eq!(result.content(), template);
        let fuzzy = result
            .decisions()
            .iter()
            .find(|d| d.kind == DecisionKind::KeptTemplate)
            .unwrap();
        assert!(fuzzy.score.is_some());
        assert_eq!(result.decisions().count(DecisionKind::Appended), 0);
    }

    #[test]
    fn test_report_serialization() {
        let result = merger(MergeOptions::default()).merge("a\n", "a\nb\n").unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["summary"]["identical"], 1);
        assert_eq!(value["summary"]["appended"], 1);
        assert_eq!(value["changed"], false);
        assert_eq!(value["decisions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_subtree_end() {
        let m = merger(MergeOptions::default());
        let side = m
            .prepare(DocumentSide::Destination, "# A\n## B\nb\n### C\nc\n## D\n")
            .unwrap();
        let b = side.statements.get(1).unwrap();
        assert_eq!(subtree_end(&side, b), 5);
        let d = side.statements.get(5).unwrap();
        assert_eq!(subtree_end(&side, d), 6);
        let a = side.statements.get(0).unwrap();
        assert_eq!(subtree_end(&side, a), 6);
    }
}
