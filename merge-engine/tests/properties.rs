//! Property-based tests for the merge invariants.

use std::collections::HashSet;

use proptest::prelude::*;
use structmerge::refiner::Candidates;
use structmerge::{
    DecisionKind, MatchRefiner, MergeOptions, OutlineBackend, Side, SimilarityWeights, SmartMerger, Statement,
    StatementList,
};
use structmerge::{MergeBackend, OutlineNode};

// Strategy for one outline line: headings, blanks, and short text lines
fn outline_line() -> impl Strategy<Value = String> {
    prop_oneof![
        (1..4usize, "[a-z]{1,6}").prop_map(|(level, title)| format!("{} {title}", "#".repeat(level))),
        Just(String::new()),
        "[a-z ]{1,12}",
    ]
}

// Strategy for a whole outline document, with or without a trailing newline
fn outline_doc() -> impl Strategy<Value = String> {
    (prop::collection::vec(outline_line(), 0..12), any::<bool>()).prop_map(|(lines, trailing)| {
        let mut doc = lines.join("\n");
        if trailing && !doc.is_empty() {
            doc.push('\n');
        }
        doc
    })
}

fn statements(source: &str) -> StatementList<OutlineNode> {
    let doc = OutlineBackend::default().parse(source).unwrap();
    StatementList::build(doc.nodes().iter().cloned())
}

proptest! {
    #[test]
    fn prop_identity(doc in outline_doc()) {
        let result = SmartMerger::new(OutlineBackend::default(), MergeOptions::default())
            .merge(&doc, &doc)
            .unwrap();
        prop_assert_eq!(result.content(), doc.as_str());
        prop_assert!(result.decisions().iter().all(|d| d.kind == DecisionKind::Identical));
    }

    #[test]
    fn prop_idempotent(template in outline_doc(), destination in outline_doc(), prefer_template in any::<bool>()) {
        let side = if prefer_template { Side::Template } else { Side::Destination };
        let options = MergeOptions::default()
            .with_preference(side)
            .with_template_only_nodes(!prefer_template);
        let merger = SmartMerger::new(OutlineBackend::default(), options);
        let once = merger.merge(&template, &destination).unwrap();
        let twice = merger.merge(&template, once.content()).unwrap();
        prop_assert_eq!(once.content(), twice.content());
    }

    #[test]
    fn prop_refiner_matches_at_most_once(template in outline_doc(), destination in outline_doc(), threshold in 0.0..=1.0f64) {
        let t = statements(&template);
        let d = statements(&destination);
        let t_refs: Vec<&Statement<OutlineNode>> = t.iter().collect();
        let d_refs: Vec<&Statement<OutlineNode>> = d.iter().collect();
        let refiner = MatchRefiner::new(threshold, SimilarityWeights::default(), Vec::<String>::new()).unwrap();
        let matches = refiner.refine(Candidates::new(&t_refs, t.len()), Candidates::new(&d_refs, d.len()));

        let mut seen_t = HashSet::new();
        let mut seen_d = HashSet::new();
        for m in &matches {
            prop_assert!(seen_t.insert(m.template_index));
            prop_assert!(seen_d.insert(m.destination_index));
            prop_assert!(m.score >= threshold);
        }
    }
}
