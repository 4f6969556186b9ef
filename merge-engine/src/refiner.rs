//! Fuzzy matching for statements that signature equality left unpaired.
//!
//! Every remaining (template, destination) candidate pair of the same node
//! type is scored as
//!
//! ```text
//! score = w_content * content_sim + w_length * length_sim + w_position * position_sim
//! ```
//!
//! Pairs scoring below the threshold are discarded and the rest are assigned
//! greedily in descending score order, skipping any pair whose template or
//! destination side is already taken.
//!
//! This is a heuristic, not an optimal bipartite assignment: a high-scoring
//! pair can block two medium pairs whose sum would be larger. Tests should
//! assert the greedy outcome, not the optimum.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::NodeView;
use crate::similarity::{content_similarity, length_similarity, position_similarity};
use crate::statement::Statement;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

const WEIGHT_EPSILON: f64 = 1e-9;

/// Relative importance of each similarity component. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub content: f64,
    pub length: f64,
    pub position: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            content: 0.7,
            length: 0.15,
            position: 0.15,
        }
    }
}

impl SimilarityWeights {
    pub fn new(content: f64, length: f64, position: f64) -> Result<Self, ConfigError> {
        let weights = Self {
            content,
            length,
            position,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parts = [self.content, self.length, self.position];
        let valid = parts.iter().all(|w| w.is_finite() && *w >= 0.0)
            && (parts.iter().sum::<f64>() - 1.0).abs() <= WEIGHT_EPSILON;
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidWeights {
                content: self.content,
                length: self.length,
                position: self.position,
            })
        }
    }
}

/// The individual similarity components behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchMetadata {
    pub content: f64,
    pub length: f64,
    pub position: f64,
}

/// One accepted fuzzy pairing. Indices are statement indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub template_index: usize,
    pub destination_index: usize,
    pub score: f64,
    pub metadata: MatchMetadata,
}

impl MatchResult {
    /// Greedy assignment order: higher score first, then lower destination
    /// index, then lower template index.
    pub fn greedy_order(a: &Self, b: &Self) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then(a.destination_index.cmp(&b.destination_index))
            .then(a.template_index.cmp(&b.template_index))
    }
}

/// One side of the candidate set, plus the size of the document it lives in
/// (positions are relative to the whole document).
#[derive(Debug, Clone, Copy)]
pub struct Candidates<'a, N> {
    pub statements: &'a [&'a Statement<N>],
    pub document_len: usize,
}

impl<'a, N> Candidates<'a, N> {
    pub fn new(statements: &'a [&'a Statement<N>], document_len: usize) -> Self {
        Self {
            statements,
            document_len,
        }
    }
}

/// Greedy similarity matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRefiner {
    threshold: f64,
    weights: SimilarityWeights,
    node_types: BTreeSet<String>,
}

impl Default for MatchRefiner {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            weights: SimilarityWeights::default(),
            node_types: BTreeSet::new(),
        }
    }
}

impl MatchRefiner {
    /// An empty `node_types` set matches every type.
    pub fn new<I, S>(threshold: f64, weights: SimilarityWeights, node_types: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        weights.validate()?;
        Ok(Self {
            threshold,
            weights,
            node_types: node_types.into_iter().map(Into::into).collect(),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn weights(&self) -> SimilarityWeights {
        self.weights
    }

    pub fn node_types(&self) -> &BTreeSet<String> {
        &self.node_types
    }

    pub fn accepts_type(&self, node_type: &str) -> bool {
        self.node_types.is_empty() || self.node_types.contains(node_type)
    }

    /// Score one pair. Does not apply the threshold.
    pub fn score<N: NodeView>(
        &self,
        template: &Statement<N>,
        template_len: usize,
        destination: &Statement<N>,
        destination_len: usize,
    ) -> MatchResult {
        let content = content_similarity(template.text(), destination.text());
        let length = length_similarity(template.text(), destination.text());
        let position = position_similarity(
            template.index(),
            template_len,
            destination.index(),
            destination_len,
        );
        let score = self.weights.content * content
            + self.weights.length * length
            + self.weights.position * position;
        MatchResult {
            template_index: template.index(),
            destination_index: destination.index(),
            score,
            metadata: MatchMetadata {
                content,
                length,
                position,
            },
        }
    }

    /// Pair up candidates. No statement appears in more than one result.
    pub fn refine<N: NodeView>(
        &self,
        template: Candidates<'_, N>,
        destination: Candidates<'_, N>,
    ) -> Vec<MatchResult> {
        let mut scored = Vec::new();
        for d in destination.statements {
            if !self.accepts_type(d.node_type()) {
                continue;
            }
            for t in template.statements {
                if t.node_type() != d.node_type() {
                    continue;
                }
                let result = self.score(*t, template.document_len, *d, destination.document_len);
                if result.score >= self.threshold {
                    scored.push(result);
                }
            }
        }

        scored.sort_by(MatchResult::greedy_order);

        let mut used_template = BTreeSet::new();
        let mut used_destination = BTreeSet::new();
        let mut accepted = Vec::new();
        for result in scored {
            if used_template.contains(&result.template_index)
                || used_destination.contains(&result.destination_index)
            {
                continue;
            }
            used_template.insert(result.template_index);
            used_destination.insert(result.destination_index);
            tracing::debug!(
                template = result.template_index,
                destination = result.destination_index,
                score = result.score,
                "fuzzy match accepted"
            );
            accepted.push(result);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Position;
    use crate::statement::StatementList;

    #[derive(Debug, Clone)]
    struct Node {
        kind: &'static str,
        text: &'static str,
    }

    impl NodeView for Node {
        fn node_type(&self) -> &str {
            self.kind
        }
        fn text(&self) -> &str {
            self.text
        }
        fn position(&self) -> Position {
            Position::single(1)
        }
    }

    fn lines(texts: &[&'static str]) -> StatementList<Node> {
        StatementList::build(texts.iter().map(|t| Node { kind: "line", text: *t }))
    }

    fn run(refiner: &MatchRefiner, t: &StatementList<Node>, d: &StatementList<Node>) -> Vec<MatchResult> {
        let t_refs: Vec<&Statement<Node>> = t.iter().collect();
        let d_refs: Vec<&Statement<Node>> = d.iter().collect();
        refiner.refine(Candidates::new(&t_refs, t.len()), Candidates::new(&d_refs, d.len()))
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(SimilarityWeights::new(0.5, 0.25, 0.25).is_ok());
        assert!(matches!(
            SimilarityWeights::new(0.5, 0.5, 0.5),
            Err(ConfigError::InvalidWeights { .. })
        ));
        assert!(SimilarityWeights::new(1.2, -0.1, -0.1).is_err());
        assert!(MatchRefiner::new(1.5, SimilarityWeights::default(), Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_refine_pairs_similar_lines() {
        let refiner = MatchRefiner::default();
        let t = lines(&["Install the package", "Run the tests"]);
        let d = lines(&["Run the test suite", "Install the packages"]);
        let matches = run(&refiner, &t, &d);
        assert_eq!(matches.len(), 2);
        let pair = |ti: usize| matches.iter().find(|m| m.template_index == ti).unwrap().destination_index;
        assert_eq!(pair(0), 1);
        assert_eq!(pair(1), 0);
    }

    #[test]
    fn test_greedy_takes_best_pair_first() {
        let refiner = MatchRefiner::default();
        let t = lines(&["abcdef", "abcdeX"]);
        let d = lines(&["abcdef"]);
        let matches = run(&refiner, &t, &d);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].template_index, 0);
        assert!((matches[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // Only position counts, and both single-element lists sit at 0.
        let weights = SimilarityWeights::new(0.0, 0.0, 1.0).unwrap();
        let t = lines(&["aaa"]);
        let d = lines(&["zzz"]);
        let at = MatchRefiner::new(1.0, weights, Vec::<String>::new()).unwrap();
        assert_eq!(run(&at, &t, &d).len(), 1);

        let weights = SimilarityWeights::new(1.0, 0.0, 0.0).unwrap();
        let below = MatchRefiner::new(0.5, weights, Vec::<String>::new()).unwrap();
        let t = lines(&["abcd"]);
        let d = lines(&["abxy"]);
        // content similarity is exactly 0.5
        assert_eq!(run(&below, &t, &d).len(), 1);
        let d = lines(&["axyz"]);
        assert!(run(&below, &t, &d).is_empty());
    }

    #[test]
    fn test_node_type_filter_and_compatibility() {
        let refiner = MatchRefiner::new(0.5, SimilarityWeights::default(), ["heading"]).unwrap();
        let t = lines(&["same text"]);
        let d = lines(&["same text"]);
        assert!(run(&refiner, &t, &d).is_empty());

        let mixed_t = StatementList::build(vec![Node {
            kind: "heading",
            text: "Usage",
        }]);
        let mixed_d = lines(&["Usage"]);
        assert!(run(&MatchRefiner::default(), &mixed_t, &mixed_d).is_empty());
    }

    #[test]
    fn test_greedy_order_breaks_score_ties_by_index() {
        let t = lines(&["one"]);
        let d = lines(&["one"]);
        let refiner = MatchRefiner::default();
        let a = refiner.score(t.get(0).unwrap(), 1, d.get(0).unwrap(), 1);
        assert!((a.score - 1.0).abs() < 1e-9);

        let mut lower = a.clone();
        lower.score = 0.1;
        assert_eq!(MatchResult::greedy_order(&a, &lower), Ordering::Less);

        let mut tied = a.clone();
        tied.destination_index = 3;
        assert_ne!(a, tied);
        assert_eq!(MatchResult::greedy_order(&a, &tied), Ordering::Less);
        assert_eq!(MatchResult::greedy_order(&tied, &a), Ordering::Greater);
        assert_eq!(MatchResult::greedy_order(&a, &a.clone()), Ordering::Equal);
    }
}
