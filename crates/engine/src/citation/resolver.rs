//! Identity resolution
//!
//! Decides whether a normalized record is a node already in the graph.
//! Exact identifier overlap wins; otherwise a similarity search over
//! nodes from nearby years is tried, guarded by a threshold.

use super::graph::{Absorbed, CitationGraph, NodeId, Origin};
use super::similarity::{SimilarityScorer, WeightedTitleAuthorScorer};
use citegraph_common::config::ResolverConfig;
use citegraph_common::record::PublicationRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a record matched an existing node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Identifier,
    Similarity { score: f64 },
}

/// Resolver verdict for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Existing { node: NodeId, via: MatchKind },
    New,
}

/// What committing one record did to the graph
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    /// Folded into an existing node
    Merged {
        node: NodeId,
        via: MatchKind,
        absorbed: Absorbed,
    },
    Inserted { node: NodeId },
    /// A new node was needed but the graph already holds `max_nodes`
    OverBudget,
}

impl Committed {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Committed::Merged { node, .. } | Committed::Inserted { node } => Some(*node),
            Committed::OverBudget => None,
        }
    }
}

pub struct IdentityResolver {
    scorer: Box<dyn SimilarityScorer>,
    threshold: f64,
    year_tolerance: i32,
}

impl IdentityResolver {
    pub fn new(threshold: f64, title_weight: f64, year_tolerance: i32) -> Self {
        Self {
            scorer: Box::new(WeightedTitleAuthorScorer::new(title_weight)),
            threshold,
            year_tolerance,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.similarity_threshold, config.title_weight, config.year_tolerance)
    }

    /// Replace the similarity function
    pub fn with_scorer(mut self, scorer: Box<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve a record against the graph without changing it
    pub fn resolve(&self, record: &PublicationRecord, graph: &CitationGraph) -> Resolution {
        if let Some(node) = graph.lookup_any(record.identifiers.iter()) {
            return Resolution::Existing {
                node,
                via: MatchKind::Identifier,
            };
        }

        // Unknown year: never guess
        let Some(year) = record.year else {
            return Resolution::New;
        };
        if record.title.trim().is_empty() {
            return Resolution::New;
        }

        let mut best: Option<(NodeId, f64)> = None;
        for candidate in graph.year_candidates(year, self.year_tolerance) {
            let Some(node) = graph.get(candidate) else {
                continue;
            };
            let score = self.scorer.score(record, &node.record);
            if score < self.threshold {
                continue;
            }
            best = match best {
                Some((id, s)) if s > score || (s == score && id < candidate) => Some((id, s)),
                _ => Some((candidate, score)),
            };
        }

        match best {
            Some((node, score)) => {
                debug!(node = %node, score, title = %record.title, "Matched by similarity");
                Resolution::Existing {
                    node,
                    via: MatchKind::Similarity { score },
                }
            }
            None => Resolution::New,
        }
    }

    /// Resolve and commit: merge into the matched node, or insert a new
    /// one while the graph holds fewer than `max_nodes` nodes
    pub fn commit(
        &self,
        graph: &mut CitationGraph,
        record: PublicationRecord,
        depth: u32,
        origin: Origin,
        max_nodes: usize,
    ) -> Committed {
        match self.resolve(&record, graph) {
            Resolution::Existing { node, via } => Committed::Merged {
                node,
                via,
                absorbed: graph.merge_into(node, &record, depth, origin),
            },
            Resolution::New if graph.node_count() >= max_nodes => Committed::OverBudget,
            Resolution::New => Committed::Inserted {
                node: graph.insert_node(record, depth, origin),
            },
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_common::record::Identifier;

    fn record(ids: &[&str], title: &str, authors: &[&str], year: Option<i32>) -> PublicationRecord {
        PublicationRecord {
            identifiers: ids.iter().filter_map(|s| Identifier::parse(s)).collect(),
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            year,
            venue: None,
            url: None,
            references: None,
            cited_by: None,
            cited_by_count: None,
        }
    }

    fn add(
        resolver: &IdentityResolver,
        graph: &mut CitationGraph,
        record: PublicationRecord,
        depth: u32,
        origin: Origin,
    ) -> NodeId {
        resolver
            .commit(graph, record, depth, origin, usize::MAX)
            .node()
            .unwrap()
    }

    #[test]
    fn test_exact_identifier_match() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        let a = add(&resolver, &mut graph, record(&["W1"], "Alpha", &[], Some(2020)), 0, Origin::Seed);

        let resolution = resolver.resolve(&record(&["W1", "10.1234/a"], "Other title", &[], None), &graph);
        assert_eq!(
            resolution,
            Resolution::Existing {
                node: a,
                via: MatchKind::Identifier
            }
        );
    }

    #[test]
    fn test_multiple_hits_pick_lowest_node() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        let a = add(&resolver, &mut graph, record(&["W1"], "Alpha", &[], None), 0, Origin::Seed);
        let b = add(&resolver, &mut graph, record(&["W2"], "Beta", &[], None), 0, Origin::Seed);
        assert!(a < b);

        match resolver.resolve(&record(&["W2", "W1"], "Gamma", &[], None), &graph) {
            Resolution::Existing { node, .. } => assert_eq!(node, a),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_disjoint_ids_merge_by_similarity() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        let a = add(
            &resolver,
            &mut graph,
            record(&["10.1234/preprint"], "Attention is all you need", &["Vaswani, A.", "Shazeer, N."], Some(2017)),
            1,
            Origin::Discovered,
        );
        let committed = resolver.commit(
            &mut graph,
            record(&["W42"], "Attention Is All You Need", &["Ashish Vaswani", "Noam Shazeer"], Some(2017)),
            0,
            Origin::Seed,
            usize::MAX,
        );

        assert_eq!(committed.node(), Some(a));
        assert!(matches!(
            committed,
            Committed::Merged {
                via: MatchKind::Similarity { .. },
                ..
            }
        ));
        let node = graph.get(a).unwrap();
        assert_eq!(node.depth, 0);
        assert!(node.is_seed());
        assert_eq!(node.identifiers.len(), 2);
        assert_eq!(graph.lookup(&Identifier::parse("W42").unwrap()), Some(a));
    }

    #[test]
    fn test_no_fuzzy_without_year() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        add(&resolver, &mut graph, record(&["W1"], "Same title", &[], Some(2019)), 0, Origin::Seed);
        assert_eq!(
            resolver.resolve(&record(&["W2"], "Same title", &[], None), &graph),
            Resolution::New
        );
    }

    #[test]
    fn test_year_window_and_threshold() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        add(&resolver, &mut graph, record(&["W1"], "Same title", &[], Some(2010)), 0, Origin::Seed);

        // Outside the year window
        assert_eq!(
            resolver.resolve(&record(&["W2"], "Same title", &[], Some(2015)), &graph),
            Resolution::New
        );
        // Inside the window but a different work
        assert_eq!(
            resolver.resolve(&record(&["W3"], "Entirely unrelated paper", &[], Some(2010)), &graph),
            Resolution::New
        );
        // Inside the window, same work, off by one year
        assert!(matches!(
            resolver.resolve(&record(&["W4"], "Same Title", &[], Some(2011)), &graph),
            Resolution::Existing { .. }
        ));
    }

    struct AlwaysSame;

    impl SimilarityScorer for AlwaysSame {
        fn score(&self, _: &PublicationRecord, _: &PublicationRecord) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_custom_scorer() {
        let resolver = IdentityResolver::default().with_scorer(Box::new(AlwaysSame));
        let mut graph = CitationGraph::new();
        let a = add(&resolver, &mut graph, record(&["W1"], "x", &[], Some(2000)), 0, Origin::Seed);
        let b = add(&resolver, &mut graph, record(&["W2"], "y", &[], Some(2000)), 0, Origin::Seed);
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get(a).unwrap().record.references.is_none());
    }

    #[test]
    fn test_commit_respects_node_budget() {
        let resolver = IdentityResolver::default();
        let mut graph = CitationGraph::new();
        add(&resolver, &mut graph, record(&["W1"], "Alpha", &[], Some(2020)), 0, Origin::Seed);

        let full = resolver.commit(&mut graph, record(&["W2"], "Beta", &[], Some(2020)), 1, Origin::Discovered, 1);
        assert_eq!(full, Committed::OverBudget);
        assert_eq!(graph.node_count(), 1);

        // Merges still land when the graph is full
        let merged = resolver.commit(&mut graph, record(&["W1", "pmid:7"], "Alpha", &[], Some(2020)), 1, Origin::Discovered, 1);
        assert!(matches!(merged, Committed::Merged { via: MatchKind::Identifier, .. }));
        assert_eq!(graph.lookup(&Identifier::parse("pmid:7").unwrap()), merged.node());
    }
}
