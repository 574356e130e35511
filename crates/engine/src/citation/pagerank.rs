//! PageRank-based citation scoring
//!
//! Ranks the nodes of a built graph by citation authority.

use super::{CitationGraph, NodeId, ScoredPaper};
use std::collections::HashMap;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor (typically 0.85)
    pub damping: f32,

    /// Maximum iterations
    pub max_iterations: usize,

    /// Convergence threshold
    pub epsilon: f32,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// PageRank scorer for papers
pub struct PageRankScorer {
    config: PageRankConfig,
}

impl PageRankScorer {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Compute scores for all nodes, scaled so the best node scores 1.0
    pub fn compute(&self, graph: &CitationGraph) -> HashMap<NodeId, f32> {
        let n = graph.node_count();
        if n == 0 {
            return HashMap::new();
        }

        let n_f32 = n as f32;
        let damping = self.config.damping;
        let teleport = (1.0 - damping) / n_f32;

        let nodes: Vec<NodeId> = graph.iter_nodes().map(|node| node.id).collect();
        let mut scores: HashMap<NodeId, f32> = nodes.iter().map(|&id| (id, 1.0 / n_f32)).collect();

        // Papers that cite nothing spread their score evenly
        let dangling: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&id| graph.reference_count(id) == 0)
            .collect();

        for _ in 0..self.config.max_iterations {
            let dangling_share: f32 =
                dangling.iter().map(|id| scores[id]).sum::<f32>() / n_f32;
            let mut new_scores = HashMap::with_capacity(n);
            let mut max_diff: f32 = 0.0;

            for &node in &nodes {
                let citation_sum: f32 = graph
                    .get_citations(node)
                    .map(|citing| scores[&citing] / graph.reference_count(citing) as f32)
                    .sum();

                let new_score = teleport + damping * (citation_sum + dangling_share);
                max_diff = max_diff.max((new_score - scores[&node]).abs());
                new_scores.insert(node, new_score);
            }

            scores = new_scores;

            if max_diff < self.config.epsilon {
                break;
            }
        }

        // Normalize to 0-1 range
        let max_score = scores.values().cloned().fold(0.0f32, f32::max);
        if max_score > 0.0 {
            for score in scores.values_mut() {
                *score /= max_score;
            }
        }

        scores
    }

    /// Score and rank papers
    pub fn rank(&self, graph: &CitationGraph, limit: usize) -> Vec<ScoredPaper> {
        let scores = self.compute(graph);

        let mut papers: Vec<ScoredPaper> = graph
            .iter_nodes()
            .map(|node| ScoredPaper {
                node: node.id,
                identifier: node.canonical_id(),
                title: node.title().to_string(),
                authority_score: scores.get(&node.id).copied().unwrap_or(0.0),
                citation_count: graph.citation_count(node.id),
                reference_count: graph.reference_count(node.id),
            })
            .collect();

        papers.sort_by(|a, b| {
            b.authority_score
                .partial_cmp(&a.authority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.node.cmp(&b.node))
        });

        papers.truncate(limit);
        papers
    }
}

impl Default for PageRankScorer {
    fn default() -> Self {
        Self::new(PageRankConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::Origin;
    use citegraph_common::record::{Identifier, PublicationRecord};

    fn add(graph: &mut CitationGraph, id: &str) -> NodeId {
        graph.insert_node(
            PublicationRecord {
                identifiers: Identifier::parse(id).into_iter().collect(),
                title: id.to_string(),
                authors: vec![],
                year: None,
                venue: None,
                url: None,
                references: None,
                cited_by: None,
                cited_by_count: None,
            },
            0,
            Origin::Seed,
        )
    }

    #[test]
    fn test_pagerank_basic() {
        let mut graph = CitationGraph::new();

        // A -> B -> C, D -> B
        let a = add(&mut graph, "W1");
        let b = add(&mut graph, "W2");
        let c = add(&mut graph, "W3");
        let d = add(&mut graph, "W4");

        graph.add_edge(a, b);
        graph.add_edge(b, c);
        graph.add_edge(d, b);

        let scores = PageRankScorer::default().compute(&graph);
        assert!(scores[&b] > scores[&a], "B should rank higher than A");
        assert!(scores.values().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_rank_orders_and_limits() {
        let mut graph = CitationGraph::new();
        let hub = add(&mut graph, "W1");
        for i in 2..6 {
            let citing = add(&mut graph, &format!("W{}", i));
            graph.add_edge(citing, hub);
        }

        let ranked = PageRankScorer::default().rank(&graph, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].node, hub);
        assert_eq!(ranked[0].citation_count, 4);
        assert_eq!(ranked[0].authority_score, 1.0);
    }

    #[test]
    fn test_pagerank_empty_graph() {
        let graph = CitationGraph::new();
        assert!(PageRankScorer::default().compute(&graph).is_empty());
    }
}
