//! Citation graph, identity resolution and scoring

mod graph;
mod pagerank;
mod resolver;
mod similarity;

pub use graph::{
    Absorbed, CitationEdge, CitationGraph, EdgeInsert, GraphNode, GraphView, NodeId, Origin,
    TraversalDirection,
};
pub use pagerank::{PageRankConfig, PageRankScorer};
pub use resolver::{Committed, IdentityResolver, MatchKind, Resolution};
pub use similarity::{
    edit_ratio, jaccard_similarity, levenshtein_distance, normalize_title, surnames,
    SimilarityScorer, WeightedTitleAuthorScorer,
};

use citegraph_common::record::Identifier;
use serde::{Deserialize, Serialize};

/// Paper with citation score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub node: NodeId,

    /// Canonical identifier
    pub identifier: Identifier,

    pub title: String,

    /// Citation-based authority score (0.0 - 1.0)
    pub authority_score: f32,

    /// Number of incoming citations
    pub citation_count: usize,

    /// Number of outgoing references
    pub reference_count: usize,
}
