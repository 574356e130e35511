//! CiteGraph engine
//!
//! Expands seed publications into a deduplicated citation graph:
//! - Record normalization and identity resolution
//! - Breadth-first frontier expansion with depth, node and time budgets
//! - Graph store with persistence, PageRank scoring and export

pub mod citation;
pub mod export;
pub mod frontier;
pub mod normalize;
pub mod progress;
pub mod seeds;

pub use citation::{CitationGraph, GraphNode, GraphView, IdentityResolver, NodeId, PageRankScorer};
pub use frontier::{
    BuildOptions, BuildOutput, Direction, FrontierExpander, RunSummary, StopHandle,
    TerminationReason,
};
pub use progress::{ExpansionEvent, ExpansionObserver};
